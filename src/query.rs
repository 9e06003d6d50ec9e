//! Reading data back out and running ad-hoc statements.
//!
//! Both take either inline SQL or a path to a `.sql` file; `query` also
//! accepts a bare `schema.table` / `table` name and selects everything from it.

use crate::config::ConnectionConfig;
use crate::connection;
use crate::dialect::Dialect;
use crate::error::{LoadError, Result};
use crate::io;
use crate::logging::Timer;
use crate::schema::TableAddress;
use polars::prelude::DataFrame;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// A `.sql` file containing a single query.
    File(PathBuf),
    /// A table or view address; everything is selected from it.
    Object(String),
    Sql(String),
}

impl QuerySource {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.to_lowercase().ends_with(".sql") {
            Self::File(PathBuf::from(trimmed))
        } else if is_object_address(trimmed) {
            Self::Object(trimmed.to_owned())
        } else {
            Self::Sql(input.to_owned())
        }
    }

    /// SQL text to run.
    ///
    /// Object addresses are quoted the same way uploads quote them, so a
    /// table written by [`crate::upload`] reads back under the same name.
    pub fn resolve(&self, dialect: Dialect, default_schema: Option<&str>) -> Result<String> {
        match self {
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| {
                LoadError::Query(format!("Failed to read SQL file {}: {e}", path.display()))
            }),
            Self::Object(address) => {
                let address = TableAddress::parse(address, default_schema)?;
                Ok(format!("SELECT * FROM {}", dialect.qualified(&address)))
            }
            Self::Sql(sql) => Ok(sql.clone()),
        }
    }
}

/// `word` or `word.word`, where a word is letters, digits and underscores.
fn is_object_address(s: &str) -> bool {
    let is_word = |w: &str| !w.is_empty() && w.chars().all(|c| c.is_alphanumeric() || c == '_');
    match s.split_once('.') {
        Some((schema, table)) => is_word(schema) && is_word(table),
        None => is_word(s),
    }
}

/// Run a query and return its result set.
///
/// Rows come back through `COPY (<query>) TO STDOUT` as CSV and are parsed
/// with type inference, so column types follow the data rather than the
/// declared SQL types.
pub async fn query(config: &ConnectionConfig, source: &str) -> Result<DataFrame> {
    let dialect = config.dialect()?;
    let sql = QuerySource::parse(source).resolve(dialect, config.default_schema())?;
    let timer = Timer::start("query");

    let mut conn = connection::open(config).await?;
    let statement = conn.dialect().copy_out_sql(&sql);
    tracing::debug!(sql = %statement, "Running query");
    let result = conn.copy_out(&statement).await;
    conn.close().await;

    let df = io::parse_csv(result?)
        .map_err(|e| LoadError::Query(format!("Failed to parse query result: {e}")))?;
    tracing::info!(rows = df.height(), columns = df.width(), "Query returned");
    timer.finish();
    Ok(df)
}

/// Execute a statement (or several, separated by `;`); returns rows affected.
pub async fn execute(config: &ConnectionConfig, statement: &str) -> Result<u64> {
    let sql = match QuerySource::parse(statement) {
        source @ QuerySource::File(_) => source.resolve(config.dialect()?, None)?,
        _ => statement.to_owned(),
    };
    let timer = Timer::start("execute");

    let mut conn = connection::open(config).await?;
    tracing::debug!(%sql, "Executing statement");
    let result = conn.execute(&sql).await;
    conn.close().await;

    let affected = result?;
    timer.finish();
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            QuerySource::parse("reports/monthly.SQL"),
            QuerySource::File(PathBuf::from("reports/monthly.SQL"))
        );
        assert_eq!(
            QuerySource::parse("sales.orders"),
            QuerySource::Object("sales.orders".to_owned())
        );
        assert_eq!(
            QuerySource::parse(" orders "),
            QuerySource::Object("orders".to_owned())
        );
        assert_eq!(
            QuerySource::parse("SELECT count(*) FROM orders"),
            QuerySource::Sql("SELECT count(*) FROM orders".to_owned())
        );
        assert_eq!(
            QuerySource::parse("a.b.c"),
            QuerySource::Sql("a.b.c".to_owned())
        );
    }

    #[test]
    fn test_resolve_object_and_file() {
        let pg = Dialect::Postgres;
        assert_eq!(
            QuerySource::Object("sales.orders".to_owned())
                .resolve(pg, None)
                .unwrap(),
            "SELECT * FROM \"sales\".\"orders\""
        );
        assert_eq!(
            QuerySource::Object("orders".to_owned())
                .resolve(pg, Some("staging"))
                .unwrap(),
            "SELECT * FROM \"staging\".\"orders\""
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.sql");
        std::fs::write(&path, "SELECT 1 AS one").unwrap();
        assert_eq!(
            QuerySource::File(path).resolve(pg, None).unwrap(),
            "SELECT 1 AS one"
        );

        let err = QuerySource::File(dir.path().join("missing.sql"))
            .resolve(pg, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[tokio::test]
    async fn test_query_with_unsupported_dialect() {
        let config = ConnectionConfig::new("sqlite", "localhost", "db");
        let err = query(&config, "orders").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }
}
