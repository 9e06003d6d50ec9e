use crate::config::ConnectionConfig;
use crate::connection;
use crate::error::{LoadError, Result};
use crate::logging::Timer;
use crate::reconcile::{self, ConflictPolicy, TableReady};
use crate::schema::{DatasetSchema, TableAddress, TableLayout};
use crate::transfer;
use polars::prelude::DataFrame;
use serde::Serialize;

/// Caller-selected behaviour of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub policy: ConflictPolicy,
    /// Rows per COPY statement; `None` sends the whole dataset at once.
    pub chunk_size: Option<usize>,
    pub normalize_column_names: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::Fail,
            chunk_size: None,
            normalize_column_names: true,
        }
    }
}

impl UploadOptions {
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    #[must_use]
    pub fn with_normalized_names(mut self, normalize: bool) -> Self {
        self.normalize_column_names = normalize;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(LoadError::Config(
                "chunk size must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub table: String,
    pub outcome: TableReady,
    pub columns: Vec<String>,
    pub rows_written: u64,
}

/// Land `df` in `target` ("schema.table" or "table").
///
/// Opens a connection, reconciles the table according to `options.policy`
/// and bulk-copies the rows. Every failure aborts the call with the
/// [`LoadError`] of the phase that failed; nothing is retried.
///
/// # Errors
///
/// - [`LoadError::UnsupportedDialect`] for a dialect other than PostgreSQL
/// - [`LoadError::Connectivity`] if the database cannot be reached or probed
/// - [`LoadError::TableConflict`] if the table exists and the policy is `fail`
/// - [`LoadError::Ddl`] if CREATE / DROP / OWNER fails
/// - [`LoadError::Transfer`] if COPY fails
pub async fn upload(
    config: &ConnectionConfig,
    df: &DataFrame,
    target: &str,
    options: UploadOptions,
) -> Result<UploadReport> {
    options.validate()?;
    let dialect = config.dialect()?;
    let address = TableAddress::parse(target, config.default_schema())?;
    let timer = Timer::start("upload");
    tracing::info!(
        table = %address,
        rows = df.height(),
        columns = df.width(),
        policy = %options.policy,
        chunk_size = ?options.chunk_size,
        "Uploading dataset"
    );

    let schema = DatasetSchema::from_frame(df)?;
    let layout = TableLayout::build(&schema, dialect, options.normalize_column_names);

    let mut conn = connection::open(config).await?;
    let result = load(&mut conn, config, &address, &layout, df, options).await;
    conn.close().await;

    let (outcome, rows_written) = result?;
    timer.finish();
    Ok(UploadReport {
        table: address.to_string(),
        outcome,
        columns: layout.target_names(),
        rows_written,
    })
}

async fn load(
    conn: &mut connection::Connection,
    config: &ConnectionConfig,
    address: &TableAddress,
    layout: &TableLayout,
    df: &DataFrame,
    options: UploadOptions,
) -> Result<(TableReady, u64)> {
    let outcome =
        reconcile::reconcile(conn, address, layout, options.policy, config.ownership()).await?;

    let columns = outcome.copy_columns(layout);
    let rows = transfer::transfer(
        conn,
        address,
        layout,
        columns.as_deref(),
        df,
        options.chunk_size,
    )
    .await?;
    Ok((outcome, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        df!("id" => [1i64, 2, 3]).unwrap()
    }

    #[test]
    fn test_default_options() {
        let options = UploadOptions::default();
        assert_eq!(options.policy, ConflictPolicy::Fail);
        assert_eq!(options.chunk_size, None);
        assert!(options.normalize_column_names);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_rejected_before_connecting() {
        let config = ConnectionConfig::new("postgres", "unreachable.invalid", "db");
        let options = UploadOptions::default().with_chunk_size(0);
        let err = upload(&config, &frame(), "t", options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_unsupported_dialect_is_rejected_before_connecting() {
        let config = ConnectionConfig::new("oracle", "unreachable.invalid", "db");
        let err = upload(&config, &frame(), "t", UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDialect);
    }

    #[tokio::test]
    async fn test_bad_address_is_rejected_before_connecting() {
        let config = ConnectionConfig::new("postgres", "unreachable.invalid", "db");
        let err = upload(&config, &frame(), "a.b.c", UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connectivity_error() {
        let config = ConnectionConfig::new("postgres", "127.0.0.1", "db")
            .with_port(1)
            .with_credentials("nobody", "nothing");
        let err = upload(&config, &frame(), "t", UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }
}
