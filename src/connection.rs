//! Connection Provider.
//!
//! One fresh connection per public operation; nothing is pooled or cached
//! between calls. Timeouts are whatever the driver does by default.

use crate::config::ConnectionConfig;
use crate::dialect::{Dialect, ProbeFailure};
use crate::error::{LoadError, Result, ResultExt as _};
use crate::schema::TableAddress;
use futures_util::TryStreamExt as _;
use sqlx::Connection as _;
use sqlx::postgres::{PgConnectOptions, PgConnection};

/// An open session, one variant per supported dialect.
pub enum Connection {
    Postgres(PgConnection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Missing,
}

/// Result of [`Connection::run_ddl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOutcome {
    Applied,
    /// The table's existence changed before the lock was acquired.
    Changed(Existence),
}

/// Open a connection from structured settings.
///
/// The options are assembled field by field rather than from a formatted
/// URL, so credentials containing `@`, `:` or `/` need no escaping.
pub async fn open(config: &ConnectionConfig) -> Result<Connection> {
    let dialect = config.dialect()?;
    let (host, port) = config.resolved_endpoint(dialect.default_port())?;

    match dialect {
        Dialect::Postgres => {
            let mut options = PgConnectOptions::new()
                .host(&host)
                .port(port)
                .database(&config.database_name)
                .application_name("tabload");
            if !config.user_name.is_empty() {
                options = options.username(&config.user_name);
            }
            if !config.password().is_empty() {
                options = options.password(config.password());
            }

            tracing::info!(
                host = %host,
                port,
                database = %config.database_name,
                user = %config.user_name,
                "Connecting to PostgreSQL"
            );
            let conn = PgConnection::connect_with(&options).await.phase(
                LoadError::Connectivity,
                &format!("Failed to connect to PostgreSQL at {host}:{port}"),
            )?;
            Ok(Connection::Postgres(conn))
        }
    }
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Check whether `address` exists.
    ///
    /// Only an error the database itself attributes to a missing relation
    /// counts as [`Existence::Missing`]; every other failure is a
    /// connectivity error, so an unreachable table is never mistaken for an
    /// absent one.
    pub async fn probe(&mut self, address: &TableAddress) -> Result<Existence> {
        let dialect = self.dialect();
        let sql = dialect.probe_sql(address);
        tracing::debug!(%sql, "Probing table existence");

        match self {
            Self::Postgres(conn) => match sqlx::query(&sql).fetch_optional(&mut *conn).await {
                Ok(_) => Ok(Existence::Exists),
                Err(err) => {
                    let code = err
                        .as_database_error()
                        .and_then(|db| db.code())
                        .map(|c| c.into_owned());
                    match dialect.classify_probe_failure(code.as_deref()) {
                        ProbeFailure::Missing => Ok(Existence::Missing),
                        ProbeFailure::Unknown => Err(LoadError::Connectivity(format!(
                            "Existence probe for {address} failed: {err}"
                        ))),
                    }
                }
            },
        }
    }

    /// Run DDL statements for `address` in one transaction under an advisory
    /// lock on the table name.
    ///
    /// Once the lock is held the table's existence is checked again. If it
    /// no longer matches `expected` (another session created or dropped it
    /// since the probe), nothing is executed and the current state is
    /// returned as [`DdlOutcome::Changed`].
    pub async fn run_ddl(
        &mut self,
        address: &TableAddress,
        expected: Existence,
        statements: &[String],
    ) -> Result<DdlOutcome> {
        let dialect = self.dialect();
        let qualified = dialect.qualified(address);
        match self {
            Self::Postgres(conn) => {
                let mut tx = conn
                    .begin()
                    .await
                    .phase(LoadError::Connectivity, "Failed to begin DDL transaction")?;

                sqlx::query(dialect.ddl_lock_sql())
                    .bind(address.schema())
                    .bind(address.table())
                    .execute(&mut *tx)
                    .await
                    .phase(LoadError::Ddl, &format!("Failed to lock {qualified}"))?;

                let exists: bool = sqlx::query_scalar(dialect.exists_sql())
                    .bind(qualified.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .phase(LoadError::Ddl, &format!("Failed to re-check {qualified}"))?;
                let current = if exists {
                    Existence::Exists
                } else {
                    Existence::Missing
                };
                if current != expected {
                    // Dropping the transaction rolls it back and releases the lock.
                    return Ok(DdlOutcome::Changed(current));
                }

                for statement in statements {
                    tracing::debug!(sql = %statement, "Executing DDL");
                    sqlx::raw_sql(statement)
                        .execute(&mut *tx)
                        .await
                        .phase(LoadError::Ddl, &format!("Failed to execute '{statement}'"))?;
                }

                tx.commit()
                    .await
                    .phase(LoadError::Ddl, "Failed to commit DDL transaction")?;
                Ok(DdlOutcome::Applied)
            }
        }
    }

    /// Stream one CSV buffer through a single COPY statement; returns rows committed.
    pub async fn copy_in(&mut self, statement: &str, data: Vec<u8>) -> Result<u64> {
        match self {
            Self::Postgres(conn) => {
                let mut copy = conn
                    .copy_in_raw(statement)
                    .await
                    .phase(LoadError::Transfer, "Failed to initiate COPY command")?;

                let sent = copy.send(data).await.map(|_| ());
                if let Err(err) = sent {
                    if let Err(abort_err) = copy.abort("tabload: sending rows failed").await {
                        tracing::warn!(error = %abort_err, "Failed to abort COPY");
                    }
                    return Err(LoadError::Transfer(format!(
                        "Failed to send rows via COPY: {err}"
                    )));
                }

                copy.finish()
                    .await
                    .phase(LoadError::Transfer, "COPY command failed")
            }
        }
    }

    /// Run a COPY ... TO STDOUT statement and collect its output.
    pub async fn copy_out(&mut self, statement: &str) -> Result<Vec<u8>> {
        match self {
            Self::Postgres(conn) => {
                let mut stream = conn
                    .copy_out_raw(statement)
                    .await
                    .phase(LoadError::Query, "Failed to start COPY TO STDOUT")?;

                let mut buf = Vec::new();
                while let Some(chunk) = stream
                    .try_next()
                    .await
                    .phase(LoadError::Query, "Failed to read COPY output")?
                {
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf)
            }
        }
    }

    /// Execute one or more statements with the simple query protocol.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        match self {
            Self::Postgres(conn) => sqlx::raw_sql(sql)
                .execute(&mut *conn)
                .await
                .map(|done| done.rows_affected())
                .phase(LoadError::Query, "Failed to execute statement"),
        }
    }

    pub async fn close(self) {
        match self {
            Self::Postgres(conn) => {
                if let Err(err) = conn.close().await {
                    tracing::warn!(error = %err, "Failed to close PostgreSQL connection cleanly");
                }
            }
        }
    }
}
