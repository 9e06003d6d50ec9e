//! Error taxonomy for table loads.
//!
//! Every failure of an upload is tagged with the phase it happened in, so a
//! caller can tell "the database is unreachable" apart from "the table is
//! already there" without parsing messages:
//!
//! ```
//! use tabload::error::{ErrorKind, LoadError};
//!
//! fn should_retry(err: &LoadError) -> bool {
//!     match err.kind() {
//!         ErrorKind::Connectivity => true,
//!         ErrorKind::TableConflict | ErrorKind::Ddl | ErrorKind::Transfer => false,
//!         _ => false,
//!     }
//! }
//! # assert!(!should_retry(&LoadError::TableConflict("public.sales".to_owned())));
//! ```
//!
//! Driver errors are never converted with a blanket `From<sqlx::Error>`:
//! the same driver error means `Connectivity` while probing and `Transfer`
//! while copying, so each call site picks the variant explicitly.

use std::fmt;

/// Main error type for load operations.
#[derive(Debug)]
pub enum LoadError {
    /// The database could not be reached, or a probe failed for a reason
    /// other than a missing table.
    Connectivity(String),

    /// The dialect named in the configuration is not supported.
    UnsupportedDialect(String),

    /// The target table exists and the conflict policy is `fail`.
    TableConflict(String),

    /// CREATE / DROP / ALTER failed.
    Ddl(String),

    /// The bulk copy failed (malformed rows, type or column mismatches).
    Transfer(String),

    /// Invalid or missing configuration, table address or options.
    Config(String),

    /// A supplementary query or statement failed.
    Query(String),

    /// Polars failed outside of the transfer path (reading files, parsing results).
    DataProcessing(String),

    /// I/O errors (reading config, SQL or dataset files).
    Io(std::io::Error),
}

/// Field-less mirror of [`LoadError`], convenient for matching and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    UnsupportedDialect,
    TableConflict,
    Ddl,
    Transfer,
    Config,
    Query,
    DataProcessing,
    Io,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::UnsupportedDialect(_) => ErrorKind::UnsupportedDialect,
            Self::TableConflict(_) => ErrorKind::TableConflict,
            Self::Ddl(_) => ErrorKind::Ddl,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Config(_) => ErrorKind::Config,
            Self::Query(_) => ErrorKind::Query,
            Self::DataProcessing(_) => ErrorKind::DataProcessing,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// The message without its variant prefix, for nesting inside another error.
    pub fn detail(&self) -> String {
        match self {
            Self::Connectivity(msg)
            | Self::UnsupportedDialect(msg)
            | Self::Ddl(msg)
            | Self::Transfer(msg)
            | Self::Config(msg)
            | Self::Query(msg)
            | Self::DataProcessing(msg) => msg.clone(),
            Self::TableConflict(_) | Self::Io(_) => self.to_string(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity(msg) => write!(f, "Connectivity error: {msg}"),
            Self::UnsupportedDialect(dialect) => write!(f, "Unsupported dialect: {dialect}"),
            Self::TableConflict(table) => {
                write!(f, "Table {table} already exists, cancelling data upload")
            }
            Self::Ddl(msg) => write!(f, "DDL error: {msg}"),
            Self::Transfer(msg) => write!(f, "Transfer error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Query(msg) => write!(f, "Query error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for LoadError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

/// Result type alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Attach a phase to a foreign error, e.g. `.phase(LoadError::Ddl, "create table")`.
pub trait ResultExt<T> {
    fn phase(self, variant: fn(String) -> LoadError, context: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn phase(self, variant: fn(String) -> LoadError, context: &str) -> Result<T> {
        self.map_err(|e| variant(format!("{context}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::TableConflict("public.sales".to_owned());
        assert_eq!(
            err.to_string(),
            "Table public.sales already exists, cancelling data upload"
        );
        assert_eq!(
            LoadError::UnsupportedDialect("oracle".to_owned()).to_string(),
            "Unsupported dialect: oracle"
        );
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(LoadError::Ddl(String::new()).kind(), ErrorKind::Ddl);
        assert_eq!(
            LoadError::Transfer(String::new()).kind(),
            ErrorKind::Transfer
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        assert_eq!(LoadError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_phase_tags_foreign_errors() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));

        let err = result
            .phase(LoadError::Connectivity, "open connection")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.to_string().contains("open connection: refused"));
    }

    #[test]
    fn test_detail_drops_variant_prefix() {
        let err = LoadError::Transfer("COPY command failed: bad row".to_owned());
        assert_eq!(err.detail(), "COPY command failed: bad row");
        assert_eq!(
            LoadError::TableConflict("public.sales".to_owned()).detail(),
            "Table public.sales already exists, cancelling data upload"
        );
    }
}
