//! Supported SQL dialects.
//!
//! The set is closed: every capability an upload needs (type rendering,
//! identifier quoting, the existence probe, the bulk-copy statement) is a
//! `match` over [`Dialect`]. Adding a database means adding a variant and
//! filling in each arm.

use crate::error::{LoadError, Result};
use crate::schema::TableAddress;
use crate::types::{POSTGRES_TYPES, TypeMap, TypeTag};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
}

/// What a failed existence probe tells us about the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The database positively reported that the relation (or its schema) does not exist.
    Missing,
    /// Anything else. Never treated as "missing".
    Unknown,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
        }
    }

    pub fn type_map(self) -> &'static TypeMap {
        match self {
            Self::Postgres => &POSTGRES_TYPES,
        }
    }

    pub fn render_type(self, tag: TypeTag) -> &'static str {
        self.type_map().sql_type(tag)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
        }
    }

    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Fully qualified, quoted table name.
    pub fn qualified(self, address: &TableAddress) -> String {
        match address.schema() {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(address.table())
            ),
            None => self.quote_ident(address.table()),
        }
    }

    pub fn probe_sql(self, address: &TableAddress) -> String {
        match self {
            Self::Postgres => format!("SELECT 1 FROM {} LIMIT 1", self.qualified(address)),
        }
    }

    /// Classify a probe failure by its SQLSTATE.
    pub fn classify_probe_failure(self, sqlstate: Option<&str>) -> ProbeFailure {
        match (self, sqlstate) {
            // undefined_table, invalid_schema_name
            (Self::Postgres, Some("42P01" | "3F000")) => ProbeFailure::Missing,
            (Self::Postgres, _) => ProbeFailure::Unknown,
        }
    }

    /// Advisory lock statement taken before DDL.
    ///
    /// Binds the schema (`$1`, may be NULL) and the table (`$2`). A missing
    /// schema resolves to `current_schema()`, so `orders` and `public.orders`
    /// contend for the same lock.
    pub fn ddl_lock_sql(self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT pg_advisory_xact_lock(hashtext(\
                 quote_ident(coalesce($1::text, current_schema())) || '.' || quote_ident($2::text)))"
            }
        }
    }

    /// Existence check that cannot fail on a missing table, safe to run
    /// inside the DDL transaction. Binds the qualified table name as `$1`.
    pub fn exists_sql(self) -> &'static str {
        match self {
            Self::Postgres => "SELECT to_regclass($1) IS NOT NULL",
        }
    }

    /// Bulk-load statement for CSV input on stdin.
    ///
    /// With `columns`, fields bind by name in the given order; without, they
    /// bind positionally to the table's own column order.
    pub fn copy_in_sql(self, address: &TableAddress, columns: Option<&[String]>) -> String {
        match self {
            Self::Postgres => {
                let target = match columns {
                    Some(cols) => {
                        let list: Vec<String> =
                            cols.iter().map(|c| self.quote_ident(c)).collect();
                        format!("{} ({})", self.qualified(address), list.join(", "))
                    }
                    None => self.qualified(address),
                };
                format!("COPY {target} FROM STDIN WITH (FORMAT csv, NULL '')")
            }
        }
    }

    pub fn copy_out_sql(self, query: &str) -> String {
        let query = query.trim().trim_end_matches(';').trim_end();
        match self {
            Self::Postgres => format!("COPY ({query}) TO STDOUT WITH (FORMAT csv, HEADER true)"),
        }
    }
}

impl FromStr for Dialect {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(LoadError::UnsupportedDialect(s.to_owned())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
