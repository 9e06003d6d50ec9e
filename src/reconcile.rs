//! Schema Reconciler.
//!
//! Decides what happens to the target table before any rows are copied:
//!
//! | table      | policy    | action                              |
//! |------------|-----------|-------------------------------------|
//! | missing    | any       | CREATE (+ OWNER)                    |
//! | exists     | `fail`    | [`LoadError::TableConflict`]        |
//! | exists     | `replace` | DROP + CREATE (+ OWNER)             |
//! | exists     | `append`  | nothing, rows go into the table as is |
//!
//! CREATE and DROP+CREATE each run in one transaction that holds an
//! advisory lock on the schema-qualified table name, so two uploads of the
//! same table cannot interleave their DDL. Existence is checked again once
//! the lock is held. The row transfer that follows is not
//! part of that transaction: a failed load after a `replace` leaves the new,
//! empty table behind.

use crate::connection::{Connection, DdlOutcome, Existence};
use crate::ddl;
use crate::error::{LoadError, Result};
use crate::schema::{TableAddress, TableLayout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Behaviour when the target table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Fail,
    Replace,
    Append,
}

impl FromStr for ConflictPolicy {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            other => Err(LoadError::Config(format!(
                "Unknown conflict policy '{other}', expected fail, replace or append"
            ))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fail => "fail",
            Self::Replace => "replace",
            Self::Append => "append",
        })
    }
}

/// State of the target table once reconciliation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableReady {
    /// The table did not exist and was created from the layout.
    Created,
    /// The table existed and was dropped and recreated from the layout.
    Replaced,
    /// The table existed and is used as is.
    Existing,
}

impl TableReady {
    /// Column list for the COPY statement.
    ///
    /// Tables built from the layout are addressed by name. An existing
    /// table is addressed positionally, so a dataset whose columns do not
    /// line up with the table fails at transfer time instead of silently
    /// leaving columns NULL.
    pub fn copy_columns(self, layout: &TableLayout) -> Option<Vec<String>> {
        match self {
            Self::Created | Self::Replaced => Some(layout.target_names()),
            Self::Existing => None,
        }
    }
}

/// What reconciliation will do for a given probe result, without doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Create,
    Replace,
    Append,
    Conflict,
}

pub fn plan(existence: Existence, policy: ConflictPolicy) -> Plan {
    match (existence, policy) {
        (Existence::Missing, _) => Plan::Create,
        (Existence::Exists, ConflictPolicy::Fail) => Plan::Conflict,
        (Existence::Exists, ConflictPolicy::Replace) => Plan::Replace,
        (Existence::Exists, ConflictPolicy::Append) => Plan::Append,
    }
}

/// How often reconciliation re-plans after losing a race for the DDL lock.
const MAX_DDL_ATTEMPTS: usize = 3;

/// Make `address` ready to receive rows laid out as `layout`.
///
/// The probe result is re-checked under the DDL lock, so two uploads that
/// both saw a missing table end with one `Created` and the other following
/// its policy against the now existing table.
pub async fn reconcile(
    conn: &mut Connection,
    address: &TableAddress,
    layout: &TableLayout,
    policy: ConflictPolicy,
    ownership: Option<&str>,
) -> Result<TableReady> {
    let dialect = conn.dialect();
    let mut existence = conn.probe(address).await?;
    tracing::info!(table = %address, ?existence, %policy, "Reconciling target table");

    let script = ddl::render(layout, address, ownership, dialect);

    for _ in 0..MAX_DDL_ATTEMPTS {
        let (statements, ready): (Vec<String>, TableReady) = match plan(existence, policy) {
            Plan::Conflict => return Err(LoadError::TableConflict(address.to_string())),
            Plan::Append => return Ok(TableReady::Existing),
            Plan::Create => (
                script.statements().map(ToOwned::to_owned).collect(),
                TableReady::Created,
            ),
            Plan::Replace => {
                tracing::warn!(table = %address, "Dropping existing table for replace");
                (
                    std::iter::once(ddl::render_drop(address, dialect))
                        .chain(script.statements().map(ToOwned::to_owned))
                        .collect(),
                    TableReady::Replaced,
                )
            }
        };

        match conn.run_ddl(address, existence, &statements).await? {
            DdlOutcome::Applied => {
                tracing::info!(table = %address, columns = layout.len(), outcome = ?ready, "Table ready");
                return Ok(ready);
            }
            DdlOutcome::Changed(current) => {
                tracing::warn!(
                    table = %address,
                    was = ?existence,
                    now = ?current,
                    "Table changed while waiting for the DDL lock, re-planning"
                );
                existence = current;
            }
        }
    }

    Err(LoadError::Ddl(format!(
        "{address} kept being created and dropped by other sessions, gave up after {MAX_DDL_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use crate::schema::DatasetSchema;
    use polars::prelude::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Fail);
        assert_eq!("Replace".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Replace);
        assert_eq!(" append ".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Append);
        assert_eq!(
            "upsert".parse::<ConflictPolicy>().unwrap_err().kind(),
            ErrorKind::Config
        );
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Fail);
        assert_eq!(ConflictPolicy::Replace.to_string(), "replace");
    }

    #[test]
    fn test_missing_table_is_always_created() {
        for policy in [ConflictPolicy::Fail, ConflictPolicy::Replace, ConflictPolicy::Append] {
            assert_eq!(plan(Existence::Missing, policy), Plan::Create);
        }
    }

    #[test]
    fn test_existing_table_follows_policy() {
        assert_eq!(plan(Existence::Exists, ConflictPolicy::Fail), Plan::Conflict);
        assert_eq!(plan(Existence::Exists, ConflictPolicy::Replace), Plan::Replace);
        assert_eq!(plan(Existence::Exists, ConflictPolicy::Append), Plan::Append);
    }

    #[test]
    fn test_copy_columns_by_outcome() {
        let df = df!("Order ID" => [1i64], "Total" => [2.0f64]).unwrap();
        let schema = DatasetSchema::from_frame(&df).unwrap();
        let layout = TableLayout::build(&schema, Dialect::Postgres, true);

        let named = Some(vec!["order_id".to_owned(), "total".to_owned()]);
        assert_eq!(TableReady::Created.copy_columns(&layout), named);
        assert_eq!(TableReady::Replaced.copy_columns(&layout), named);
        assert_eq!(TableReady::Existing.copy_columns(&layout), None);
    }
}
