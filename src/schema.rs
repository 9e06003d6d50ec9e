//! Table addresses, dataset schemas and the column layout shared by DDL and COPY.

use crate::dialect::Dialect;
use crate::error::{LoadError, Result};
use crate::types::TypeTag;
use polars::prelude::DataFrame;
use std::collections::HashSet;
use std::fmt;

/// `schema.table` or bare `table`, the latter picking up the configured default schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAddress {
    schema: Option<String>,
    table: String,
}

impl TableAddress {
    pub fn parse(address: &str, default_schema: Option<&str>) -> Result<Self> {
        let parts: Vec<&str> = address.trim().split('.').map(str::trim).collect();
        match parts.as_slice() {
            [table] if !table.is_empty() => Ok(Self {
                schema: default_schema
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned),
                table: (*table).to_owned(),
            }),
            [schema, table] if !schema.is_empty() && !table.is_empty() => Ok(Self {
                schema: Some((*schema).to_owned()),
                table: (*table).to_owned(),
            }),
            _ => Err(LoadError::Config(format!(
                "Invalid table address '{address}', expected 'schema.table' or 'table'"
            ))),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// Column names and semantic types of a dataset, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSchema {
    columns: Vec<(String, TypeTag)>,
}

impl DatasetSchema {
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let columns: Vec<(String, TypeTag)> = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), TypeTag::from_dtype(c.dtype())))
            .collect();

        if columns.is_empty() {
            return Err(LoadError::Config(
                "Dataset has no columns, nothing to upload".to_owned(),
            ));
        }
        Ok(Self { columns })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeTag)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One column of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name in the DataFrame.
    pub source: String,
    /// Column name in the table (normalized or not).
    pub name: String,
    pub tag: TypeTag,
    pub sql_type: &'static str,
    /// No type mapping exists, so the column is stored as text and its values
    /// are rendered as text before transfer.
    pub text_fallback: bool,
}

/// Ordered column list of the target table.
///
/// Built once per upload and handed to both the DDL generator and the bulk
/// transfer, so the CREATE TABLE column order and the serialized field order
/// come from the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    columns: Vec<ColumnSpec>,
}

impl TableLayout {
    pub fn build(schema: &DatasetSchema, dialect: Dialect, normalize_names: bool) -> Self {
        let sources: Vec<String> = schema.iter().map(|(n, _)| n.to_owned()).collect();
        let names = if normalize_names {
            normalize_column_names(&sources)
        } else {
            sources.clone()
        };

        let type_map = dialect.type_map();
        let columns = schema
            .iter()
            .zip(sources)
            .zip(names)
            .map(|(((_, tag), source), name)| {
                let text_fallback = type_map.lookup(tag).is_none();
                if text_fallback {
                    tracing::warn!(
                        column = %source,
                        tag = %tag,
                        fallback = type_map.default_text(),
                        "No {dialect} type mapping for column type, using text"
                    );
                }
                ColumnSpec {
                    source,
                    name,
                    tag,
                    sql_type: type_map.sql_type(tag),
                    text_fallback,
                }
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.source.as_str()).collect()
    }

    pub fn target_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Normalize free text into an unquoted-identifier-safe key.
///
/// Lower-cases, turns every run of non-alphanumeric characters into a single
/// `_`, trims `_` from both ends, prefixes `col_` when the result starts with
/// a digit and returns `col` for an empty result.
pub fn normalize_identifier(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_separator = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            result.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('_');
            last_was_separator = true;
        }
    }

    let result = result.trim_matches('_');
    if result.is_empty() {
        "col".to_owned()
    } else if result.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{result}")
    } else {
        result.to_owned()
    }
}

/// Normalize every name, suffixing `_1`, `_2`, ... where two names collide.
pub fn normalize_column_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| {
            let base = normalize_identifier(name);
            let mut candidate = base.clone();
            let mut count = 0;
            while seen.contains(&candidate) {
                count += 1;
                candidate = format!("{base}_{count}");
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}
