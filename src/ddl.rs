//! DDL Generator.
//!
//! Renders statements only; executing them is the reconciler's job.

use crate::dialect::Dialect;
use crate::schema::{TableAddress, TableLayout};

/// CREATE TABLE plus the optional ownership statement for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateScript {
    pub create: String,
    pub owner: Option<String>,
}

impl CreateScript {
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.create.as_str()).chain(self.owner.as_deref())
    }
}

/// `"name" TYPE` pairs in layout order, one per line.
pub fn render_column_definitions(layout: &TableLayout, dialect: Dialect) -> String {
    layout
        .columns()
        .iter()
        .map(|c| format!("    {} {}", dialect.quote_ident(&c.name), c.sql_type))
        .collect::<Vec<_>>()
        .join(",\n")
}

/// Column names in `layout` are already normalized (or deliberately not) by
/// [`TableLayout::build`], so rendering never renames anything.
pub fn render(
    layout: &TableLayout,
    address: &TableAddress,
    ownership: Option<&str>,
    dialect: Dialect,
) -> CreateScript {
    let table = dialect.qualified(address);
    let create = format!(
        "CREATE TABLE {table} (\n{}\n)",
        render_column_definitions(layout, dialect)
    );
    let owner = ownership
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(|role| format!("ALTER TABLE {table} OWNER TO {}", dialect.quote_ident(role)));

    CreateScript { create, owner }
}

pub fn render_drop(address: &TableAddress, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.qualified(address))
}
