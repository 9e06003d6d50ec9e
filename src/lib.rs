//! # tabload - bulk-load DataFrames into PostgreSQL
//!
//! `tabload` takes an in-memory polars [`DataFrame`](polars::prelude::DataFrame)
//! and lands it in a relational table: it derives the table's DDL from the
//! frame's column types, decides whether to create, replace or append to the
//! table, and moves the rows with the database's bulk `COPY` path instead of
//! row-by-row `INSERT`s.
//!
//! ## Quick Start
//!
//! ```no_run
//! use polars::prelude::*;
//! use tabload::{ConflictPolicy, ConnectionConfig, UploadOptions};
//!
//! # async fn example() -> tabload::error::Result<()> {
//! let config = ConnectionConfig::new("postgres", "localhost", "warehouse")
//!     .with_credentials("loader", "secret")
//!     .with_default_schema("staging");
//!
//! let df = df!("Order ID" => [1i64, 2], "Amount" => [9.5f64, 3.0])?;
//!
//! let report = tabload::upload(
//!     &config,
//!     &df,
//!     "staging.orders",
//!     UploadOptions::default().with_policy(ConflictPolicy::Replace),
//! )
//! .await?;
//! println!("{} rows into {}", report.rows_written, report.table);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`loader`]: the [`upload`] entry point
//! - [`reconcile`]: create / replace / append decisions
//! - [`transfer`]: CSV serialization and `COPY ... FROM STDIN`
//! - [`ddl`]: CREATE TABLE / OWNER / DROP rendering
//! - [`types`]: polars type to SQL type mapping
//! - [`schema`]: table addresses, dataset schemas, column layouts, name normalization
//! - [`dialect`]: the closed set of supported databases
//! - [`connection`]: opening connections from [`ConnectionConfig`]
//! - [`query`]: reading tables back and running statements
//! - [`io`]: dataset files on disk
//! - [`logging`]: tracing setup
//! - [`error`]: the error taxonomy
//!
//! ## Concurrency
//!
//! Each call opens its own connection and awaits its steps in order. Uploads
//! to different tables can run concurrently; table DDL is serialized by an
//! advisory lock, but rows appended by concurrent uploads to the same table
//! interleave.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod connection;
pub mod ddl;
pub mod dialect;
pub mod error;
pub mod io;
pub mod loader;
pub mod logging;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod transfer;
pub mod types;

pub use config::ConnectionConfig;
pub use dialect::Dialect;
pub use error::{LoadError, Result};
pub use loader::{UploadOptions, UploadReport, upload};
pub use query::{execute, query};
pub use reconcile::{ConflictPolicy, TableReady};
