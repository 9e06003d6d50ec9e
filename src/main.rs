//! # tabload command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Initialize tracing (stderr, optional rotating files)
//!   └─> Run the subcommand on a Tokio runtime (block_on)
//! ```
//!
//! ```bash
//! tabload upload -c pg.json -f orders.csv -t staging.orders --if-exists replace
//! tabload query -c pg.json staging.orders
//! tabload execute -c pg.json migrations/cleanup.sql
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // CLI output goes to stdout

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    tabload::logging::init(cli.verbose, cli.log_dir.as_deref())?;

    // Database calls are async; the CLI waits on each one in turn.
    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command))
}
