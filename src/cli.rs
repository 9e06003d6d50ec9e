use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabload::io::{read_dataset, write_dataset};
use tabload::schema::normalize_identifier;
use tabload::{ConflictPolicy, ConnectionConfig, UploadOptions};

#[derive(Parser)]
#[command(name = "tabload", about = "Bulk-load tabular files into PostgreSQL")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write rotating log files to this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a CSV, Parquet or JSON file into a table
    Upload {
        /// Connection config (JSON)
        #[arg(short, long, env = "TABLOAD_CONFIG")]
        config: PathBuf,

        /// File to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Target table, "schema.table" or "table". Defaults to the normalized file stem.
        #[arg(short, long)]
        table: Option<String>,

        /// What to do when the table already exists
        #[arg(long, default_value = "fail", value_parser = parse_policy)]
        if_exists: ConflictPolicy,

        /// Rows per COPY statement
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Keep column names as they are instead of normalizing them
        #[arg(long)]
        keep_column_names: bool,
    },
    /// Run a query (SQL, .sql file or table name) and print or save the result
    Query {
        #[arg(short, long, env = "TABLOAD_CONFIG")]
        config: PathBuf,

        source: String,

        /// Save the result (.csv or .parquet) instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a statement or .sql file
    Execute {
        #[arg(short, long, env = "TABLOAD_CONFIG")]
        config: PathBuf,

        statement: String,
    },
}

fn parse_policy(s: &str) -> std::result::Result<ConflictPolicy, String> {
    s.parse().map_err(|e: tabload::LoadError| e.to_string())
}

pub async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Upload {
            config,
            file,
            table,
            if_exists,
            chunk_size,
            keep_column_names,
        } => {
            let options = UploadOptions {
                policy: if_exists,
                chunk_size,
                normalize_column_names: !keep_column_names,
            };
            handle_upload(&config, &file, table, options).await
        }
        Commands::Query {
            config,
            source,
            output,
        } => handle_query(&config, &source, output.as_deref()).await,
        Commands::Execute { config, statement } => handle_execute(&config, &statement).await,
    }
}

fn load_config(path: &Path) -> Result<ConnectionConfig> {
    ConnectionConfig::from_json_file(path)
        .with_context(|| format!("Failed to load connection config {}", path.display()))
}

/// Table name derived from the file stem.
///
/// Normalized so that dots in `orders.2024.csv` are not read as a schema separator.
fn default_table_name(file: &Path) -> Result<String> {
    let stem = file
        .file_stem()
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", file.display()))?;
    Ok(normalize_identifier(&stem.to_string_lossy()))
}

async fn handle_upload(
    config_path: &Path,
    file: &Path,
    table: Option<String>,
    options: UploadOptions,
) -> Result<()> {
    let config = load_config(config_path)?;
    let table = match table {
        Some(t) => t,
        None => default_table_name(file)?,
    };

    println!("Uploading {} into {table}...", file.display());
    let df = read_dataset(file).context("Failed to load dataset")?;

    let report = tabload::upload(&config, &df, &table, options)
        .await
        .with_context(|| format!("Upload into {table} failed"))?;

    println!(
        "Wrote {} rows into {} ({:?}, {} columns).",
        report.rows_written,
        report.table,
        report.outcome,
        report.columns.len()
    );
    Ok(())
}

async fn handle_query(config_path: &Path, source: &str, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut df = tabload::query(&config, source).await.context("Query failed")?;

    if let Some(path) = output {
        write_dataset(&mut df, path)
            .with_context(|| format!("Failed to save result to {}", path.display()))?;
        println!("Saved {} rows to {}.", df.height(), path.display());
    } else {
        println!("{df}");
    }
    Ok(())
}

async fn handle_execute(config_path: &Path, statement: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let affected = tabload::execute(&config, statement)
        .await
        .context("Execute failed")?;
    println!("OK ({affected} rows affected).");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_upload_args() {
        let cli = Cli::try_parse_from([
            "tabload",
            "-v",
            "upload",
            "--config",
            "pg.json",
            "--file",
            "data/Orders 2024.csv",
            "--if-exists",
            "replace",
            "--chunk-size",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);

        let Commands::Upload {
            table,
            if_exists,
            chunk_size,
            keep_column_names,
            file,
            ..
        } = cli.command
        else {
            panic!("expected upload command");
        };
        assert_eq!(table, None);
        assert_eq!(if_exists, ConflictPolicy::Replace);
        assert_eq!(chunk_size, Some(500));
        assert!(!keep_column_names);
        assert_eq!(default_table_name(&file).unwrap(), "orders_2024");
    }

    #[test]
    fn test_default_table_name_has_no_schema_separator() {
        let name = default_table_name(Path::new("exports/orders.2024.csv")).unwrap();
        assert_eq!(name, "orders_2024");
        let address = tabload::schema::TableAddress::parse(&name, None).unwrap();
        assert_eq!(address.schema(), None);
        assert_eq!(address.table(), "orders_2024");
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = Cli::try_parse_from([
            "tabload", "upload", "-c", "pg.json", "-f", "a.csv", "--if-exists", "merge",
        ]);
        assert!(result.is_err());
    }
}
