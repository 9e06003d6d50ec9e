//! Logging setup and operation timing.
//!
//! Library code only emits `tracing` events; the binary decides where they
//! go by calling [`init`] once at startup.
//!
//! ```no_run
//! tabload::logging::init(1, None).expect("Failed to initialize logging");
//! tracing::info!("ready");
//! ```

use std::path::Path;
use std::time::Instant;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Default filter for a `-v` count: warn, info, debug, trace.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `verbosity`. With `log_dir`, events are also written
/// to a daily-rotated `tabload.<date>.log` there (at most 10 files kept).
///
/// # Errors
///
/// Returns error if the filter is invalid, the log directory cannot be
/// created or a subscriber is already installed.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_for_verbosity(verbosity)))
        .context("Failed to create env filter")?;

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .boxed();

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(10)
                .filename_prefix("tabload")
                .filename_suffix("log")
                .build(dir)
                .context("Failed to create file appender")?;
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_ansi(false)
                    .with_writer(appender)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Logs the start of an operation and, on [`Timer::finish`], how long it took.
#[derive(Debug)]
pub struct Timer {
    operation: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        tracing::info!(operation, "{operation} started");
        Self {
            operation,
            started: Instant::now(),
        }
    }

    pub fn finish(self) {
        let elapsed = self.started.elapsed();
        tracing::info!(
            operation = self.operation,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} completed in {elapsed:.3?}",
            self.operation
        );
    }
}
