//! # Observability
//!
//! Logging bootstrap shared by `tallyd` and the `tally` CLI.
//!
//! Services call [`init_with_config`] once at startup and then log through
//! the standard `tracing` macros. They never decide where log lines go.
//!
//! ## Outputs
//!
//! - Default: compact human-readable lines on stderr, filtered by `RUST_LOG`
//!   or [`LogConfig::default_level`].
//! - File output: one JSON object per line appended to
//!   `~/.tally/logs/dev.jsonl` (or [`LogConfig::log_path`]), flushed per
//!   line so several processes can share the file, optionally mirrored to
//!   stderr.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "tallyd".into(),
//!     default_level: "debug".into(),
//!     file_output: true,
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSON line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info", "tallyd=trace").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Write structured JSONL to a file instead of compact stderr lines.
    pub file_output: bool,

    /// Custom log file path. Defaults to `~/.tally/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact lines to stderr when file output is enabled.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            file_output: false,
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// # Panics
///
/// Panics if file output is requested and the log file cannot be opened,
/// or if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) {
    if config.file_output {
        file::init_file_subscriber(&config);
        return;
    }

    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .init();
}
