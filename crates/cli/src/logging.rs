use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "cli.log";
const CRATES: [&str; 3] = ["apimart", "apimart_client", "apimart_core"];

/// Send logs to stderr and, unless `no_file_log` is set, append them to
/// `cli.log` in the state directory. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: Level, state_dir: &Path, no_file_log: bool) -> Result<()> {
    let file_layer = if no_file_log {
        None
    } else {
        let file = open_log_file(state_dir)?;
        Some(fmt::layer().with_writer(file).with_ansi(false))
    };

    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Logging was already initialized")
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_ascii_lowercase();
        let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
        EnvFilter::new(directives.join(","))
    })
}

fn open_log_file(state_dir: &Path) -> Result<File> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;
    let path = state_dir.join(LOG_FILE);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}
