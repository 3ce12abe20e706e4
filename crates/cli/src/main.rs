//! apimart CLI - API marketplace client

mod commands;
mod config;
mod logging;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser};
use commands::Commands;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "apimart", version)]
#[command(about = "Browse, publish and review APIs on the apimart marketplace")]
struct Cli {
    /// More log output; repeat for debug and trace
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Settings file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "APIMART_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for tokens, preferences and logs
    #[arg(short = 'd', long, global = true)]
    state_dir: Option<PathBuf>,

    /// Give up on the command after this many seconds (0 waits forever)
    #[arg(short = 't', long, global = true, default_value_t = 120)]
    timeout: u64,

    /// Log to stderr only
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = config::load_settings(cli.config.as_deref(), cli.state_dir.clone())?;
    logging::init_logging(cli.log_level(), &settings.state_dir, cli.no_file_log)?;
    debug!(base_url = %settings.api_base_url, state_dir = %settings.state_dir.display(), "Loaded settings");

    let limit = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));
    let run = cli.command.execute(settings);
    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(seconds = limit.as_secs(), "Command timed out");
                eprintln!("Error: timed out after {}s", limit.as_secs());
                return Ok(ExitCode::FAILURE);
            }
        },
        None => run.await,
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::parse_from(["apimart", "whoami"]);
        assert_eq!(cli.log_level(), Level::WARN);

        let cli = Cli::parse_from(["apimart", "-vv", "whoami"]);
        assert_eq!(cli.log_level(), Level::DEBUG);

        let cli = Cli::parse_from(["apimart", "-q", "whoami"]);
        assert_eq!(cli.log_level(), Level::ERROR);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["apimart", "-q", "-v", "whoami"]).is_err());
    }
}
