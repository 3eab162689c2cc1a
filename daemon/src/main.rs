//! Sortes daemon: operator command line for the oracle node.

mod commands;

use clap::Parser;
use sortes_node::{init_logging, NodeConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sortes", about = "Sortes verifiable randomness oracle")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "SORTES_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding encrypted VRF key files.
    #[arg(long, env = "SORTES_KEYSTORE_DIR")]
    keystore_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "SORTES_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "SORTES_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Manage encrypted VRF keys.
    Keys {
        #[command(subcommand)]
        action: commands::KeysAction,
    },
    /// Generate or verify VRF proofs.
    Proof {
        #[command(subcommand)]
        action: commands::ProofAction,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(&path.to_string_lossy())?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &cli.keystore_dir {
        config.keystore_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_format()?, &config.log_level)?;

    if let Some(path) = &cli.config {
        tracing::debug!(path = %path.display(), "loaded config");
    }

    match cli.command {
        Command::Keys { action } => commands::run_keys(&config, action),
        Command::Proof { action } => commands::run_proof(&config, action),
        Command::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
