//! config-bridge - serve a config plugin over stdin/stdout.
//!
//! Runs the bundled passthrough plugin behind the bridge's server adapter,
//! speaking line-delimited JSON-RPC on stdin and stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use config_bridge::{logging, ConfigPlugin, JsonMachineCodec, PassthroughConfig, Settings};

/// Config plugin bridge
#[derive(Parser)]
#[command(name = "config-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Settings file to use instead of the default locations
    #[arg(short, long, global = true, env = "CONFIG_BRIDGE_SETTINGS")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the passthrough plugin on stdin/stdout
    Serve,

    /// Show the effective settings
    Settings {
        /// Show settings directory path
        #[arg(long)]
        path: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load().context("Failed to load settings")?,
    };

    // Setup logging
    logging::init(&settings.log_level(), cli.verbose);

    match cli.command {
        Commands::Serve => cmd_serve(settings)?,
        Commands::Settings { path } => cmd_settings(&settings, path)?,
    }

    Ok(())
}

/// Serve until the host closes stdin.
fn cmd_serve(settings: Settings) -> Result<()> {
    let imp = Arc::new(PassthroughConfig::new(settings.passthrough.clone()));
    let plugin = ConfigPlugin::new(imp, JsonMachineCodec::<Value>::new()).with_settings(settings);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(plugin.serve_stdio())?;

    tracing::debug!("host closed the connection");
    Ok(())
}

fn cmd_settings(settings: &Settings, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Settings::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let toml = toml::to_string_pretty(settings)?;
    println!("{toml}");

    Ok(())
}
