//! buildgate CLI entry point

use buildgate::cli::args::{ConfigAction, ConfigArgs};
use buildgate::cli::{commands, Cli, Commands};
use buildgate::config::schema::GeneralConfig;
use buildgate::config::{Config, ConfigManager};
use buildgate::error::ControlResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ControlResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Init has to work even when the existing file is broken
    let config = match &cli.command {
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. }),
        }) => Config::default(),
        _ => manager.load().await?,
    };

    init_logging(cli.verbose, &config.general);
    debug!("Using config at {}", manager.path().display());

    match cli.command {
        Commands::Ref(args) => commands::reference(args),
        Commands::Config(args) => commands::config(args, &manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `general.verbose` raises 0 to info
fn init_logging(verbose: u8, general: &GeneralConfig) {
    let filter = match verbose {
        0 if !general.verbose => EnvFilter::new("buildgate=warn"),
        0 | 1 => EnvFilter::new("buildgate=info"),
        _ => EnvFilter::new("buildgate=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
