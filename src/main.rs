// file: src/main.rs
// version: 2.0.0
// guid: e9c2b6f1-0a47-4d38-95b3-8f1e4a7c2d60

//! Stack Upgrade Agent - Main entry point

use clap::Parser;
use stack_upgrade_agent::{
    cli::{commands::*, Cli, Commands},
    logging, Result,
};
use tokio::signal;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logging::init_json_logger()?;
    } else {
        logging::init_logger(cli.verbose, cli.quiet)?;
    }

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let Cli {
        command,
        config,
        site,
        ..
    } = cli;

    let command_future = async move {
        let site = site.as_deref();
        match command {
            Commands::Upgrade {
                json,
                yes,
                serve_dir,
            } => upgrade_command(&config, site, json, yes, serve_dir).await,
            Commands::Check { json } => check_command(&config, site, json).await,
            Commands::Plan { json } => plan_command(&config, site, json).await,
            Commands::ServeImages { dir, bind } => serve_images_command(&config, dir, bind).await,
        }
    };

    tokio::select! {
        result = command_future => result,
        _ = shutdown_signal => {
            warn!("Interrupted by user");
            std::process::exit(130);
        }
    }
}
