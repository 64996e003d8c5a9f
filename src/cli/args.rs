// file: src/cli/args.rs
// version: 2.0.0
// guid: 4e7a1c93-5b0d-4f28-8d61-a3c9e2f7b514

//! Command line argument definitions

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stack-upgrade-agent")]
#[command(about = "Firmware upgrades for Catalyst switch stacks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Run settings file
    #[arg(
        short,
        long,
        global = true,
        env = "STACK_UPGRADE_CONFIG",
        default_value = "config.yaml"
    )]
    pub config: PathBuf,

    /// Use <SITE>_hosts.yaml and <SITE>_groups.yaml
    #[arg(short, long, global = true)]
    pub site: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect, upgrade and reload every selected stack
    Upgrade {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Answer yes at both confirmation gates
        #[arg(short, long)]
        yes: bool,

        /// Serve this image directory over HTTP during the run
        #[arg(long)]
        serve_dir: Option<PathBuf>,
    },

    /// Report running versions and which stacks need an upgrade
    Check {
        #[arg(long)]
        json: bool,
    },

    /// Show the selected devices and image table without connecting
    Plan {
        #[arg(long)]
        json: bool,
    },

    /// Serve an image directory over HTTP until 'x' or Ctrl+C
    ServeImages {
        /// Directory to serve (defaults to image_server.serve_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
}
