// file: src/cli/commands.rs
// version: 2.1.0
// guid: 8b2d5f04-1e7c-4a96-b3f8-6c0a4d9e2f71

//! Command implementations for the CLI

use std::io::BufRead;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::{
    config::{ConfigLoader, Settings},
    network::{ImageServer, IosOutputParser, SshConnector},
    reporter::{ConsoleReporter, RunSummary},
    upgrade::{
        AssumeYes, FleetOrchestrator, PromptProvider, ResultClassifier, RunMode, RunOptions,
        TerminalPrompt, UpgradePlan,
    },
    Result, UpgradeError,
};

fn load(config: &Path, site: Option<&str>) -> Result<(Settings, UpgradePlan)> {
    let loader = ConfigLoader::new();
    let settings = loader.load_settings(config)?;
    let plan = UpgradePlan::from_settings(&settings, site, &loader)?;
    if plan.is_empty() {
        warn!(
            "No hosts with platform {} in the inventory",
            settings.inventory.platform
        );
    }
    Ok((settings, plan))
}

fn orchestrator(
    settings: &Settings,
    plan: UpgradePlan,
    prompt: Arc<dyn PromptProvider>,
    console: bool,
) -> Result<FleetOrchestrator> {
    let connector = SshConnector::new(
        settings.channel.port,
        Duration::from_secs(settings.channel.connect_timeout_secs),
    );

    Ok(FleetOrchestrator::new(
        plan,
        Arc::new(connector),
        Arc::new(IosOutputParser::new()?),
        prompt,
    )
    .with_options(RunOptions::from_settings(settings))
    .with_classifier(ResultClassifier::with_keywords(
        settings.classifier.keywords.clone(),
    ))
    .with_reporter(ConsoleReporter::new(console)))
}

fn bind_address(settings: &Settings) -> Result<SocketAddr> {
    let bind = settings
        .image_server
        .bind
        .clone()
        .unwrap_or_else(|| format!("0.0.0.0:{}", settings.image_server.effective_port()));
    bind.parse()
        .map_err(|e| UpgradeError::config(format!("Invalid image server bind address {}: {}", bind, e)))
}

/// Full upgrade run
pub async fn upgrade_command(
    config: &Path,
    site: Option<&str>,
    json: bool,
    yes: bool,
    serve_dir: Option<PathBuf>,
) -> Result<()> {
    let (settings, plan) = load(config, site)?;

    let serve_dir = serve_dir.or_else(|| settings.image_server.serve_dir.clone());
    settings.image_server.check_serve_dir(serve_dir.as_deref())?;
    let server = match serve_dir {
        Some(dir) => Some(ImageServer::start(bind_address(&settings)?, &dir).await?),
        None => None,
    };

    let prompt: Arc<dyn PromptProvider> = if yes {
        Arc::new(AssumeYes::new(TerminalPrompt::new()))
    } else {
        Arc::new(TerminalPrompt::new())
    };

    let result = orchestrator(&settings, plan, prompt, !json)?
        .run(RunMode::Full)
        .await;

    if let Some(server) = server {
        server.stop().await;
    }
    report_outcome(&result?, json)
}

/// Print the JSON summary when asked; a run stopped at a gate is an error
fn report_outcome(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", summary.to_json()?);
    }

    match summary.aborted_at {
        Some(phase) => Err(UpgradeError::Aborted(phase.to_string())),
        None => Ok(()),
    }
}

/// Inspection and comparison only
pub async fn check_command(config: &Path, site: Option<&str>, json: bool) -> Result<()> {
    let (settings, plan) = load(config, site)?;

    let summary = orchestrator(&settings, plan, Arc::new(TerminalPrompt::new()), !json)?
        .run(RunMode::CheckOnly)
        .await?;

    if json {
        println!("{}", summary.to_json()?);
    }
    Ok(())
}

/// Print the run plan without connecting to any device
pub async fn plan_command(config: &Path, site: Option<&str>, json: bool) -> Result<()> {
    let (_, plan) = load(config, site)?;
    let view = plan.view();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Images from {}", view.image_base_url);
    println!("{} device(s):", view.devices.len());
    for device in &view.devices {
        println!("  {} ({})", device.name, device.hostname);
        if !device.credentials_from_inventory {
            println!("    credentials: prompted at run time");
        }
        for image in &device.images {
            println!(
                "    {:<8} {:<14} {}",
                image.family, image.upgrade_version, image.upgrade_img
            );
        }
    }
    Ok(())
}

/// Serve images until the operator types 'x'
pub async fn serve_images_command(
    config: &Path,
    dir: Option<PathBuf>,
    bind: SocketAddr,
) -> Result<()> {
    let settings = ConfigLoader::new().load_settings(config)?;
    let dir = dir
        .or(settings.image_server.serve_dir)
        .ok_or_else(|| UpgradeError::config("No image directory given"))?;

    let server = ImageServer::start(bind, &dir).await?;
    println!(
        "Serving {} on http://{} (type 'x' to stop)",
        server.root().display(),
        server.local_addr()
    );

    let stopped = tokio::task::spawn_blocking(|| {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("x") => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
        false
    })
    .await
    .map_err(|e| UpgradeError::system(format!("Input task failed: {}", e)))?;

    if !stopped {
        // No interactive input; serve until interrupted
        std::future::pending::<()>().await;
    }

    server.stop().await;
    info!("Image server stopped");
    Ok(())
}
