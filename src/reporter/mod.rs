// file: src/reporter/mod.rs
// version: 2.0.0
// guid: 1f8b3d6a-7c24-4e91-b5a0-9e2d6c4f8a13

//! Run reporting: phase banners, per-device progress lines and the run summary

use std::fmt;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use uuid::Uuid;

use crate::device::{HardwareFamily, UpgradeFlag};
use crate::upgrade::classifier::Classification;
use crate::upgrade::machine::{DeviceFailure, DeviceUpgradeMachine, FailureKind, MachineState};
use crate::Result;

/// Width of console banners
pub const BANNER_WIDTH: usize = 80;

/// Fleet phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Inspect,
    Compare,
    Upgrade,
    Reload,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Inspect => "inspect",
            Phase::Compare => "compare",
            Phase::Upgrade => "upgrade",
            Phase::Reload => "reload",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device that ended the run in a failed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedHost {
    pub name: String,
    pub hostname: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl FailedHost {
    pub fn new(name: &str, hostname: &str, failure: &DeviceFailure) -> Self {
        Self {
            name: name.to_string(),
            hostname: hostname.to_string(),
            kind: failure.kind,
            detail: failure.detail.clone(),
        }
    }
}

/// Outcome of one fleet phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Devices the phase acted on
    pub attempted: usize,
    /// Devices that failed during this phase
    pub failed: Vec<FailedHost>,
}

/// Final per-device record
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub name: String,
    pub hostname: String,
    pub family: Option<HardwareFamily>,
    pub hardware: Option<String>,
    pub current_version: Option<String>,
    pub target_version: Option<String>,
    pub upgrade: UpgradeFlag,
    pub staged_for_reload: bool,
    pub state: MachineState,
    pub command: Option<String>,
    pub classification: Option<Classification>,
    pub output_lines: Vec<String>,
    pub failure: Option<DeviceFailure>,
}

impl DeviceReport {
    pub fn from_machine(machine: &DeviceUpgradeMachine) -> Self {
        let device = machine.device();
        Self {
            name: device.identity.name.clone(),
            hostname: device.identity.hostname.clone(),
            family: device.family,
            hardware: device.hardware.clone(),
            current_version: device.current_version.clone(),
            target_version: device.target.as_ref().map(|t| t.upgrade_version.clone()),
            upgrade: device.upgrade,
            staged_for_reload: device.staged_for_reload,
            state: machine.state(),
            command: machine.command().map(|c| c.text.clone()),
            classification: device.last_result.as_ref().map(|r| r.classification),
            output_lines: device
                .last_result
                .as_ref()
                .map(|r| r.lines.clone())
                .unwrap_or_default(),
            failure: machine.failure().cloned(),
        }
    }
}

/// Complete record of a fleet run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub image_base_url: String,
    pub phases: Vec<PhaseReport>,
    pub devices: Vec<DeviceReport>,
    pub needs_upgrade: usize,
    /// Every failed device, once
    pub failed_hosts: Vec<FailedHost>,
    /// Phase the operator declined, if any
    pub aborted_at: Option<Phase>,
}

impl RunSummary {
    pub fn new(image_base_url: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            image_base_url: image_base_url.to_string(),
            phases: Vec::new(),
            devices: Vec::new(),
            needs_upgrade: 0,
            failed_hosts: Vec::new(),
            aborted_at: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    pub fn device(&self, name: &str) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn count_in(&self, state: MachineState) -> usize {
        self.devices.iter().filter(|d| d.state == state).count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Center `title` within the banner width
pub fn center(title: &str) -> String {
    format!("{:^width$}", title, width = BANNER_WIDTH)
}

pub fn separator() -> String {
    "~".repeat(BANNER_WIDTH)
}

/// Human-oriented progress output on stdout
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    enabled: bool,
}

impl ConsoleReporter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Reporter that prints nothing (JSON output, tests)
    pub fn silent() -> Self {
        Self::new(false)
    }

    pub fn banner(&self, title: &str) {
        if !self.enabled {
            return;
        }
        println!("{}", separator());
        println!("{}", center(title).bold());
        println!("{}", separator());
    }

    /// One line per device after a phase
    pub fn device_progress(&self, phase: Phase, machine: &DeviceUpgradeMachine) {
        if !self.enabled {
            return;
        }
        let device = machine.device();
        let name = device.name();

        if let Some(failure) = machine.failure() {
            println!("{}: {}", name.red().bold(), failure.to_string().red());
            return;
        }

        match phase {
            Phase::Inspect => println!(
                "{}: {} ({}) running {}",
                name.bold(),
                device.hardware.as_deref().unwrap_or("unknown"),
                device
                    .family
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                device.current_version.as_deref().unwrap_or("unknown")
            ),
            Phase::Compare => {
                let target = device
                    .target
                    .as_ref()
                    .map(|t| t.upgrade_version.as_str())
                    .unwrap_or("unknown");
                match device.upgrade {
                    UpgradeFlag::NotNeeded => {
                        println!("{}: {} {}", name.bold(), "already running".green(), target)
                    }
                    UpgradeFlag::Needed => println!(
                        "{}: {} {} -> {}",
                        name.bold(),
                        "needs upgrade".yellow(),
                        device.current_version.as_deref().unwrap_or("unknown"),
                        target
                    ),
                    UpgradeFlag::Unknown => println!("{}: {}", name.bold(), machine.state()),
                }
                if device.staged_for_reload {
                    println!(
                        "{}: {} will run {} after the next reload",
                        name.bold(),
                        "staged".cyan(),
                        target
                    );
                }
            }
            Phase::Upgrade => {
                if let Some(result) = &device.last_result {
                    for line in &result.lines {
                        println!("{}: {}", name.bold(), line);
                    }
                }
                println!("{}: {}", name.bold(), machine.state().to_string().green());
            }
            Phase::Reload => {
                println!("{}: {}", name.bold(), "reload issued".green());
            }
        }
    }

    /// Failed devices of one phase
    pub fn phase_failures(&self, report: &PhaseReport) {
        if !self.enabled {
            return;
        }
        if report.failed.is_empty() {
            println!(
                "{} phase: {} device(s), no failures",
                report.phase, report.attempted
            );
            return;
        }
        println!(
            "{} phase: {} of {} device(s) failed",
            report.phase,
            report.failed.len().to_string().red().bold(),
            report.attempted
        );
        for host in &report.failed {
            println!("  {} ({}): {}", host.name.red(), host.kind, host.detail);
        }
    }

    pub fn aborted(&self, phase: Phase) {
        if !self.enabled {
            return;
        }
        println!(
            "{}",
            format!("Aborted before the {} phase", phase).yellow().bold()
        );
    }

    /// Final summary; the failed-hosts list is always printed
    pub fn summary(&self, summary: &RunSummary) {
        if !self.enabled {
            return;
        }
        self.banner("Run summary");
        println!("Run ID: {}", summary.run_id);
        println!("Devices: {}", summary.devices.len());
        println!("Needed upgrade: {}", summary.needs_upgrade);
        println!(
            "Not needed: {}  Upgraded and reloaded: {}  Awaiting reload: {}",
            summary.count_in(MachineState::NotNeeded),
            summary.count_in(MachineState::Verified),
            summary.count_in(MachineState::AwaitingReloadConfirm)
        );
        if let Some(phase) = summary.aborted_at {
            println!("{}", format!("Aborted before the {} phase", phase).yellow());
        }

        println!();
        println!("Failed hosts: {}", summary.failed_hosts.len());
        for host in &summary.failed_hosts {
            println!(
                "  {} ({}) {}: {}",
                host.name.red().bold(),
                host.hostname,
                host.kind,
                host.detail
            );
        }
        println!("{}", separator());
    }
}
