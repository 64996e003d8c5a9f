// file: src/config/mod.rs
// version: 2.1.0
// guid: b7d1f4a6-2c93-4e58-a0f2-6e8c1d5b3a97

//! Configuration module for the stack upgrade agent
//!
//! Handles loading and validation of run settings and the device inventory.

pub mod inventory;
pub mod loader;

pub use inventory::{ImageTable, Inventory, InventoryHost};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::upgrade::classifier::{default_keywords, Keyword};
use crate::{Result, UpgradeError};

/// Top-level run settings (`config.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub inventory: InventorySettings,
    pub runner: RunnerSettings,
    pub channel: ChannelSettings,
    pub image_server: ImageServerSettings,
    pub classifier: ClassifierSettings,
}

/// Inventory file locations and host filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySettings {
    pub hosts: PathBuf,
    pub groups: PathBuf,
    pub defaults: PathBuf,
    /// Only hosts with this platform tag are selected
    pub platform: String,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            hosts: PathBuf::from("inventory/hosts.yaml"),
            groups: PathBuf::from("inventory/groups.yaml"),
            defaults: PathBuf::from("inventory/defaults.yaml"),
            platform: "ios".to_string(),
        }
    }
}

impl InventorySettings {
    /// Site-specific host and group files (`<site>_hosts.yaml`); defaults are shared
    pub fn for_site(&self, site: Option<&str>) -> Self {
        let Some(site) = site.filter(|s| !s.is_empty()) else {
            return self.clone();
        };
        let prefixed = |path: &PathBuf| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            path.with_file_name(format!("{}_{}", site, name))
        };
        Self {
            hosts: prefixed(&self.hosts),
            groups: prefixed(&self.groups),
            defaults: self.defaults.clone(),
            platform: self.platform.clone(),
        }
    }
}

/// Phase concurrency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub inspect_workers: usize,
    pub upgrade_workers: usize,
    pub reload_workers: usize,
    /// Run "show boot" during inspection to detect staged images
    pub check_boot: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            inspect_workers: 10,
            upgrade_workers: 1,
            reload_workers: 1,
            check_boot: true,
        }
    }
}

/// SSH channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Scales read timeouts for the upgrade command
    pub delay_factor: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_secs: 30,
            delay_factor: 150,
        }
    }
}

/// Transfer protocol devices use to fetch images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageScheme {
    #[default]
    Http,
    Ftp,
}

impl ImageScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageScheme::Http => "http",
            ImageScheme::Ftp => "ftp",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ImageScheme::Http => 8000,
            ImageScheme::Ftp => 21,
        }
    }

    /// Inventory defaults key holding the server address
    pub fn inventory_key(&self) -> &'static str {
        match self {
            ImageScheme::Http => "http_ip",
            ImageScheme::Ftp => "ftp_ip",
        }
    }
}

/// Image distribution service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageServerSettings {
    pub scheme: ImageScheme,
    /// Address devices use to reach the server; falls back to
    /// `http_ip`/`ftp_ip` from the inventory defaults
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Serve this directory over HTTP for the duration of the run
    pub serve_dir: Option<PathBuf>,
    /// Local bind address for the built-in server (defaults to 0.0.0.0)
    pub bind: Option<String>,
}

impl ImageServerSettings {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Base URL for images, e.g. `http://10.1.1.5:8000`
    pub fn base_url(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UpgradeError::config("Image server host is not configured"))?;
        let port = self.effective_port();

        let url = match (self.scheme, port) {
            (ImageScheme::Ftp, 21) | (ImageScheme::Http, 80) => {
                format!("{}://{}", self.scheme.as_str(), host)
            }
            _ => format!("{}://{}:{}", self.scheme.as_str(), host, port),
        };
        Ok(url)
    }

    /// The built-in server only speaks HTTP; devices told to fetch over
    /// another scheme could never reach it.
    pub fn check_serve_dir(&self, serve_dir: Option<&Path>) -> Result<()> {
        match (serve_dir, self.scheme) {
            (Some(dir), ImageScheme::Ftp) => Err(UpgradeError::validation(format!(
                "Cannot serve {} with scheme ftp: the built-in image server only speaks HTTP",
                dir.display()
            ))),
            _ => Ok(()),
        }
    }
}

/// Result classifier vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub keywords: Vec<Keyword>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

impl Settings {
    /// Validate the run settings
    pub fn validate(&self) -> Result<()> {
        let runner = &self.runner;
        if runner.inspect_workers == 0 || runner.upgrade_workers == 0 || runner.reload_workers == 0 {
            return Err(UpgradeError::validation("Worker counts must be at least 1"));
        }

        self.image_server
            .check_serve_dir(self.image_server.serve_dir.as_deref())?;

        if self.channel.port == 0 {
            return Err(UpgradeError::validation("SSH port cannot be 0"));
        }

        if self.channel.delay_factor == 0 {
            return Err(UpgradeError::validation("Delay factor must be at least 1"));
        }

        if self.inventory.platform.is_empty() {
            return Err(UpgradeError::validation("Inventory platform filter cannot be empty"));
        }

        if self.classifier.keywords.is_empty() {
            return Err(UpgradeError::validation("Classifier keyword table cannot be empty"));
        }

        Ok(())
    }
}
