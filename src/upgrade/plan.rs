// file: src/upgrade/plan.rs
// version: 1.0.0
// guid: 5a0c8e23-4b7f-4d19-a6e2-8f1b3d9c7e54

//! Immutable description of one fleet run

use serde::Serialize;

use crate::config::{ConfigLoader, Inventory, InventoryHost, Settings};
use crate::{Result, UpgradeError};

/// Devices selected for the run and where they fetch images from
#[derive(Debug, Clone)]
pub struct UpgradePlan {
    devices: Vec<InventoryHost>,
    image_base_url: String,
    image_host: String,
    image_port: u16,
}

impl UpgradePlan {
    pub fn new(
        devices: Vec<InventoryHost>,
        image_base_url: impl Into<String>,
        image_host: impl Into<String>,
        image_port: u16,
    ) -> Result<Self> {
        let image_base_url = image_base_url.into();
        if image_base_url.is_empty() {
            return Err(UpgradeError::validation("Image base URL cannot be empty"));
        }
        if let Some(host) = devices.iter().find(|d| d.identity.hostname.trim().is_empty()) {
            return Err(UpgradeError::validation(format!(
                "Host {} has an empty hostname",
                host.identity.name
            )));
        }

        Ok(Self {
            devices,
            image_base_url,
            image_host: image_host.into(),
            image_port,
        })
    }

    /// Build the plan from settings and the (optionally site-specific) inventory
    pub fn from_settings(settings: &Settings, site: Option<&str>, loader: &ConfigLoader) -> Result<Self> {
        let inventory_settings = settings.inventory.for_site(site);
        let inventory = Inventory::load(&inventory_settings, loader)?;
        let devices = inventory.select(&inventory_settings.platform)?;

        let mut server = settings.image_server.clone();
        if server.host.is_none() {
            server.host = inventory.default_data(server.scheme.inventory_key());
        }
        let image_base_url = server.base_url()?;
        let image_port = server.effective_port();
        let image_host = server.host.unwrap_or_default();

        Self::new(devices, image_base_url, image_host, image_port)
    }

    pub fn devices(&self) -> &[InventoryHost] {
        &self.devices
    }

    pub fn image_base_url(&self) -> &str {
        &self.image_base_url
    }

    /// Address and port the image service listens on
    pub fn image_endpoint(&self) -> (&str, u16) {
        (&self.image_host, self.image_port)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Serializable view for `plan` output
    pub fn view(&self) -> PlanView {
        PlanView {
            image_base_url: self.image_base_url.clone(),
            devices: self
                .devices
                .iter()
                .map(|d| PlannedDeviceView {
                    name: d.identity.name.clone(),
                    hostname: d.identity.hostname.clone(),
                    credentials_from_inventory: d.username.is_some() && d.password.is_some(),
                    images: d
                        .images
                        .iter()
                        .map(|(family, target)| PlannedImageView {
                            family: family.as_str().to_string(),
                            upgrade_version: target.upgrade_version.clone(),
                            upgrade_img: target.upgrade_img.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub image_base_url: String,
    pub devices: Vec<PlannedDeviceView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedDeviceView {
    pub name: String,
    pub hostname: String,
    pub credentials_from_inventory: bool,
    pub images: Vec<PlannedImageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedImageView {
    pub family: String,
    pub upgrade_version: String,
    pub upgrade_img: String,
}
