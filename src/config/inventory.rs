// file: src/config/inventory.rs
// version: 1.0.0
// guid: 8f2c6d41-9a7e-4b30-b5d8-3e1a0c7f9d26

//! Host inventory in the hosts/groups/defaults layout.
//!
//! Every attribute resolves host first, then each group in listed order,
//! then the defaults file. The image table is keyed by hardware family
//! under each entry's `data` mapping:
//!
//! ```yaml
//! # defaults.yaml
//! platform: ios
//! data:
//!   http_ip: 10.1.1.5
//!   C9300:
//!     upgrade_version: 16.9.3
//!     upgrade_img: cat9k_iosxe.16.09.03.SPA.bin
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use super::{ConfigLoader, InventorySettings};
use crate::device::{DeviceIdentity, HardwareFamily, ImageTarget};
use crate::{Result, UpgradeError};

/// Desired image per hardware family
pub type ImageTable = BTreeMap<HardwareFamily, ImageTarget>;

/// One host, group or defaults record
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventoryEntry {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub groups: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub data: BTreeMap<String, Value>,
}

/// A host selected for the run, with attributes resolved
#[derive(Debug, Clone)]
pub struct InventoryHost {
    pub identity: DeviceIdentity,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub images: Arc<ImageTable>,
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: BTreeMap<String, InventoryEntry>,
    groups: BTreeMap<String, InventoryEntry>,
    defaults: InventoryEntry,
}

impl Inventory {
    pub fn new(
        hosts: BTreeMap<String, InventoryEntry>,
        groups: BTreeMap<String, InventoryEntry>,
        defaults: InventoryEntry,
    ) -> Self {
        Self {
            hosts,
            groups,
            defaults,
        }
    }

    /// Load the inventory files. The hosts file is required; groups and
    /// defaults are optional.
    pub fn load(settings: &InventorySettings, loader: &ConfigLoader) -> Result<Self> {
        if !settings.hosts.exists() {
            return Err(UpgradeError::inventory(format!(
                "Hosts file {} not found",
                settings.hosts.display()
            )));
        }

        let hosts: BTreeMap<String, InventoryEntry> = load_optional(&settings.hosts, loader)?;
        let groups: BTreeMap<String, InventoryEntry> = load_optional(&settings.groups, loader)?;
        let defaults: InventoryEntry = load_optional(&settings.defaults, loader)?;

        debug!(
            "Loaded inventory: {} hosts, {} groups",
            hosts.len(),
            groups.len()
        );
        Ok(Self::new(hosts, groups, defaults))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Host, its groups in order, then defaults
    fn chain<'a>(&'a self, name: &str, host: &'a InventoryEntry) -> Result<Vec<&'a InventoryEntry>> {
        let mut chain = Vec::with_capacity(host.groups.len() + 2);
        chain.push(host);
        for group in &host.groups {
            let entry = self.groups.get(group).ok_or_else(|| {
                UpgradeError::inventory(format!("Host {} references unknown group {}", name, group))
            })?;
            chain.push(entry);
        }
        chain.push(&self.defaults);
        Ok(chain)
    }

    /// Hosts whose resolved platform equals `platform`
    pub fn select(&self, platform: &str) -> Result<Vec<InventoryHost>> {
        let mut selected = Vec::new();

        for (name, host) in &self.hosts {
            let chain = self.chain(name, host)?;

            let host_platform = chain.iter().find_map(|e| e.platform.as_deref());
            if !host_platform.is_some_and(|p| p.eq_ignore_ascii_case(platform)) {
                debug!("Skipping {}: platform {:?}", name, host_platform);
                continue;
            }

            let hostname = host.hostname.clone().unwrap_or_else(|| name.clone());
            let username = chain.iter().find_map(|e| e.username.clone());
            let password = chain
                .iter()
                .find_map(|e| e.password.clone())
                .map(SecretString::from);
            let images = image_table(name, &chain)?;

            selected.push(InventoryHost {
                identity: DeviceIdentity {
                    name: name.clone(),
                    hostname,
                },
                username,
                password,
                images: Arc::new(images),
            });
        }

        Ok(selected)
    }

    /// String value from the defaults `data` mapping, e.g. `http_ip`
    pub fn default_data(&self, key: &str) -> Option<String> {
        match self.defaults.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn load_optional<T>(path: &Path, loader: &ConfigLoader) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if !path.exists() {
        debug!("Inventory file {} not present", path.display());
        return Ok(T::default());
    }
    // An empty YAML document deserializes as null
    let value: Value = loader.load_yaml(path)?;
    if value.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(value).map_err(|e| {
        UpgradeError::inventory(format!("Invalid inventory file {}: {}", path.display(), e))
    })
}

fn image_table(name: &str, chain: &[&InventoryEntry]) -> Result<ImageTable> {
    let mut table = ImageTable::new();

    for family in HardwareFamily::ALL {
        let keys: &[&str] = match family {
            HardwareFamily::C3650 => &["C3650", "C3850"],
            _ => &[family.as_str()],
        };
        let found = chain
            .iter()
            .find_map(|entry| keys.iter().find_map(|k| entry.data.get(*k)));

        if let Some(value) = found {
            let target: ImageTarget = serde_yaml::from_value(value.clone()).map_err(|e| {
                UpgradeError::inventory(format!(
                    "Invalid image entry {} for host {}: {}",
                    family.as_str(),
                    name,
                    e
                ))
            })?;
            table.insert(family, target);
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::fs;
    use tempfile::TempDir;

    const HOSTS: &str = r#"
idf-1:
  hostname: 10.1.1.11
  groups: [closets]
idf-2:
  hostname: 10.1.1.12
  username: local
  password: hunter2
  data:
    C9300:
      upgrade_version: 17.3.4
      upgrade_img: cat9k_iosxe.17.03.04.SPA.bin
core:
  hostname: 10.1.1.1
  platform: nxos
"#;

    const GROUPS: &str = r#"
closets:
  username: netops
"#;

    const DEFAULTS: &str = r#"
platform: ios
data:
  http_ip: 10.1.1.5
  C3750X:
    upgrade_version: 15.2(4)E10
    upgrade_img: c3750e-universalk9-tar.152-4.E10.tar
  C9300:
    upgrade_version: 16.9.3
    upgrade_img: cat9k_iosxe.16.09.03.SPA.bin
"#;

    fn write_inventory(dir: &TempDir, prefix: &str) -> InventorySettings {
        fs::write(dir.path().join(format!("{}hosts.yaml", prefix)), HOSTS).unwrap();
        fs::write(dir.path().join(format!("{}groups.yaml", prefix)), GROUPS).unwrap();
        fs::write(dir.path().join("defaults.yaml"), DEFAULTS).unwrap();
        InventorySettings {
            hosts: dir.path().join("hosts.yaml"),
            groups: dir.path().join("groups.yaml"),
            defaults: dir.path().join("defaults.yaml"),
            platform: "ios".into(),
        }
    }

    #[test]
    fn test_select_filters_platform_and_resolves() {
        let dir = TempDir::new().unwrap();
        let settings = write_inventory(&dir, "");
        let inventory = Inventory::load(&settings, &ConfigLoader::new()).unwrap();
        assert_eq!(inventory.len(), 3);

        let hosts = inventory.select("ios").unwrap();
        let names: Vec<&str> = hosts.iter().map(|h| h.identity.name.as_str()).collect();
        assert_eq!(names, vec!["idf-1", "idf-2"]);

        let idf1 = &hosts[0];
        assert_eq!(idf1.identity.hostname, "10.1.1.11");
        assert_eq!(idf1.username.as_deref(), Some("netops"));
        assert!(idf1.password.is_none());
        assert_eq!(
            idf1.images[&HardwareFamily::C9300].upgrade_version,
            "16.9.3"
        );

        let idf2 = &hosts[1];
        assert_eq!(idf2.password.as_ref().unwrap().expose_secret(), "hunter2");
        assert_eq!(
            idf2.images[&HardwareFamily::C9300].upgrade_version,
            "17.3.4"
        );
        assert!(!idf2.images.contains_key(&HardwareFamily::C3650));

        assert_eq!(inventory.default_data("http_ip").as_deref(), Some("10.1.1.5"));
    }

    #[test]
    fn test_site_files() {
        let dir = TempDir::new().unwrap();
        write_inventory(&dir, "hq_");
        let base = InventorySettings {
            hosts: dir.path().join("hosts.yaml"),
            groups: dir.path().join("groups.yaml"),
            defaults: dir.path().join("defaults.yaml"),
            platform: "ios".into(),
        };

        assert!(Inventory::load(&base, &ConfigLoader::new()).is_err());
        let inventory = Inventory::load(&base.for_site(Some("hq")), &ConfigLoader::new()).unwrap();
        assert_eq!(inventory.select("ios").unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "idf-9".to_string(),
            InventoryEntry {
                platform: Some("ios".into()),
                groups: vec!["missing".into()],
                ..Default::default()
            },
        );
        let inventory = Inventory::new(hosts, BTreeMap::new(), InventoryEntry::default());
        assert!(matches!(
            inventory.select("ios"),
            Err(UpgradeError::Inventory(_))
        ));
    }

    #[test]
    fn test_hostname_defaults_to_name() {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "sw1.example.net".to_string(),
            InventoryEntry {
                platform: Some("cisco_ios".into()),
                ..Default::default()
            },
        );
        let inventory = Inventory::new(hosts, BTreeMap::new(), InventoryEntry::default());
        let selected = inventory.select("cisco_ios").unwrap();
        assert_eq!(selected[0].identity.hostname, "sw1.example.net");
        assert!(selected[0].images.is_empty());
    }
}
