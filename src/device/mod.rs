// file: src/device/mod.rs
// version: 1.0.0
// guid: 0e4c7a92-3d1f-4b85-a6c9-71f2e8d05b34

//! Device data model: hardware families, stack members and the per-device record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::upgrade::classifier::ExecutionResult;
use crate::UpgradeError;

/// Supported Catalyst hardware families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HardwareFamily {
    #[serde(rename = "C3750V2")]
    C3750V2,
    #[serde(rename = "C3750X")]
    C3750X,
    /// Catalyst 3650 and 3850 share one command strategy
    #[serde(rename = "C3650", alias = "C3850")]
    C3650,
    #[serde(rename = "C9300")]
    C9300,
}

impl HardwareFamily {
    /// All families, in table order
    pub const ALL: [HardwareFamily; 4] = [
        HardwareFamily::C3750V2,
        HardwareFamily::C3750X,
        HardwareFamily::C3650,
        HardwareFamily::C9300,
    ];

    /// Name used as the image table key
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareFamily::C3750V2 => "C3750V2",
            HardwareFamily::C3750X => "C3750X",
            HardwareFamily::C3650 => "C3650",
            HardwareFamily::C9300 => "C9300",
        }
    }

    /// Whether this family belongs to the 3750 line
    pub fn is_3750(&self) -> bool {
        matches!(self, HardwareFamily::C3750V2 | HardwareFamily::C3750X)
    }

    /// Resolve a family from a "show version" hardware descriptor
    /// such as `WS-C3750X-48P` or `C9300-48UXM`.
    pub fn from_hardware(descriptor: &str) -> crate::Result<Self> {
        let trimmed = descriptor.trim().to_ascii_uppercase();
        let model = trimmed.strip_prefix("WS-").unwrap_or(&trimmed);
        let token = model.split('-').next().unwrap_or_default();
        token
            .parse()
            .map_err(|_| UpgradeError::UnknownHardwareModel(descriptor.trim().to_string()))
    }
}

impl FromStr for HardwareFamily {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C3750V2" | "3750V2" => Ok(HardwareFamily::C3750V2),
            "C3750X" | "3750X" => Ok(HardwareFamily::C3750X),
            "C3650" | "C3850" | "3650" | "3850" | "3650/3850" | "C3650/C3850" => {
                Ok(HardwareFamily::C3650)
            }
            "C9300" | "9300" => Ok(HardwareFamily::C9300),
            other => Err(UpgradeError::UnknownHardwareModel(other.to_string())),
        }
    }
}

impl fmt::Display for HardwareFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HardwareFamily::C3750V2 => "3750V2",
            HardwareFamily::C3750X => "3750X",
            HardwareFamily::C3650 => "3650/3850",
            HardwareFamily::C9300 => "9300",
        };
        f.write_str(label)
    }
}

/// One member switch of a stack, from "show switch detail"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMember {
    pub switch_id: u8,
    pub state: String,
}

impl StackMember {
    pub fn is_ready(&self) -> bool {
        self.state.eq_ignore_ascii_case("ready")
    }
}

/// Tri-state upgrade decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeFlag {
    #[default]
    Unknown,
    NotNeeded,
    Needed,
}

/// Desired image for a hardware family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTarget {
    pub upgrade_version: String,
    pub upgrade_img: String,
}

/// Identity of a device as selected from the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Inventory name
    pub name: String,
    /// Management address used for the channel
    pub hostname: String,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-device record, mutated only by its own upgrade machine
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub identity: DeviceIdentity,
    pub family: Option<HardwareFamily>,
    pub hardware: Option<String>,
    pub current_version: Option<String>,
    pub target: Option<ImageTarget>,
    pub members: Vec<StackMember>,
    pub boot_path: Option<String>,
    pub upgrade: UpgradeFlag,
    /// Desired image already set as the boot image (pending reload)
    pub staged_for_reload: bool,
    pub last_result: Option<ExecutionResult>,
}

impl Device {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            family: None,
            hardware: None,
            current_version: None,
            target: None,
            members: Vec::new(),
            boot_path: None,
            upgrade: UpgradeFlag::Unknown,
            staged_for_reload: false,
            last_result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Members not in the Ready state
    pub fn unready_members(&self) -> impl Iterator<Item = &StackMember> {
        self.members.iter().filter(|m| !m.is_ready())
    }
}
