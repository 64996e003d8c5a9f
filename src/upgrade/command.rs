// file: src/upgrade/command.rs
// version: 1.0.0
// guid: c27d94a1-0e5b-4f38-91c6-5a8e3b7d2f40

//! Family-specific upgrade command construction

use std::collections::BTreeMap;

use serde::Serialize;

use super::version::major_component;
use crate::device::HardwareFamily;
use crate::{Result, UpgradeError};

const ARCHIVE_DOWNLOAD: &str = "archive download-sw /imageonly /allow-feature-upgrade /safe";
const PACKAGE_INSTALL: &str = "request platform software package install switch all file";

/// When an install-mode package becomes active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activation {
    /// `new auto-copy`: activate right after the transfer
    AutoCopy,
    /// `on-reboot`: activate on the next reload
    OnReboot,
}

impl Activation {
    fn modifier(&self) -> &'static str {
        match self {
            Activation::AutoCopy => "new auto-copy",
            Activation::OnReboot => "on-reboot",
        }
    }
}

/// Strategy for producing a family's upgrade command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTemplate {
    /// Legacy IOS in-place image replacement
    ArchiveDownload,
    /// IOS-XE install mode when the running major version matches,
    /// archive download otherwise
    InstallWhenMajor {
        major: &'static str,
        activation: Activation,
    },
    /// IOS-XE install mode regardless of the running version
    Install { activation: Activation },
}

/// A built upgrade command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeCommand {
    pub text: String,
    /// Activation waits for an explicit reload
    pub defers_activation: bool,
}

/// Lookup table from hardware family to command template
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    templates: BTreeMap<HardwareFamily, CommandTemplate>,
}

impl CommandBuilder {
    /// Builder with the standard Catalyst table
    pub fn new() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(HardwareFamily::C3750V2, CommandTemplate::ArchiveDownload);
        templates.insert(HardwareFamily::C3750X, CommandTemplate::ArchiveDownload);
        templates.insert(
            HardwareFamily::C3650,
            CommandTemplate::InstallWhenMajor {
                major: "16",
                activation: Activation::AutoCopy,
            },
        );
        templates.insert(
            HardwareFamily::C9300,
            CommandTemplate::Install {
                activation: Activation::OnReboot,
            },
        );
        Self { templates }
    }

    /// Builder over a custom table
    pub fn with_templates(templates: BTreeMap<HardwareFamily, CommandTemplate>) -> Self {
        Self { templates }
    }

    pub fn template(&self, family: HardwareFamily) -> Result<&CommandTemplate> {
        self.templates
            .get(&family)
            .ok_or_else(|| UpgradeError::UnknownHardwareModel(family.as_str().to_string()))
    }

    /// Build the upgrade command for a device
    pub fn build(
        &self,
        family: HardwareFamily,
        current_version: &str,
        image_base_url: &str,
        image_filename: &str,
    ) -> Result<UpgradeCommand> {
        let url = image_url(image_base_url, image_filename);

        let command = match self.template(family)? {
            CommandTemplate::ArchiveDownload => archive(&url),
            CommandTemplate::InstallWhenMajor { major, activation } => {
                if major_component(current_version) == *major {
                    install(&url, *activation)
                } else {
                    archive(&url)
                }
            }
            CommandTemplate::Install { activation } => install(&url, *activation),
        };

        Ok(command)
    }

    /// Resolve a raw model string and build; unknown models fail closed
    pub fn build_for_model(
        &self,
        model: &str,
        current_version: &str,
        image_base_url: &str,
        image_filename: &str,
    ) -> Result<UpgradeCommand> {
        let family: HardwareFamily = model.parse()?;
        self.build(family, current_version, image_base_url, image_filename)
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn image_url(base: &str, filename: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        filename.trim_start_matches('/')
    )
}

fn archive(url: &str) -> UpgradeCommand {
    UpgradeCommand {
        text: format!("{} {}", ARCHIVE_DOWNLOAD, url),
        defers_activation: false,
    }
}

fn install(url: &str, activation: Activation) -> UpgradeCommand {
    UpgradeCommand {
        text: format!("{} {} {}", PACKAGE_INSTALL, url, activation.modifier()),
        defers_activation: activation == Activation::OnReboot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://10.1.1.5:8000";

    #[test]
    fn test_3750_families_use_archive_download() {
        let builder = CommandBuilder::new();
        for family in [HardwareFamily::C3750V2, HardwareFamily::C3750X] {
            let cmd = builder
                .build(family, "15.0(2)SE11", BASE, "c3750e-universalk9-tar.152-4.E8.tar")
                .unwrap();
            assert_eq!(
                cmd.text,
                "archive download-sw /imageonly /allow-feature-upgrade /safe \
                 http://10.1.1.5:8000/c3750e-universalk9-tar.152-4.E8.tar"
            );
            assert!(!cmd.defers_activation);
        }
    }

    #[test]
    fn test_3650_major_16_boundary() {
        let builder = CommandBuilder::new();
        let img = "cat3k_caa-universalk9.16.09.04.SPA.bin";

        let xe = builder.build(HardwareFamily::C3650, "16.9.4", BASE, img).unwrap();
        assert_eq!(
            xe.text,
            "request platform software package install switch all file \
             http://10.1.1.5:8000/cat3k_caa-universalk9.16.09.04.SPA.bin new auto-copy"
        );
        assert!(!xe.defers_activation);

        let legacy = builder.build(HardwareFamily::C3650, "15.2(4)E8", BASE, img).unwrap();
        assert!(legacy
            .text
            .starts_with("archive download-sw /imageonly /allow-feature-upgrade /safe "));
        assert!(!legacy.text.contains("auto-copy"));

        let denali = builder.build(HardwareFamily::C3650, "03.06.06E", BASE, img).unwrap();
        assert!(denali.text.starts_with("archive download-sw"));
    }

    #[test]
    fn test_9300_always_on_reboot() {
        let builder = CommandBuilder::new();
        for version in ["16.9.3", "16.6.1", "17.3.4", "15.2(4)E8", ""] {
            let cmd = builder
                .build(HardwareFamily::C9300, version, BASE, "cat9k_iosxe.16.09.04.SPA.bin")
                .unwrap();
            assert!(cmd.text.ends_with(" on-reboot"));
            assert!(!cmd.text.contains("auto-copy"));
            assert!(cmd.defers_activation);
        }
    }

    #[test]
    fn test_unknown_model_fails_closed() {
        let builder = CommandBuilder::new();
        let err = builder
            .build_for_model("C2960X", "15.2(4)E8", BASE, "c2960x.bin")
            .unwrap_err();
        assert!(matches!(err, UpgradeError::UnknownHardwareModel(_)));

        let partial = CommandBuilder::with_templates(BTreeMap::from([(
            HardwareFamily::C3750X,
            CommandTemplate::ArchiveDownload,
        )]));
        assert!(matches!(
            partial.build(HardwareFamily::C9300, "16.9.3", BASE, "x.bin"),
            Err(UpgradeError::UnknownHardwareModel(_))
        ));
    }

    #[test]
    fn test_total_over_families() {
        let builder = CommandBuilder::new();
        for family in HardwareFamily::ALL {
            assert!(builder.build(family, "16.9.3", BASE, "img.bin").is_ok());
        }
    }

    #[test]
    fn test_url_joining() {
        let builder = CommandBuilder::new();
        let cmd = builder
            .build(HardwareFamily::C3750X, "15.0", "ftp://10.1.1.5/", "/img.tar")
            .unwrap();
        assert!(cmd.text.ends_with(" ftp://10.1.1.5/img.tar"));
    }
}
