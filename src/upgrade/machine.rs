// file: src/upgrade/machine.rs
// version: 1.0.0
// guid: 7d3e1b95-6a2f-4c48-8e07-c5b9a1f4d260

//! Per-device upgrade state machine.
//!
//! `Idle → Inspecting → Comparing → {NotNeeded | AwaitingUpgrade} → Upgrading
//! → {UpgradeFailed | AwaitingReloadConfirm} → Reloading → {Verified | Failed}`
//!
//! Device-level failures are recorded on the machine and never returned as
//! errors; a phase method only returns `Err` when called from a state that
//! does not allow the phase.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ImageTable;
use crate::device::{Device, HardwareFamily, UpgradeFlag};
use crate::network::{CommandChannel, Connector, Credentials, OutputParser, TimeoutPolicy};
use crate::upgrade::classifier::{Classification, ResultClassifier};
use crate::upgrade::command::{CommandBuilder, UpgradeCommand};
use crate::upgrade::version::{boot_image_matches, needs_upgrade};
use crate::{Result, UpgradeError};

/// Machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Idle,
    Inspecting,
    Comparing,
    NotNeeded,
    AwaitingUpgrade,
    Upgrading,
    UpgradeFailed,
    AwaitingReloadConfirm,
    Reloading,
    Verified,
    Failed,
}

impl MachineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MachineState::NotNeeded
                | MachineState::UpgradeFailed
                | MachineState::Verified
                | MachineState::Failed
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MachineState::UpgradeFailed | MachineState::Failed)
    }

    /// Whether `self → to` is an edge of the machine
    pub fn can_transition(&self, to: MachineState) -> bool {
        use MachineState::*;
        matches!(
            (self, to),
            (Idle, Inspecting)
                | (Inspecting, Comparing)
                | (Inspecting, Failed)
                | (Comparing, NotNeeded)
                | (Comparing, AwaitingUpgrade)
                | (Comparing, Failed)
                | (AwaitingUpgrade, Upgrading)
                | (Upgrading, UpgradeFailed)
                | (Upgrading, AwaitingReloadConfirm)
                | (AwaitingReloadConfirm, Reloading)
                | (Reloading, Verified)
                | (Reloading, Failed)
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MachineState::Idle => "idle",
            MachineState::Inspecting => "inspecting",
            MachineState::Comparing => "comparing",
            MachineState::NotNeeded => "not needed",
            MachineState::AwaitingUpgrade => "awaiting upgrade",
            MachineState::Upgrading => "upgrading",
            MachineState::UpgradeFailed => "upgrade failed",
            MachineState::AwaitingReloadConfirm => "awaiting reload",
            MachineState::Reloading => "reloading",
            MachineState::Verified => "verified",
            MachineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Device failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    InspectionFailure,
    UnknownHardwareModel,
    DownloadFailure,
    ReloadConfirmationTimeout,
    ChannelError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::InspectionFailure => "inspection failure",
            FailureKind::UnknownHardwareModel => "unknown hardware model",
            FailureKind::DownloadFailure => "download failure",
            FailureKind::ReloadConfirmationTimeout => "reload confirmation timeout",
            FailureKind::ChannelError => "channel error",
        };
        f.write_str(label)
    }
}

/// Failure recorded on a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// State the machine was in when it failed
    pub during: MachineState,
}

impl fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}: {}", self.kind, self.during, self.detail)
    }
}

/// Drives one device through inspect, compare, upgrade and reload
pub struct DeviceUpgradeMachine {
    device: Device,
    state: MachineState,
    failure: Option<DeviceFailure>,
    images: Arc<ImageTable>,
    credentials: Arc<Credentials>,
    connector: Arc<dyn Connector>,
    parser: Arc<dyn OutputParser>,
    channel: Option<Box<dyn CommandChannel>>,
    command: Option<UpgradeCommand>,
    check_boot: bool,
}

impl DeviceUpgradeMachine {
    pub fn new(
        device: Device,
        images: Arc<ImageTable>,
        credentials: Arc<Credentials>,
        connector: Arc<dyn Connector>,
        parser: Arc<dyn OutputParser>,
    ) -> Self {
        Self {
            device,
            state: MachineState::Idle,
            failure: None,
            images,
            credentials,
            connector,
            parser,
            channel: None,
            command: None,
            check_boot: true,
        }
    }

    /// Enable or disable "show boot" on 3750-family devices
    pub fn with_boot_check(mut self, enabled: bool) -> Self {
        self.check_boot = enabled;
        self
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn failure(&self) -> Option<&DeviceFailure> {
        self.failure.as_ref()
    }

    /// Upgrade command chosen during comparison
    pub fn command(&self) -> Option<&UpgradeCommand> {
        self.command.as_ref()
    }

    fn transition(&mut self, to: MachineState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(UpgradeError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!("{}: {} -> {}", self.device.name(), self.state, to);
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, to: MachineState, kind: FailureKind, detail: impl Into<String>) -> Result<()> {
        let failure = DeviceFailure {
            kind,
            detail: detail.into(),
            during: self.state,
        };
        warn!("{}: {}", self.device.name(), failure);
        self.failure = Some(failure);
        self.release();
        self.transition(to)
    }

    async fn ensure_channel(&mut self) -> Result<()> {
        if self.channel.is_none() {
            let channel = self
                .connector
                .open(&self.device.identity, &self.credentials)
                .await?;
            self.channel = Some(channel);
        }
        Ok(())
    }

    async fn send(&mut self, command: &str, policy: &TimeoutPolicy) -> Result<String> {
        self.ensure_channel().await?;
        match self.channel.as_mut() {
            Some(channel) => channel.send(command, policy).await,
            None => Err(UpgradeError::channel("Channel not open")),
        }
    }

    /// Close the channel; the next phase reconnects
    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
    }

    /// Collect version, hardware and stack membership
    pub async fn inspect(&mut self) -> Result<MachineState> {
        self.transition(MachineState::Inspecting)?;

        if let Err(e) = self.ensure_channel().await {
            self.fail(MachineState::Failed, FailureKind::ChannelError, e.to_string())?;
            return Ok(self.state);
        }

        match self.collect_inventory().await {
            Ok(()) => {
                info!(
                    "{}: {} running {}",
                    self.device.name(),
                    self.device.hardware.as_deref().unwrap_or("unknown"),
                    self.device.current_version.as_deref().unwrap_or("unknown")
                );
                self.release();
                self.transition(MachineState::Comparing)?;
            }
            Err(UpgradeError::UnknownHardwareModel(model)) => {
                self.fail(
                    MachineState::Failed,
                    FailureKind::UnknownHardwareModel,
                    format!("unsupported hardware {}", model),
                )?;
            }
            Err(e) => {
                self.fail(MachineState::Failed, FailureKind::InspectionFailure, e.to_string())?;
            }
        }

        Ok(self.state)
    }

    async fn collect_inventory(&mut self) -> Result<()> {
        let standard = TimeoutPolicy::standard();

        let output = self.send("show version", &standard).await?;
        let version = self.parser.parse_version(&output)?;

        let output = self.send("show switch detail", &standard).await?;
        let members = self.parser.parse_switch_detail(&output)?;

        let hardware = version
            .hardware
            .first()
            .cloned()
            .ok_or_else(|| UpgradeError::parse("No hardware model reported"))?;
        self.device.current_version = Some(version.version);
        self.device.hardware = Some(hardware.clone());
        self.device.members = members;

        for member in self.device.unready_members() {
            warn!(
                "{}: stack member {} is {}",
                self.device.name(),
                member.switch_id,
                member.state
            );
        }

        let family = HardwareFamily::from_hardware(&hardware)?;
        self.device.family = Some(family);

        if self.check_boot && family.is_3750() {
            let output = self.send("show boot", &standard).await?;
            match self.parser.parse_boot(&output) {
                Ok(boot) => self.device.boot_path = Some(boot.boot_path),
                Err(e) => debug!("{}: boot path unavailable: {}", self.device.name(), e),
            }
        }

        Ok(())
    }

    /// Decide whether an upgrade is needed and prepare its command
    pub fn compare(&mut self, builder: &CommandBuilder, image_base_url: &str) -> Result<MachineState> {
        if self.state != MachineState::Comparing {
            return Err(UpgradeError::InvalidTransition {
                from: self.state.to_string(),
                to: MachineState::Comparing.to_string(),
            });
        }

        let (Some(family), Some(current)) = (self.device.family, self.device.current_version.clone())
        else {
            self.fail(
                MachineState::Failed,
                FailureKind::InspectionFailure,
                "inspection left no family or version",
            )?;
            return Ok(self.state);
        };

        let Some(target) = self.images.get(&family).cloned() else {
            self.fail(
                MachineState::Failed,
                FailureKind::UnknownHardwareModel,
                format!("no desired image configured for {}", family),
            )?;
            return Ok(self.state);
        };
        self.device.target = Some(target.clone());

        if let Some(boot) = &self.device.boot_path {
            self.device.staged_for_reload = boot_image_matches(boot, &target.upgrade_img);
        }

        if !needs_upgrade(&current, &target.upgrade_version) {
            self.device.upgrade = UpgradeFlag::NotNeeded;
            self.transition(MachineState::NotNeeded)?;
            return Ok(self.state);
        }

        match builder.build(family, &current, image_base_url, &target.upgrade_img) {
            Ok(command) => {
                self.device.upgrade = UpgradeFlag::Needed;
                self.command = Some(command);
                self.transition(MachineState::AwaitingUpgrade)?;
            }
            Err(e) => {
                self.fail(
                    MachineState::Failed,
                    FailureKind::UnknownHardwareModel,
                    e.to_string(),
                )?;
            }
        }

        Ok(self.state)
    }

    /// Send the upgrade command and classify its output
    pub async fn upgrade(&mut self, classifier: &ResultClassifier, delay_factor: u32) -> Result<MachineState> {
        self.transition(MachineState::Upgrading)?;

        let Some(command) = self.command.clone() else {
            self.fail(
                MachineState::UpgradeFailed,
                FailureKind::DownloadFailure,
                "no upgrade command prepared",
            )?;
            return Ok(self.state);
        };

        info!("{}: {}", self.device.name(), command.text);
        let output = match self
            .send(&command.text, &TimeoutPolicy::long_running(delay_factor))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                self.fail(MachineState::UpgradeFailed, FailureKind::ChannelError, e.to_string())?;
                return Ok(self.state);
            }
        };
        self.release();

        let result = classifier.classify(&output);
        for line in &result.lines {
            info!("{}: {}", self.device.name(), line);
        }
        let classification = result.classification;
        let detail = result.lines.first().cloned();
        self.device.last_result = Some(result);

        match classification {
            Classification::Error | Classification::Failed => {
                self.fail(
                    MachineState::UpgradeFailed,
                    FailureKind::DownloadFailure,
                    detail.unwrap_or_else(|| classification.to_string()),
                )?;
            }
            Classification::Success | Classification::Installed => {
                self.transition(MachineState::AwaitingReloadConfirm)?;
            }
            Classification::Unknown if command.defers_activation => {
                self.transition(MachineState::AwaitingReloadConfirm)?;
            }
            Classification::Unknown => {
                self.fail(
                    MachineState::UpgradeFailed,
                    FailureKind::DownloadFailure,
                    "no completion status in upgrade output",
                )?;
            }
        }

        Ok(self.state)
    }

    /// Save the configuration and reload, answering the confirm prompt
    pub async fn reload(&mut self) -> Result<MachineState> {
        self.transition(MachineState::Reloading)?;

        if let Err(e) = self.ensure_channel().await {
            self.fail(MachineState::Failed, FailureKind::ChannelError, e.to_string())?;
            return Ok(self.state);
        }

        let saved = match self.channel.as_mut() {
            Some(channel) => channel.save_config().await,
            None => Err(UpgradeError::channel("Channel not open")),
        };
        if let Err(e) = saved {
            self.fail(
                MachineState::Failed,
                FailureKind::ChannelError,
                format!("saving configuration: {}", e),
            )?;
            return Ok(self.state);
        }

        let interactive = TimeoutPolicy::interactive();
        let outcome = match self.send("reload", &interactive).await {
            Ok(output) if output.to_ascii_lowercase().contains("confirm") => {
                self.send("", &interactive).await.map(|_| ())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) | Err(UpgradeError::ChannelClosed(_)) => {
                self.release();
                info!("{}: reload issued", self.device.name());
                self.transition(MachineState::Verified)?;
            }
            Err(UpgradeError::Timeout(detail)) => {
                self.fail(
                    MachineState::Failed,
                    FailureKind::ReloadConfirmationTimeout,
                    detail,
                )?;
            }
            Err(e) => {
                self.fail(MachineState::Failed, FailureKind::ChannelError, e.to_string())?;
            }
        }

        Ok(self.state)
    }
}

impl Drop for DeviceUpgradeMachine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceIdentity, ImageTarget};
    use crate::network::{IosOutputParser, Reply, ScriptedConnector};

    const VERSION_9300: &str = "\
Cisco IOS Software [Fuji], Catalyst L3 Switch Software (CAT9K_IOSXE), Version 16.9.3, RELEASE SOFTWARE (fc2)
Model Number                       : C9300-48UXM
";

    const VERSION_3750X: &str = "\
Cisco IOS Software, C3750E Software (C3750E-UNIVERSALK9-M), Version 15.2(4)E8, RELEASE SOFTWARE (fc2)
Model number                    : WS-C3750X-48P-S
";

    const VERSION_2960: &str = "\
Cisco IOS Software, C2960X Software (C2960X-UNIVERSALK9-M), Version 15.2(2)E7, RELEASE SOFTWARE (fc3)
Model number                    : WS-C2960X-48TS-L
";

    const SWITCH_DETAIL: &str = "\
Switch#  Role   Mac Address     Priority Version  State
----------------------------------------------------------
*1       Active 00a3.d144.1a00     15     V02     Ready
";

    fn images() -> Arc<ImageTable> {
        let mut table = ImageTable::new();
        table.insert(
            HardwareFamily::C9300,
            ImageTarget {
                upgrade_version: "16.9.4".into(),
                upgrade_img: "cat9k_iosxe.16.09.04.SPA.bin".into(),
            },
        );
        table.insert(
            HardwareFamily::C3750X,
            ImageTarget {
                upgrade_version: "15.2(4)E8".into(),
                upgrade_img: "c3750e-universalk9-tar.152-4.E8.tar".into(),
            },
        );
        Arc::new(table)
    }

    fn machine(name: &str, connector: &ScriptedConnector) -> DeviceUpgradeMachine {
        DeviceUpgradeMachine::new(
            Device::new(DeviceIdentity {
                name: name.into(),
                hostname: "192.0.2.10".into(),
            }),
            images(),
            Arc::new(Credentials {
                username: "admin".into(),
                password: "pw".to_string().into(),
            }),
            Arc::new(connector.clone()),
            Arc::new(IosOutputParser::new().unwrap()),
        )
    }

    #[test]
    fn test_transition_table() {
        use MachineState::*;
        assert!(Idle.can_transition(Inspecting));
        assert!(Comparing.can_transition(Failed));
        assert!(!Idle.can_transition(Upgrading));
        assert!(!NotNeeded.can_transition(Upgrading));
        assert!(!UpgradeFailed.can_transition(Reloading));
        assert!(!Verified.can_transition(Failed));
        assert!(UpgradeFailed.is_terminal() && UpgradeFailed.is_failed());
        assert!(!AwaitingReloadConfirm.is_terminal());
    }

    #[tokio::test]
    async fn test_not_needed_skips_upgrade() {
        let connector = ScriptedConnector::new();
        connector
            .respond("idf-1", "show version", VERSION_3750X)
            .respond("idf-1", "show switch detail", SWITCH_DETAIL)
            .respond(
                "idf-1",
                "show boot",
                "BOOT path-list      : flash:/c3750e-universalk9-mz.152-4.E8/c3750e-universalk9-mz.152-4.E8.bin\n",
            );

        let mut m = machine("idf-1", &connector);
        assert_eq!(m.inspect().await.unwrap(), MachineState::Comparing);
        assert_eq!(
            m.compare(&CommandBuilder::new(), "http://10.0.0.5:8000").unwrap(),
            MachineState::NotNeeded
        );
        assert_eq!(m.device().upgrade, UpgradeFlag::NotNeeded);
        assert!(m.device().staged_for_reload);
        assert!(m.command().is_none());

        // Terminal: later phases are rejected
        assert!(m.upgrade(&ResultClassifier::new(), 150).await.is_err());
        assert!(m.reload().await.is_err());
        assert_eq!(
            connector.commands("idf-1"),
            vec!["show version", "show switch detail", "show boot"]
        );
    }

    #[tokio::test]
    async fn test_install_mode_upgrade_and_reload() {
        let connector = ScriptedConnector::new();
        connector
            .respond("sw9k", "show version", VERSION_9300)
            .respond("sw9k", "show switch detail", SWITCH_DETAIL)
            .respond("sw9k", "write memory", "Building configuration...\n[OK]")
            .respond("sw9k", "reload", "Proceed with reload? [confirm]")
            .reply("sw9k", "", Reply::Closed);
        let command = "request platform software package install switch all file \
                       http://10.0.0.5:8000/cat9k_iosxe.16.09.04.SPA.bin on-reboot";
        connector.respond(
            "sw9k",
            command,
            "Copying image file\nSUCCESS: Finished installing software.\n",
        );

        let mut m = machine("sw9k", &connector);
        m.inspect().await.unwrap();
        assert_eq!(
            m.compare(&CommandBuilder::new(), "http://10.0.0.5:8000").unwrap(),
            MachineState::AwaitingUpgrade
        );
        assert_eq!(m.command().unwrap().text, command);

        assert_eq!(
            m.upgrade(&ResultClassifier::new(), 150).await.unwrap(),
            MachineState::AwaitingReloadConfirm
        );
        assert_eq!(
            m.device().last_result.as_ref().unwrap().classification,
            Classification::Success
        );

        assert_eq!(m.reload().await.unwrap(), MachineState::Verified);
        assert!(m.failure().is_none());

        let sent = connector.commands("sw9k");
        assert_eq!(
            &sent[sent.len() - 3..],
            &["write memory".to_string(), "reload".to_string(), String::new()]
        );
    }

    #[tokio::test]
    async fn test_error_output_fails_upgrade() {
        let connector = ScriptedConnector::new();
        connector
            .respond("sw9k", "show version", VERSION_9300)
            .respond("sw9k", "show switch detail", SWITCH_DETAIL);
        let mut m = machine("sw9k", &connector);
        m.inspect().await.unwrap();
        m.compare(&CommandBuilder::new(), "http://10.0.0.5:8000").unwrap();
        let text = m.command().unwrap().text.clone();
        connector.respond(
            "sw9k",
            &text,
            "%Error opening http://10.0.0.5:8000/cat9k (No such file)\nSUCCESS: nothing\n",
        );

        assert_eq!(
            m.upgrade(&ResultClassifier::new(), 150).await.unwrap(),
            MachineState::UpgradeFailed
        );
        let failure = m.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::DownloadFailure);
        assert_eq!(failure.during, MachineState::Upgrading);
        assert!(m.reload().await.is_err());
    }

    #[tokio::test]
    async fn test_deferred_activation_tolerates_silent_output() {
        let connector = ScriptedConnector::new();
        connector
            .respond("sw9k", "show version", VERSION_9300)
            .respond("sw9k", "show switch detail", SWITCH_DETAIL);
        let mut m = machine("sw9k", &connector);
        m.inspect().await.unwrap();
        m.compare(&CommandBuilder::new(), "http://10.0.0.5:8000").unwrap();

        assert_eq!(
            m.upgrade(&ResultClassifier::new(), 150).await.unwrap(),
            MachineState::AwaitingReloadConfirm
        );
    }

    #[tokio::test]
    async fn test_unknown_hardware_fails_closed() {
        let connector = ScriptedConnector::new();
        connector
            .respond("acc-1", "show version", VERSION_2960)
            .respond("acc-1", "show switch detail", SWITCH_DETAIL);
        let mut m = machine("acc-1", &connector);

        assert_eq!(m.inspect().await.unwrap(), MachineState::Failed);
        assert_eq!(m.failure().unwrap().kind, FailureKind::UnknownHardwareModel);
    }

    #[tokio::test]
    async fn test_inspection_failures() {
        let connector = ScriptedConnector::new();
        connector.refuse("down-1");
        connector
            .reply("slow-1", "show version", Reply::Timeout)
            .respond("junk-1", "show version", "% Invalid input detected at '^' marker.");

        let mut down = machine("down-1", &connector);
        assert_eq!(down.inspect().await.unwrap(), MachineState::Failed);
        assert_eq!(down.failure().unwrap().kind, FailureKind::ChannelError);

        let mut slow = machine("slow-1", &connector);
        slow.inspect().await.unwrap();
        assert_eq!(slow.failure().unwrap().kind, FailureKind::InspectionFailure);

        let mut junk = machine("junk-1", &connector);
        junk.inspect().await.unwrap();
        assert_eq!(junk.failure().unwrap().kind, FailureKind::InspectionFailure);
        assert!(junk.compare(&CommandBuilder::new(), "http://x").is_err());
    }

    #[tokio::test]
    async fn test_reload_confirmation_timeout() {
        let connector = ScriptedConnector::new();
        connector
            .respond("sw9k", "show version", VERSION_9300)
            .respond("sw9k", "show switch detail", SWITCH_DETAIL)
            .respond("sw9k", "reload", "Proceed with reload? [confirm]")
            .reply("sw9k", "", Reply::Timeout);
        let mut m = machine("sw9k", &connector);
        m.inspect().await.unwrap();
        m.compare(&CommandBuilder::new(), "http://10.0.0.5:8000").unwrap();
        m.upgrade(&ResultClassifier::new(), 150).await.unwrap();

        assert_eq!(m.reload().await.unwrap(), MachineState::Failed);
        assert_eq!(
            m.failure().unwrap().kind,
            FailureKind::ReloadConfirmationTimeout
        );
    }
}
