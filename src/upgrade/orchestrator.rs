// file: src/upgrade/orchestrator.rs
// version: 1.1.0
// guid: 0b7e4c19-2d6a-4f83-9e51-6c3a8d0f2b75

//! Fleet-level execution: phases, concurrency, confirmation gates and
//! failure aggregation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::device::Device;
use crate::logging::with_device_span;
use crate::network::{Connector, Credentials, OutputParser};
use crate::reporter::{ConsoleReporter, DeviceReport, FailedHost, Phase, PhaseReport, RunSummary};
use crate::upgrade::classifier::ResultClassifier;
use crate::upgrade::command::CommandBuilder;
use crate::upgrade::machine::{DeviceUpgradeMachine, FailureKind, MachineState};
use crate::upgrade::plan::UpgradePlan;
use crate::upgrade::prompt::{CredentialResolver, PromptProvider};
use crate::utils::NetworkUtils;
use crate::{Result, UpgradeError};

/// How far a run goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Inspect, compare, upgrade and reload
    Full,
    /// Inspect and compare only
    CheckOnly,
}

/// Per-run execution policy
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub inspect_workers: usize,
    pub upgrade_workers: usize,
    pub reload_workers: usize,
    pub delay_factor: u32,
    pub check_boot: bool,
    /// Connect timeout for the image server reachability check
    pub preflight_timeout_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            inspect_workers: 10,
            upgrade_workers: 1,
            reload_workers: 1,
            delay_factor: 150,
            check_boot: true,
            preflight_timeout_secs: 5,
        }
    }
}

impl RunOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            inspect_workers: settings.runner.inspect_workers.max(1),
            upgrade_workers: settings.runner.upgrade_workers.max(1),
            reload_workers: settings.runner.reload_workers.max(1),
            delay_factor: settings.channel.delay_factor,
            check_boot: settings.runner.check_boot,
            ..Default::default()
        }
    }
}

/// Runs device machines across the plan
pub struct FleetOrchestrator {
    plan: Arc<UpgradePlan>,
    options: RunOptions,
    connector: Arc<dyn Connector>,
    parser: Arc<dyn OutputParser>,
    builder: Arc<CommandBuilder>,
    classifier: Arc<ResultClassifier>,
    prompt: Arc<dyn PromptProvider>,
    reporter: ConsoleReporter,
}

impl FleetOrchestrator {
    pub fn new(
        plan: UpgradePlan,
        connector: Arc<dyn Connector>,
        parser: Arc<dyn OutputParser>,
        prompt: Arc<dyn PromptProvider>,
    ) -> Self {
        Self {
            plan: Arc::new(plan),
            options: RunOptions::default(),
            connector,
            parser,
            builder: Arc::new(CommandBuilder::new()),
            classifier: Arc::new(ResultClassifier::new()),
            prompt,
            reporter: ConsoleReporter::silent(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_classifier(mut self, classifier: ResultClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_reporter(mut self, reporter: ConsoleReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn plan(&self) -> &UpgradePlan {
        &self.plan
    }

    /// Execute the run. Device failures are reported in the summary; `Err`
    /// is only returned when the run cannot start (credential prompt failure).
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.plan.image_base_url());
        info!(
            "Run {} over {} device(s), images from {}",
            summary.run_id,
            self.plan.len(),
            self.plan.image_base_url()
        );

        let mut machines = self.machines().await?;
        let mut lost: Vec<FailedHost> = Vec::new();

        // Inspection
        machines = self
            .run_phase(Phase::Inspect, machines, self.options.inspect_workers, &mut summary, &mut lost)
            .await;

        // Comparison
        self.reporter.banner("Compare versions");
        let started_at = Utc::now();
        let before = failed_names(&machines);
        let mut attempted = 0;
        for machine in machines.iter_mut().filter(|m| m.state() == MachineState::Comparing) {
            attempted += 1;
            if let Err(e) = machine.compare(&self.builder, self.plan.image_base_url()) {
                error!("{}: {}", machine.name(), e);
            }
            self.reporter.device_progress(Phase::Compare, machine);
        }
        let compare = phase_report(Phase::Compare, started_at, attempted, &machines, &before);
        self.reporter.phase_failures(&compare);
        summary.phases.push(compare);

        let pending = count_in(&machines, MachineState::AwaitingUpgrade);
        summary.needs_upgrade = pending;
        info!("{} of {} device(s) need an upgrade", pending, machines.len());

        if mode == RunMode::Full && pending > 0 {
            self.run_destructive_phases(&mut machines, &mut summary, &mut lost)
                .await;
        }

        Ok(self.finish(summary, &machines, lost))
    }

    async fn run_destructive_phases(
        &self,
        machines: &mut Vec<DeviceUpgradeMachine>,
        summary: &mut RunSummary,
        lost: &mut Vec<FailedHost>,
    ) {
        let pending = count_in(machines, MachineState::AwaitingUpgrade);
        if !self
            .gate(
                Phase::Upgrade,
                format!("Upgrade {} device(s) from {}?", pending, self.plan.image_base_url()),
                summary,
            )
            .await
        {
            return;
        }

        self.check_image_server().await;

        let taken = std::mem::take(machines);
        *machines = self
            .run_phase(Phase::Upgrade, taken, self.options.upgrade_workers, summary, lost)
            .await;

        let reloadable = count_in(machines, MachineState::AwaitingReloadConfirm);
        if reloadable == 0 {
            warn!("No device is ready to reload");
            return;
        }
        if !self
            .gate(
                Phase::Reload,
                format!("Save configuration and reload {} device(s)?", reloadable),
                summary,
            )
            .await
        {
            return;
        }

        let taken = std::mem::take(machines);
        *machines = self
            .run_phase(Phase::Reload, taken, self.options.reload_workers, summary, lost)
            .await;
    }

    /// Build one machine per planned device, prompting for missing credentials.
    /// Prompts block on the terminal, so they run on the blocking pool.
    async fn machines(&self) -> Result<Vec<DeviceUpgradeMachine>> {
        let prompt = Arc::clone(&self.prompt);
        let plan = Arc::clone(&self.plan);
        let resolved = tokio::task::spawn_blocking(move || {
            let mut resolver = CredentialResolver::new(prompt.as_ref());
            plan.devices()
                .iter()
                .map(|host| resolver.resolve(host).map(Arc::new))
                .collect::<Result<Vec<Arc<Credentials>>>>()
        })
        .await
        .map_err(|e| UpgradeError::system(format!("Credential prompt task failed: {}", e)))??;

        let mut machines = Vec::with_capacity(self.plan.len());
        for (host, credentials) in self.plan.devices().iter().zip(resolved) {
            let machine = DeviceUpgradeMachine::new(
                Device::new(host.identity.clone()),
                Arc::clone(&host.images),
                credentials,
                Arc::clone(&self.connector),
                Arc::clone(&self.parser),
            )
            .with_boot_check(self.options.check_boot);
            machines.push(machine);
        }

        Ok(machines)
    }

    /// Ask the operator; a refusal is recorded on the summary
    async fn gate(&self, phase: Phase, question: String, summary: &mut RunSummary) -> bool {
        self.reporter.banner(&format!("Confirm {} phase", phase));
        let prompt = Arc::clone(&self.prompt);
        let answer = tokio::task::spawn_blocking(move || prompt.confirm(&question))
            .await
            .map_err(|e| UpgradeError::system(format!("Prompt task failed: {}", e)))
            .and_then(|answer| answer);
        let proceed = match answer {
            Ok(answer) => answer,
            Err(e) => {
                error!("Confirmation failed: {}", e);
                false
            }
        };

        if !proceed {
            warn!("Operator declined the {} phase", phase);
            self.reporter.aborted(phase);
            summary.aborted_at = Some(phase);
        }
        proceed
    }

    /// Warn when the image server is not reachable from this host
    async fn check_image_server(&self) {
        let (host, port) = self.plan.image_endpoint();
        if host.is_empty() {
            return;
        }
        if !NetworkUtils::test_connectivity(host, port, self.options.preflight_timeout_secs).await {
            warn!(
                "Image server {}:{} is not reachable from this host; devices may still reach it",
                host, port
            );
        }
    }

    /// Run `phase` on every eligible machine with at most `workers` at once.
    /// Ineligible machines pass through untouched; plan order is preserved.
    async fn run_phase(
        &self,
        phase: Phase,
        machines: Vec<DeviceUpgradeMachine>,
        workers: usize,
        summary: &mut RunSummary,
        lost: &mut Vec<FailedHost>,
    ) -> Vec<DeviceUpgradeMachine> {
        self.reporter.banner(&format!("{} phase", capitalize(phase.as_str())));
        let started_at = Utc::now();
        let before = failed_names(&machines);
        let lost_before = lost.len();

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut results: Vec<(usize, DeviceUpgradeMachine)> = Vec::with_capacity(machines.len());
        let mut handles = Vec::new();

        for (index, mut machine) in machines.into_iter().enumerate() {
            if machine.state() != eligible_state(phase) {
                results.push((index, machine));
                continue;
            }

            let sem = Arc::clone(&semaphore);
            let classifier = Arc::clone(&self.classifier);
            let delay_factor = self.options.delay_factor;
            let name = machine.name().to_string();
            let hostname = machine.device().identity.hostname.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                let host = machine.name().to_string();
                with_device_span(&host, phase.as_str(), async {
                    let outcome = match phase {
                        Phase::Inspect => machine.inspect().await,
                        Phase::Upgrade => machine.upgrade(&classifier, delay_factor).await,
                        Phase::Reload => machine.reload().await,
                        Phase::Compare => Ok(machine.state()),
                    };
                    if let Err(e) = outcome {
                        error!("{}", e);
                    }
                })
                .await;
                machine
            });
            handles.push((index, name, hostname, handle));
        }

        let attempted = handles.len();
        for (index, name, hostname, handle) in handles {
            match handle.await {
                Ok(machine) => {
                    self.reporter.device_progress(phase, &machine);
                    results.push((index, machine));
                }
                Err(e) => {
                    error!("{}: device task ended abnormally: {}", name, e);
                    lost.push(FailedHost {
                        name,
                        hostname,
                        kind: FailureKind::ChannelError,
                        detail: format!("device task ended abnormally during {}", phase),
                    });
                }
            }
        }

        results.sort_by_key(|(index, _)| *index);
        let machines: Vec<DeviceUpgradeMachine> = results.into_iter().map(|(_, m)| m).collect();

        let mut report = phase_report(phase, started_at, attempted, &machines, &before);
        report.failed.extend(lost[lost_before..].iter().cloned());
        self.reporter.phase_failures(&report);
        summary.phases.push(report);

        machines
    }

    fn finish(
        &self,
        mut summary: RunSummary,
        machines: &[DeviceUpgradeMachine],
        lost: Vec<FailedHost>,
    ) -> RunSummary {
        summary.devices = machines.iter().map(DeviceReport::from_machine).collect();
        summary.failed_hosts = machines
            .iter()
            .filter_map(|m| {
                m.failure()
                    .map(|f| FailedHost::new(m.name(), &m.device().identity.hostname, f))
            })
            .chain(lost)
            .collect();
        summary.completed_at = Some(Utc::now());

        self.reporter.summary(&summary);
        summary
    }
}

fn eligible_state(phase: Phase) -> MachineState {
    match phase {
        Phase::Inspect => MachineState::Idle,
        Phase::Compare => MachineState::Comparing,
        Phase::Upgrade => MachineState::AwaitingUpgrade,
        Phase::Reload => MachineState::AwaitingReloadConfirm,
    }
}

fn count_in(machines: &[DeviceUpgradeMachine], state: MachineState) -> usize {
    machines.iter().filter(|m| m.state() == state).count()
}

fn failed_names(machines: &[DeviceUpgradeMachine]) -> HashSet<String> {
    machines
        .iter()
        .filter(|m| m.failure().is_some())
        .map(|m| m.name().to_string())
        .collect()
}

fn phase_report(
    phase: Phase,
    started_at: chrono::DateTime<Utc>,
    attempted: usize,
    machines: &[DeviceUpgradeMachine],
    before: &HashSet<String>,
) -> PhaseReport {
    let failed = machines
        .iter()
        .filter(|m| !before.contains(m.name()))
        .filter_map(|m| {
            m.failure()
                .map(|f| FailedHost::new(m.name(), &m.device().identity.hostname, f))
        })
        .collect();

    PhaseReport {
        phase,
        started_at,
        completed_at: Utc::now(),
        attempted,
        failed,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageTable, InventoryHost};
    use crate::device::{DeviceIdentity, HardwareFamily, ImageTarget};
    use crate::network::{IosOutputParser, ScriptedConnector};
    use crate::upgrade::prompt::ScriptedPrompt;

    const VERSION_9300: &str = "\
Cisco IOS Software [Fuji], Catalyst L3 Switch Software (CAT9K_IOSXE), Version 16.9.3, RELEASE SOFTWARE (fc2)
Model Number                       : C9300-48UXM
";

    const SWITCH_DETAIL: &str = "\
*1       Active 00a3.d144.1a00     15     V02     Ready
";

    fn host(name: &str) -> InventoryHost {
        let mut images = ImageTable::new();
        images.insert(
            HardwareFamily::C9300,
            ImageTarget {
                upgrade_version: "16.9.4".into(),
                upgrade_img: "cat9k_iosxe.16.09.04.SPA.bin".into(),
            },
        );
        InventoryHost {
            identity: DeviceIdentity {
                name: name.into(),
                hostname: format!("{}.lab", name),
            },
            username: Some("admin".into()),
            password: Some("pw".to_string().into()),
            images: Arc::new(images),
        }
    }

    fn orchestrator(
        names: &[&str],
        connector: &ScriptedConnector,
        prompt: Arc<ScriptedPrompt>,
    ) -> FleetOrchestrator {
        let plan = UpgradePlan::new(
            names.iter().map(|n| host(n)).collect(),
            "http://127.0.0.1:9",
            "",
            9,
        )
        .unwrap();
        FleetOrchestrator::new(
            plan,
            Arc::new(connector.clone()),
            Arc::new(IosOutputParser::new().unwrap()),
            prompt,
        )
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("reload"), "Reload");
        assert_eq!(capitalize(""), "");
    }

    #[tokio::test]
    async fn test_check_only_never_prompts() {
        let connector = ScriptedConnector::new();
        for name in ["a", "b"] {
            connector
                .respond(name, "show version", VERSION_9300)
                .respond(name, "show switch detail", SWITCH_DETAIL);
        }
        let prompt = Arc::new(ScriptedPrompt::default());
        let summary = orchestrator(&["a", "b"], &connector, prompt.clone())
            .run(RunMode::CheckOnly)
            .await
            .unwrap();

        assert_eq!(summary.needs_upgrade, 2);
        assert!(prompt.questions().is_empty());
        assert!(!summary.is_aborted());
        assert_eq!(connector.commands("a").len(), 2);
        assert_eq!(summary.phases.len(), 2);
    }

    #[tokio::test]
    async fn test_declined_reload_leaves_devices_awaiting() {
        let connector = ScriptedConnector::new();
        connector
            .respond("a", "show version", VERSION_9300)
            .respond("a", "show switch detail", SWITCH_DETAIL);
        let prompt = Arc::new(ScriptedPrompt::new(["y", "n"]));
        let summary = orchestrator(&["a"], &connector, prompt.clone())
            .run(RunMode::Full)
            .await
            .unwrap();

        assert_eq!(summary.aborted_at, Some(Phase::Reload));
        assert_eq!(
            summary.device("a").unwrap().state,
            MachineState::AwaitingReloadConfirm
        );
        assert!(!connector.commands("a").iter().any(|c| c == "reload"));
        assert_eq!(prompt.questions().len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_concurrency_runs_every_device() {
        let connector = ScriptedConnector::new();
        let names: Vec<String> = (0..12).map(|i| format!("sw{:02}", i)).collect();
        for name in &names {
            connector
                .respond(name, "show version", VERSION_9300)
                .respond(name, "show switch detail", SWITCH_DETAIL);
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let summary = orchestrator(&refs, &connector, Arc::new(ScriptedPrompt::default()))
            .with_options(RunOptions {
                inspect_workers: 3,
                ..Default::default()
            })
            .run(RunMode::CheckOnly)
            .await
            .unwrap();

        let order: Vec<&str> = summary.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, refs);
        assert_eq!(summary.needs_upgrade, 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_phases_respect_worker_limits() {
        let connector = ScriptedConnector::new();
        connector.with_latency(std::time::Duration::from_millis(20));
        let names = ["sw0", "sw1", "sw2", "sw3", "sw4", "sw5"];
        for name in names {
            connector
                .respond(name, "show version", VERSION_9300)
                .respond(name, "show switch detail", SWITCH_DETAIL);
        }
        let prompt = Arc::new(ScriptedPrompt::new(["y", "y"]));

        let summary = orchestrator(&names, &connector, prompt)
            .with_options(RunOptions {
                inspect_workers: 2,
                ..Default::default()
            })
            .run(RunMode::Full)
            .await
            .unwrap();

        assert_eq!(connector.peak_concurrency("show version"), 2);
        assert!(connector.peak_concurrency("show switch detail") <= 2);

        let install = summary.device("sw0").unwrap().command.clone().unwrap();
        assert_eq!(connector.peak_concurrency(&install), 1);
        assert_eq!(connector.peak_concurrency("reload"), 1);
        assert_eq!(connector.peak_concurrency("write memory"), 1);
        assert_eq!(summary.count_in(MachineState::Verified), names.len());
    }

    /// Answers yes only if other tasks keep running while it waits
    struct RuntimeWatchingPrompt {
        ticked: Arc<std::sync::atomic::AtomicBool>,
    }

    impl PromptProvider for RuntimeWatchingPrompt {
        fn confirm(&self, _question: &str) -> Result<bool> {
            use std::sync::atomic::Ordering;
            self.ticked.store(false, Ordering::SeqCst);
            for _ in 0..100 {
                std::thread::sleep(std::time::Duration::from_millis(5));
                if self.ticked.load(Ordering::SeqCst) {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        fn username(&self) -> Result<String> {
            Ok("admin".into())
        }

        fn password(&self) -> Result<secrecy::SecretString> {
            Ok("pw".to_string().into())
        }
    }

    #[tokio::test]
    async fn test_gate_does_not_stall_the_runtime() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ticked = Arc::new(AtomicBool::new(false));
        let ticker = {
            let ticked = Arc::clone(&ticked);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                    ticked.store(true, Ordering::SeqCst);
                }
            })
        };

        let connector = ScriptedConnector::new();
        connector
            .respond("a", "show version", VERSION_9300)
            .respond("a", "show switch detail", SWITCH_DETAIL);
        let plan = UpgradePlan::new(vec![host("a")], "http://127.0.0.1:9", "", 9).unwrap();
        let summary = FleetOrchestrator::new(
            plan,
            Arc::new(connector.clone()),
            Arc::new(IosOutputParser::new().unwrap()),
            Arc::new(RuntimeWatchingPrompt { ticked }),
        )
        .run(RunMode::Full)
        .await
        .unwrap();
        ticker.abort();

        assert!(!summary.is_aborted());
        assert_eq!(summary.device("a").unwrap().state, MachineState::Verified);
    }
}
