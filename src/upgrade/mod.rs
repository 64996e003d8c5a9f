// file: src/upgrade/mod.rs
// version: 1.0.0
// guid: 3c5a9f72-8e1d-4b06-a4c7-2d9e5f1b8a30

//! Upgrade core: version comparison, command dispatch, output
//! classification, the per-device machine and the fleet orchestrator

pub mod classifier;
pub mod command;
pub mod machine;
pub mod orchestrator;
pub mod plan;
pub mod prompt;
pub mod version;

pub use classifier::{Classification, ExecutionResult, Keyword, ResultClassifier};
pub use command::{CommandBuilder, CommandTemplate, UpgradeCommand};
pub use machine::{DeviceFailure, DeviceUpgradeMachine, FailureKind, MachineState};
pub use orchestrator::{FleetOrchestrator, RunMode, RunOptions};
pub use plan::UpgradePlan;
pub use prompt::{AssumeYes, PromptProvider, ScriptedPrompt, TerminalPrompt};
pub use version::needs_upgrade;
