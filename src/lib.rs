// file: src/lib.rs
// version: 3.0.0
// guid: a41e7d08-3f5c-4b92-8e16-7c0d9b2a5f38

//! # Stack Upgrade Agent
//!
//! Orchestrates firmware upgrades across Catalyst switch stacks: inspects each
//! stack's software version and hardware family, decides whether an upgrade is
//! needed, issues the family-specific upgrade command and drives the
//! confirm-to-reload handshake, behind two operator confirmation gates.

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod network;
pub mod reporter;
pub mod upgrade;
pub mod utils;

pub use error::{Result, UpgradeError};

/// Version information for the agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
