// file: src/network/mod.rs
// version: 2.0.0
// guid: 6a1d9e37-4c2b-4f85-b0e6-9d3f7a2c5e18

//! Device transport, output parsing and image serving

pub mod executor;
pub mod image_server;
pub mod parser;
pub mod scripted;
pub mod ssh;

pub use executor::{CommandChannel, Connector, Credentials, ReadMode, TimeoutPolicy};
pub use image_server::ImageServer;
pub use parser::{BootRecord, IosOutputParser, OutputParser, VersionRecord};
pub use scripted::{Reply, ScriptedConnector};
pub use ssh::SshConnector;
