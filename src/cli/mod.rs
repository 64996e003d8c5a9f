// file: src/cli/mod.rs
// version: 2.0.0
// guid: 6d3f8a21-9c4e-4b57-a0e6-1b8d5c2f7e93

//! Command line interface for the stack upgrade agent

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::*;
