// file: src/logging/mod.rs
// version: 1.1.0
// guid: 2a7e9c1d-5b30-4f68-8d14-6e0b3a5c9f72

//! Logging system for the stack upgrade agent

pub mod logger;

pub use logger::{init_json_logger, init_logger, with_device_span};
