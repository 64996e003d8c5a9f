// file: src/utils/mod.rs
// version: 2.0.0
// guid: c7e2a84d-1f3b-4d96-8a05-2b9e6f4c1d73

//! Utility modules

pub mod network;

pub use network::NetworkUtils;
