// file: src/error.rs
// version: 3.0.0
// guid: 5c0d8e61-4f8a-4b7e-9a43-1e7d2c9b6f10

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, UpgradeError>;

/// Error types for the stack upgrade agent
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown hardware model: {0}")]
    UnknownHardwareModel(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Run aborted by operator before {0} phase")]
    Aborted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("System error: {0}")]
    System(String),
}

impl UpgradeError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Create a new system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UpgradeError::UnknownHardwareModel("WS-C2960X-48TS".to_string());
        assert_eq!(err.to_string(), "Unknown hardware model: WS-C2960X-48TS");

        let err = UpgradeError::Aborted("upgrade".to_string());
        assert_eq!(err.to_string(), "Run aborted by operator before upgrade phase");
    }
}
