// file: src/network/executor.rs
// version: 2.0.0
// guid: 3d8a5f12-6e4c-4b97-a0d3-8c1f7e5b2a69

//! Command channel abstraction over device CLI transports

use std::time::Duration;

use secrecy::SecretString;

use crate::device::DeviceIdentity;
use crate::Result;

/// How a channel decides a response is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read until the device prompt reappears
    Prompt,
    /// Read until the prompt reappears or the output goes quiet
    Timing,
}

/// Per-call read policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub mode: ReadMode,
    /// Delay between reads
    pub poll_interval: Duration,
    /// Silence that ends a timing-mode read
    pub quiet_period: Duration,
    /// Hard limit for the whole call
    pub deadline: Duration,
}

impl TimeoutPolicy {
    /// Show commands
    pub fn standard() -> Self {
        Self {
            mode: ReadMode::Prompt,
            poll_interval: Duration::from_millis(100),
            quiet_period: Duration::from_secs(2),
            deadline: Duration::from_secs(60),
        }
    }

    /// Commands that may stop at an interactive question, such as `reload`
    pub fn interactive() -> Self {
        Self {
            mode: ReadMode::Timing,
            poll_interval: Duration::from_millis(100),
            quiet_period: Duration::from_secs(2),
            deadline: Duration::from_secs(60),
        }
    }

    /// Image transfer and flash programming. The delay factor scales both
    /// the tolerated silence and the hard limit, so a factor of 150 allows
    /// five minutes without output and fifty minutes overall.
    pub fn long_running(delay_factor: u32) -> Self {
        let factor = u64::from(delay_factor.max(1));
        Self {
            mode: ReadMode::Timing,
            poll_interval: Duration::from_millis(500),
            quiet_period: Duration::from_secs(2 * factor),
            deadline: Duration::from_secs(20 * factor),
        }
    }
}

/// Device login credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Sends command text to a device and returns raw output
#[async_trait::async_trait]
pub trait CommandChannel: Send {
    /// Send one command line and read its response
    async fn send(&mut self, command: &str, policy: &TimeoutPolicy) -> Result<String>;

    /// Persist the running configuration
    async fn save_config(&mut self) -> Result<String> {
        self.send("write memory", &TimeoutPolicy::standard()).await
    }

    /// Close the transport
    fn disconnect(&mut self);
}

/// Opens command channels to devices
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        device: &DeviceIdentity,
        credentials: &Credentials,
    ) -> Result<Box<dyn CommandChannel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_running_scales_with_delay_factor() {
        let policy = TimeoutPolicy::long_running(150);
        assert_eq!(policy.mode, ReadMode::Timing);
        assert_eq!(policy.quiet_period, Duration::from_secs(300));
        assert_eq!(policy.deadline, Duration::from_secs(3000));
        assert!(policy.deadline > TimeoutPolicy::standard().deadline);
    }

    #[test]
    fn test_zero_delay_factor_is_clamped() {
        let policy = TimeoutPolicy::long_running(0);
        assert_eq!(policy.quiet_period, Duration::from_secs(2));
    }
}
