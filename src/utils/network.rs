// file: src/utils/network.rs
// version: 2.0.0
// guid: a3c8e5f1-0b74-4d29-86e1-7f5d2b9c4a08

use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Network utilities for the upgrade agent
pub struct NetworkUtils;

impl NetworkUtils {
    /// Test TCP connectivity to a host
    pub async fn test_connectivity(host: &str, port: u16, timeout_secs: u64) -> bool {
        debug!("Testing connectivity to {}:{}", host, port);

        let timeout_duration = Duration::from_secs(timeout_secs);

        match timeout(timeout_duration, tokio::net::TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => {
                debug!("Successfully connected to {}:{}", host, port);
                true
            }
            Ok(Err(e)) => {
                debug!("Failed to connect to {}:{}: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!(
                    "Connection to {}:{} timed out after {} seconds",
                    host, port, timeout_secs
                );
                false
            }
        }
    }
}
