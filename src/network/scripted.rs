// file: src/network/scripted.rs
// version: 1.1.0
// guid: 9c4f2a7e-5b18-4d63-a0e9-1f7d3c8b6e25

//! Canned-response channels for dry runs and tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::DeviceIdentity;
use crate::network::executor::{CommandChannel, Connector, Credentials, TimeoutPolicy};
use crate::{Result, UpgradeError};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Timeout,
    Closed,
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, HashMap<String, VecDeque<Reply>>>,
    refused: HashSet<String>,
    sent: HashMap<String, Vec<String>>,
    opened: HashMap<String, usize>,
    latency: Option<Duration>,
    in_flight: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

/// Connector whose channels replay scripted replies keyed by
/// device name and command text. Unscripted commands return empty output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> Result<T> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| UpgradeError::channel("Scripted connector lock poisoned"))?;
        Ok(f(&mut script))
    }

    /// Queue a reply for `command` on `device`
    pub fn reply(&self, device: &str, command: &str, reply: Reply) -> &Self {
        let _ = self.with_script(|s| {
            s.replies
                .entry(device.to_string())
                .or_default()
                .entry(command.to_string())
                .or_default()
                .push_back(reply);
        });
        self
    }

    pub fn respond(&self, device: &str, command: &str, output: &str) -> &Self {
        self.reply(device, command, Reply::Output(output.to_string()))
    }

    /// Make connection attempts to `device` fail
    pub fn refuse(&self, device: &str) -> &Self {
        let _ = self.with_script(|s| {
            s.refused.insert(device.to_string());
        });
        self
    }

    /// Commands sent to `device`, in order
    pub fn commands(&self, device: &str) -> Vec<String> {
        self.with_script(|s| s.sent.get(device).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Hold every reply for `latency` before returning it
    pub fn with_latency(&self, latency: Duration) -> &Self {
        let _ = self.with_script(|s| s.latency = Some(latency));
        self
    }

    /// Most sends of `command` ever in flight at once, across all devices
    pub fn peak_concurrency(&self, command: &str) -> usize {
        self.with_script(|s| s.peak.get(command).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of channels opened to `device`
    pub fn connections(&self, device: &str) -> usize {
        self.with_script(|s| s.opened.get(device).copied().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        device: &DeviceIdentity,
        _credentials: &Credentials,
    ) -> Result<Box<dyn CommandChannel>> {
        let refused = self.with_script(|s| {
            *s.opened.entry(device.name.clone()).or_default() += 1;
            s.refused.contains(&device.name)
        })?;
        if refused {
            return Err(UpgradeError::connection(format!(
                "Connection to {} refused",
                device.hostname
            )));
        }

        Ok(Box::new(ScriptedChannel {
            device: device.name.clone(),
            script: Arc::clone(&self.script),
            open: true,
        }))
    }
}

/// Channel half of [`ScriptedConnector`]
pub struct ScriptedChannel {
    device: String,
    script: Arc<Mutex<Script>>,
    open: bool,
}

#[async_trait::async_trait]
impl CommandChannel for ScriptedChannel {
    async fn send(&mut self, command: &str, _policy: &TimeoutPolicy) -> Result<String> {
        if !self.open {
            return Err(UpgradeError::ChannelClosed(self.device.clone()));
        }

        let (reply, latency) = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| UpgradeError::channel("Scripted connector lock poisoned"))?;
            script
                .sent
                .entry(self.device.clone())
                .or_default()
                .push(command.to_string());

            let running = script.in_flight.entry(command.to_string()).or_default();
            *running += 1;
            let running = *running;
            let peak = script.peak.entry(command.to_string()).or_default();
            *peak = (*peak).max(running);

            let reply = script
                .replies
                .get_mut(&self.device)
                .and_then(|commands| commands.get_mut(command))
                .and_then(|queue| queue.pop_front());
            (reply, script.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Ok(mut script) = self.script.lock() {
            if let Some(running) = script.in_flight.get_mut(command) {
                *running = running.saturating_sub(1);
            }
        }

        match reply {
            Some(Reply::Output(text)) => Ok(text),
            Some(Reply::Timeout) => Err(UpgradeError::timeout(format!(
                "No response to \"{}\" from {}",
                command, self.device
            ))),
            Some(Reply::Closed) => {
                self.open = false;
                Err(UpgradeError::ChannelClosed(self.device.clone()))
            }
            None => Ok(String::new()),
        }
    }

    fn disconnect(&mut self) {
        self.open = false;
    }
}
