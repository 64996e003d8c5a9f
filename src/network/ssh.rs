// file: src/network/ssh.rs
// version: 2.0.0
// guid: 7f4b2c90-1a8e-4d63-b5f7-0e9c3a6d8b21

//! SSH command channel for Catalyst CLI sessions

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use secrecy::ExposeSecret;
use ssh2::{Channel, Session};
use tracing::{debug, info, warn};

use super::executor::{CommandChannel, Connector, Credentials, ReadMode, TimeoutPolicy};
use crate::device::DeviceIdentity;
use crate::{Result, UpgradeError};

const READ_CHUNK: usize = 8192;

/// Opens interactive SSH shells to devices
#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(22, Duration::from_secs(30))
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    async fn open(
        &self,
        device: &DeviceIdentity,
        credentials: &Credentials,
    ) -> Result<Box<dyn CommandChannel>> {
        info!("Connecting to {} as {}", device.hostname, credentials.username);

        let host = device.hostname.clone();
        let port = self.port;
        let timeout = self.connect_timeout;
        let credentials = credentials.clone();

        let shell = tokio::task::spawn_blocking(move || {
            ShellSession::establish(&host, port, &credentials, timeout)
        })
        .await
        .map_err(|e| UpgradeError::system(format!("SSH connect task failed: {}", e)))??;

        info!("SSH session established to {} (prompt {})", device.hostname, shell.prompt);
        Ok(Box::new(SshChannel {
            host: device.hostname.clone(),
            shell: Some(Arc::new(Mutex::new(shell))),
        }))
    }
}

/// Interactive shell channel to one device
pub struct SshChannel {
    host: String,
    shell: Option<Arc<Mutex<ShellSession>>>,
}

#[async_trait::async_trait]
impl CommandChannel for SshChannel {
    async fn send(&mut self, command: &str, policy: &TimeoutPolicy) -> Result<String> {
        debug!("Sending to {}: {:?}", self.host, command);

        let shell = self
            .shell
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| UpgradeError::ChannelClosed(format!("No active session to {}", self.host)))?;
        let command = command.to_string();
        let policy = *policy;

        tokio::task::spawn_blocking(move || {
            let mut shell = shell
                .lock()
                .map_err(|_| UpgradeError::channel("SSH session lock poisoned"))?;
            shell.send(&command, &policy)
        })
        .await
        .map_err(|e| UpgradeError::system(format!("SSH send task failed: {}", e)))?
    }

    fn disconnect(&mut self) {
        if let Some(shell) = self.shell.take() {
            if let Ok(shell) = shell.lock() {
                let _ = shell.session.disconnect(None, "", None);
            }
            info!("SSH session to {} disconnected", self.host);
        }
    }
}

impl Drop for SshChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ShellSession {
    session: Session,
    channel: Channel,
    prompt: String,
}

impl ShellSession {
    fn establish(
        host: &str,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| UpgradeError::connection(format!("Failed to resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| UpgradeError::connection(format!("No address for {}", host)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| UpgradeError::connection(format!("Failed to connect to {}: {}", host, e)))?;

        let mut session = Session::new()
            .map_err(|e| UpgradeError::connection(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u128::from(u32::MAX)) as u32);
        session
            .handshake()
            .map_err(|e| UpgradeError::connection(format!("SSH handshake failed: {}", e)))?;

        let password = credentials.password.expose_secret();
        let auth = if password.is_empty() {
            session.userauth_agent(&credentials.username)
        } else {
            session.userauth_password(&credentials.username, password)
        };
        if auth.is_err() || !session.authenticated() {
            return Err(UpgradeError::connection(format!(
                "SSH authentication failed for {}@{}",
                credentials.username, host
            )));
        }

        let mut channel = session
            .channel_session()
            .map_err(|e| UpgradeError::connection(format!("Failed to open SSH channel: {}", e)))?;
        channel
            .request_pty("vt100", None, Some((511, 24, 0, 0)))
            .map_err(|e| UpgradeError::connection(format!("PTY request failed: {}", e)))?;
        channel
            .shell()
            .map_err(|e| UpgradeError::connection(format!("Shell request failed: {}", e)))?;
        session.set_blocking(false);

        let mut shell = Self {
            session,
            channel,
            prompt: String::new(),
        };

        let banner = shell.read_until(&TimeoutPolicy::interactive())?;
        shell.prompt = last_line(&banner).to_string();
        if shell.prompt.is_empty() {
            return Err(UpgradeError::connection(format!("No CLI prompt from {}", host)));
        }

        shell.send("terminal length 0", &TimeoutPolicy::standard())?;
        Ok(shell)
    }

    fn send(&mut self, command: &str, policy: &TimeoutPolicy) -> Result<String> {
        self.write_line(command)?;
        let output = self.read_until(policy)?;
        Ok(strip_echo_and_prompt(&output, command, &self.prompt))
    }

    fn write_line(&mut self, command: &str) -> Result<()> {
        let line = format!("{}\n", command);
        let mut written = 0;
        let deadline = Instant::now() + Duration::from_secs(30);
        let bytes = line.as_bytes();

        while written < bytes.len() {
            match self.channel.write(&bytes[written..]) {
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(UpgradeError::timeout("Write to device stalled"));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => return Err(map_io(e)),
            }
        }
        Ok(())
    }

    fn read_until(&mut self, policy: &TimeoutPolicy) -> Result<String> {
        let started = Instant::now();
        let mut last_data = Instant::now();
        let mut output = String::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            loop {
                match self.channel.read(&mut buf) {
                    Ok(0) => {
                        if self.channel.eof() {
                            return Err(UpgradeError::ChannelClosed(
                                "Device closed the session".to_string(),
                            ));
                        }
                        break;
                    }
                    Ok(n) => {
                        output.push_str(&String::from_utf8_lossy(&buf[..n]).replace('\r', ""));
                        last_data = Instant::now();
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(map_io(e)),
                }
            }

            if !self.prompt.is_empty() && ends_with_prompt(&output, &self.prompt) {
                return Ok(output);
            }
            if policy.mode == ReadMode::Timing && last_data.elapsed() >= policy.quiet_period {
                return Ok(output);
            }
            if started.elapsed() >= policy.deadline {
                warn!("Read deadline of {:?} exceeded", policy.deadline);
                return Err(UpgradeError::timeout(format!(
                    "No response within {:?}",
                    policy.deadline
                )));
            }
            std::thread::sleep(policy.poll_interval);
        }
    }
}

fn map_io(e: std::io::Error) -> UpgradeError {
    match e.kind() {
        ErrorKind::TimedOut => UpgradeError::timeout(e.to_string()),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            UpgradeError::ChannelClosed(e.to_string())
        }
        _ => UpgradeError::Io(e),
    }
}

fn last_line(output: &str) -> &str {
    output.trim_end().rsplit('\n').next().unwrap_or_default().trim()
}

/// Whether the output ends at the device prompt. Only the hostname part is
/// compared so `SW1>` and `SW1#` both match.
fn ends_with_prompt(output: &str, prompt: &str) -> bool {
    let base = prompt.trim_end_matches(['#', '>']);
    let tail = last_line(output);
    !base.is_empty() && tail.starts_with(base) && tail.ends_with(['#', '>'])
}

fn strip_echo_and_prompt(output: &str, command: &str, prompt: &str) -> String {
    let mut lines: Vec<&str> = output.lines().collect();
    if lines
        .first()
        .is_some_and(|l| !command.is_empty() && l.trim_end().ends_with(command.trim()))
    {
        lines.remove(0);
    }
    if lines
        .last()
        .is_some_and(|l| ends_with_prompt(l, prompt))
    {
        lines.pop();
    }
    lines.join("\n")
}
