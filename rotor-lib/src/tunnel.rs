//! Starts and stops a single tunnel on a named interface, and queries its
//! liveness. Grounded on the teacher's `worker::run_version_check` pattern
//! for spawning and inspecting an external process, generalized to a
//! background daemon with a PID file instead of a foreground child.

use thiserror::Error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::command_runner::{self, CommandRunner};
use crate::endpoint::Endpoint;

/// The three fixed interface slots, per the data model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Primary,
    Secondary,
    Staging,
}

impl Slot {
    pub fn interface(&self) -> &'static str {
        match self {
            Slot::Primary => "tun0",
            Slot::Secondary => "tun1",
            Slot::Staging => "tun2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Connecting,
    Up,
    Failed,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect tunnel on {0}")]
    ConnectFailed(&'static str),
    #[error(transparent)]
    Command(#[from] command_runner::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LIVENESS_POLL_ATTEMPTS: u32 = 30;

pub struct TunnelController {
    runner: Arc<dyn CommandRunner>,
    /// The external tunnel client binary, e.g. `openvpn`.
    client_binary: String,
    connect_timeout: Duration,
}

impl TunnelController {
    pub fn new(runner: Arc<dyn CommandRunner>, client_binary: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            runner,
            client_binary: client_binary.into(),
            connect_timeout,
        }
    }

    fn pid_file(interface: &str) -> PathBuf {
        PathBuf::from(format!("/var/run/tunnel_{interface}.pid"))
    }

    fn log_file(interface: &str) -> PathBuf {
        PathBuf::from(format!("/var/log/tunnel_{interface}.log"))
    }

    /// Launches `endpoint` on `slot`'s interface and polls liveness at 1 Hz
    /// for up to 30 seconds. The interface is first forced free via
    /// `disconnect`, per spec §4.4's precondition.
    pub async fn connect(&self, endpoint: &Endpoint, slot: Slot) -> Result<(), Error> {
        let interface = slot.interface();
        self.disconnect(slot).await?;

        let working_dir = endpoint
            .config_reference
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        let command = format!(
            "{client} --config {config} --dev {iface} --daemon --writepid {pid} --log-append {log} --cd {cwd}",
            client = self.client_binary,
            config = endpoint.config_reference.display(),
            iface = interface,
            pid = Self::pid_file(interface).display(),
            log = Self::log_file(interface).display(),
            cwd = working_dir,
        );

        tracing::info!(endpoint = %endpoint.name, interface, "connecting tunnel");
        let output = self.runner.run(&command, self.connect_timeout).await?;
        if !output.success {
            tracing::error!(endpoint = %endpoint.name, interface, stderr = %output.stderr, "tunnel client failed to launch");
            return Err(Error::ConnectFailed(interface));
        }

        for _ in 0..LIVENESS_POLL_ATTEMPTS {
            if self.is_live(slot).await? {
                tracing::info!(endpoint = %endpoint.name, interface, "tunnel connected successfully");
                return Ok(());
            }
            tokio::time::sleep(LIVENESS_POLL_INTERVAL).await;
        }

        tracing::error!(endpoint = %endpoint.name, interface, "tunnel failed to establish connection in time");
        self.disconnect(slot).await?;
        Err(Error::ConnectFailed(interface))
    }

    /// Idempotent: a missing PID file is not an error.
    pub async fn disconnect(&self, slot: Slot) -> Result<(), Error> {
        let interface = slot.interface();
        let pid_path = Self::pid_file(interface);

        let command = format!(
            "[ -f {pid} ] && kill -TERM \"$(cat {pid})\" 2>/dev/null; rm -f {pid}",
            pid = pid_path.display()
        );
        self.runner.run(&command, Duration::from_secs(10)).await?;
        Ok(())
    }

    pub async fn is_live(&self, slot: Slot) -> Result<bool, Error> {
        let interface = slot.interface();
        let command = format!("ip addr show {interface}");
        let output = self.runner.run(&command, Duration::from_secs(5)).await?;
        Ok(output.success && output.stdout.contains("inet "))
    }
}

/// Indirection so `RoutingSwitcher` and `RotationManager` can share a single
/// resolved-at-startup UID without re-invoking `getpwnam` per rule install.
pub trait UidResolver: Send + Sync {
    fn resolve(&self, username: &str) -> Option<u32>;
}

pub struct SystemUidResolver;

impl UidResolver for SystemUidResolver {
    fn resolve(&self, username: &str) -> Option<u32> {
        users::get_user_by_name(username).map(|u| u.uid())
    }
}
