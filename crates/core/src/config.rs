use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::SlotId;

/// Fleet-wide configuration: where the fleet host is, how to authenticate,
/// and how workloads are named and laid out on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fleet host address.
    pub host: String,
    /// SSH port on the fleet host.
    pub port: u16,
    /// SSH user on the fleet host.
    pub user: String,
    /// Path to the SSH private key. Overridden by `FLEET_SSH_KEY_B64` when
    /// the key is supplied inline.
    pub key_path: Option<PathBuf>,

    /// Static pool size.
    pub max_instances: usize,
    /// Terminal container image.
    pub image: String,
    /// Container name prefix; slot N runs as "<prefix>-N".
    pub container_prefix: String,
    /// Base directory on the fleet host for per-slot descriptors.
    pub remote_dir: String,
    /// Fixed path inside the container where the terminal reads its config.
    pub container_config_path: String,
    /// Shared network all terminal containers join.
    pub network: String,

    /// Session establishment timeout per attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// Connection attempts before surfacing the error.
    pub connect_attempts: u32,
    /// Fixed back-off between connection attempts, in seconds.
    pub connect_backoff_secs: u64,
    /// Deadline for a single remote command, in seconds.
    pub command_timeout_secs: u64,
    /// Delay before the single reclaim retry after a connection reset.
    pub reclaim_retry_delay_secs: u64,
    /// Interval for the reconciliation sweep; 0 disables it.
    pub reconcile_interval_secs: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 22,
            user: "fleet".to_string(),
            key_path: None,
            max_instances: 15,
            image: "termfleet/mt-terminal:latest".to_string(),
            container_prefix: "mt-term".to_string(),
            remote_dir: "/opt/termfleet".to_string(),
            container_config_path: "/config/terminal.ini".to_string(),
            network: "termfleet-net".to_string(),
            connect_timeout_secs: 10,
            connect_attempts: 3,
            connect_backoff_secs: 2,
            command_timeout_secs: 60,
            reclaim_retry_delay_secs: 5,
            reconcile_interval_secs: 300,
        }
    }
}

impl FleetConfig {
    /// Container name for a slot: stable and slot-derived so start/stop/
    /// cleanup commands can address it deterministically.
    pub fn container_name(&self, slot: SlotId) -> String {
        format!("{}-{}", self.container_prefix, slot)
    }

    /// Per-slot descriptor directory on the fleet host.
    pub fn slot_dir(&self, slot: SlotId) -> String {
        format!("{}/slot-{}", self.remote_dir, slot)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.connect_backoff_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn reclaim_retry_delay(&self) -> Duration {
        Duration::from_secs(self.reclaim_retry_delay_secs)
    }
}
