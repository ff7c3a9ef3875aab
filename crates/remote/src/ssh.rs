use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use termfleet_core::{CommandOutput, FleetConfig, RemoteError, RemoteExecutor, RemoteSession};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::classify::classify_output;
use crate::keys;

/// SSH-backed executor for the fleet host.
///
/// Each `connect` opens an OpenSSH ControlMaster; the returned session
/// multiplexes individual commands over it so one allocation's worth of
/// commands shares a single authenticated connection.
pub struct SshExecutor {
    config: FleetConfig,
}

impl SshExecutor {
    pub fn new(config: FleetConfig) -> Self {
        Self { config }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    async fn open_master(&self, key_path: &PathBuf) -> Result<SshSession, RemoteError> {
        let control_dir = std::env::temp_dir().join("termfleet");
        std::fs::create_dir_all(&control_dir)
            .map_err(|e| RemoteError::Connection(format!("cannot create control directory: {e}")))?;
        let control_path = control_dir.join(format!("ctl-{}", uuid::Uuid::new_v4()));

        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs));
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        cmd.arg("-i").arg(key_path);
        cmd.arg("-p").arg(self.config.port.to_string());
        cmd.arg("-M").arg("-S").arg(&control_path);
        cmd.arg("-fN");
        cmd.arg(self.target());

        // The master backgrounds itself with -f, so this resolves as soon as
        // authentication finishes or fails. The extra margin covers key
        // exchange on a slow link.
        let deadline = self.config.connect_timeout() + Duration::from_secs(5);
        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RemoteError::Connection(format!("failed to spawn ssh: {e}"))),
            Err(_) => {
                return Err(RemoteError::Connection(format!(
                    "session establishment timed out after {}s",
                    deadline.as_secs()
                )))
            }
        };

        if !output.status.success() {
            return Err(RemoteError::Connection(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        debug!(control = %control_path.display(), "Opened SSH control master");
        Ok(SshSession {
            target: self.target(),
            port: self.config.port,
            control_path,
            command_timeout: self.config.command_timeout(),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        // A missing/unreadable credential is not transient; fail before the
        // retry loop touches the network.
        let key_path = keys::resolve_key(&self.config)?;

        let host = self.config.host.clone();
        let session = retry_connect(
            self.config.connect_attempts,
            self.config.connect_backoff(),
            |attempt| {
                let key_path = key_path.clone();
                let host = host.clone();
                async move {
                    debug!(%host, attempt, "Connecting to fleet host");
                    self.open_master(&key_path).await
                }
            },
        )
        .await?;

        info!(%host, "Connected to fleet host");
        Ok(Box::new(session))
    }
}

/// Run `op` up to `attempts` times with a fixed back-off, giving each
/// attempt a fresh session. Returns the last error when every attempt fails.
pub(crate) async fn retry_connect<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut last_err = RemoteError::Connection("no connection attempts made".to_string());
    for attempt in 1..=attempts.max(1) {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, error = %e, "Fleet host connection attempt failed");
                last_err = e;
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err)
}

/// One multiplexed SSH session. `close` must be called on every exit path;
/// `Drop` is only a backstop for the forgotten case.
pub struct SshSession {
    target: String,
    port: u16,
    control_path: PathBuf,
    command_timeout: Duration,
    closed: AtomicBool,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-S").arg(&self.control_path);
        cmd.arg("-p").arg(self.port.to_string());
        cmd.arg(&self.target);
        cmd.arg(command);

        debug!(%command, "Running remote command");
        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RemoteError::Connection(format!("failed to spawn ssh: {e}")))
            }
            Err(_) => {
                return Err(RemoteError::Timeout {
                    command: command.to_string(),
                    secs: self.command_timeout.as_secs(),
                })
            }
        };

        classify_output(
            command,
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("exit")
            .arg(&self.target)
            .output()
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to close SSH control master");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Fire-and-forget; the control socket file is under the temp dir
        // either way.
        let _ = std::process::Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("exit")
            .arg(&self.target)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
    }
}
