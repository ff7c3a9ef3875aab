use async_trait::async_trait;

use crate::models::SlotId;

// ---------------------------------------------------------------------------
// Remote Command Executor
// ---------------------------------------------------------------------------

/// Captured output of one remote command. stdout and stderr are kept apart
/// because container engines write expected progress chatter to stderr.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty stdout lines, trimmed.
    pub fn lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Errors from the remote execution layer.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Could not reach or authenticate to the fleet host. Retried inside the
    /// executor up to its attempt bound.
    #[error("Connection failed: {0}")]
    Connection(String),
    /// The remote command reported failure.
    #[error("Command failed: {command}: {stderr}")]
    Command {
        command: String,
        stdout: String,
        stderr: String,
    },
    /// The command did not complete within the deadline.
    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },
}

impl RemoteError {
    pub fn is_connection(&self) -> bool {
        matches!(self, RemoteError::Connection(_))
    }
}

/// Opens authenticated sessions to the fleet host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Establish a session, retrying transient connection failures with a
    /// fresh session per attempt.
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// One established session. Callers must `close` on every exit path.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a single command to completion and classify its output.
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Tear the session down. Best-effort; never fails the caller.
    async fn close(&self);
}

// ---------------------------------------------------------------------------
// Slot pool errors
// ---------------------------------------------------------------------------

/// Errors surfaced by allocate/reclaim/capacity operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A required request field was missing or empty.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// Every slot is occupied.
    #[error("All {max} instances are in use ({occupied} occupied)")]
    CapacityExceeded { occupied: usize, max: usize },
    /// Staging or starting the workload failed; the slot stays free.
    #[error("Allocation failed while {context}: {source}")]
    Allocation {
        context: String,
        #[source]
        source: RemoteError,
    },
    /// A remote operation outside allocation failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The slot number is outside the configured pool.
    #[error("Slot {slot} is out of range (pool size {max})")]
    SlotOutOfRange { slot: SlotId, max: usize },
}

impl PoolError {
    pub fn is_at_capacity(&self) -> bool {
        matches!(self, PoolError::CapacityExceeded { .. })
    }
}
