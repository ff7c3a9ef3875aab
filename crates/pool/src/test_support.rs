use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use termfleet_core::{
    BrokerCredentials, CommandOutput, ConnectRequest, FleetConfig, RemoteError, RemoteExecutor,
    RemoteSession,
};

use crate::pool::SlotPool;

/// Scripted stand-in for the fleet host: records every command, serves
/// `docker ps` from a programmable container list, and injects command or
/// connection failures on demand.
pub(crate) struct MockFleet {
    commands: Mutex<Vec<String>>,
    live: Mutex<Vec<String>>,
    fail_matching: Mutex<Option<String>>,
    reset_matching: Mutex<Option<(String, usize)>>,
    refuse_connects: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            fail_matching: Mutex::new(None),
            reset_matching: Mutex::new(None),
            refuse_connects: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count_commands(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    /// Subsequent commands containing `needle` report failure.
    pub fn fail_commands_matching(&self, needle: &str) {
        *self.fail_matching.lock().unwrap() = Some(needle.to_string());
    }

    pub fn clear_failures(&self) {
        *self.fail_matching.lock().unwrap() = None;
        *self.reset_matching.lock().unwrap() = None;
    }

    /// The next `count` commands containing `needle` fail with a connection
    /// reset.
    pub fn reset_connections_on(&self, needle: &str, count: usize) {
        *self.reset_matching.lock().unwrap() = Some((needle.to_string(), count));
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next_connects(&self, count: usize) {
        self.refuse_connects.store(count, Ordering::SeqCst);
    }

    /// Set the container names `docker ps` reports.
    pub fn set_live(&self, names: &[&str]) {
        *self.live.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Executor handle handed to the pool; sessions keep their own `Arc` back
/// to the shared fleet state.
pub(crate) struct MockExecutor {
    fleet: Arc<MockFleet>,
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        if self
            .fleet
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Connection("connection refused".to_string()));
        }
        self.fleet.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            fleet: self.fleet.clone(),
        }))
    }
}

struct MockSession {
    fleet: Arc<MockFleet>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        self.fleet.commands.lock().unwrap().push(command.to_string());

        if let Some((needle, count)) = self.fleet.reset_matching.lock().unwrap().as_mut() {
            if *count > 0 && command.contains(needle.as_str()) {
                *count -= 1;
                return Err(RemoteError::Connection("connection reset by peer".to_string()));
            }
        }

        if let Some(needle) = self.fleet.fail_matching.lock().unwrap().as_deref() {
            if command.contains(needle) {
                return Err(RemoteError::Command {
                    command: command.to_string(),
                    stdout: String::new(),
                    stderr: "injected failure".to_string(),
                });
            }
        }

        if command.starts_with("docker ps") {
            return Ok(CommandOutput {
                stdout: self.fleet.live.lock().unwrap().join("\n"),
                stderr: String::new(),
            });
        }

        Ok(CommandOutput::default())
    }

    async fn close(&self) {
        self.fleet.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pool with a mock fleet, small capacity, and no retry delays.
pub(crate) fn test_pool(max_instances: usize) -> (SlotPool, Arc<MockFleet>) {
    let fleet = MockFleet::new();
    let config = FleetConfig {
        max_instances,
        connect_backoff_secs: 0,
        reclaim_retry_delay_secs: 0,
        ..FleetConfig::default()
    };
    let pool = SlotPool::new(config, Arc::new(MockExecutor { fleet: fleet.clone() }));
    (pool, fleet)
}

pub(crate) fn request(owner: &str) -> ConnectRequest {
    ConnectRequest {
        owner_id: owner.to_string(),
        credentials: BrokerCredentials {
            server: "Demo-Server".to_string(),
            login: "100234".to_string(),
            password: "hunter2".to_string(),
        },
        symbol: "EURUSD".to_string(),
        timeframe: "M15".to_string(),
    }
}
