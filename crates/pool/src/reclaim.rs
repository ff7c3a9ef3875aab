use termfleet_core::{PoolError, RemoteError, RemoteSession, SlotId};
use tracing::{info, warn};

use crate::artifacts;
use crate::pool::SlotPool;

impl SlotPool {
    /// Stop and remove a slot's workload and descriptors, then free the
    /// slot.
    ///
    /// The registry slot is vacated on every path, including remote
    /// failure: a stranded container is cheap to garbage-collect later, a
    /// permanently "occupied" slot is not. Remote failure is reported as
    /// `false` rather than an error; a connection reset gets one full retry
    /// after a fixed delay.
    pub async fn reclaim(&self, slot: SlotId) -> Result<bool, PoolError> {
        let mut registry = self.registry.lock().await;
        if !registry.contains(slot) {
            return Err(PoolError::SlotOutOfRange {
                slot,
                max: registry.capacity(),
            });
        }

        // The shared network goes only when no other occupied slot still
        // uses it.
        let others_remain = registry.records().any(|(s, _)| s != slot);

        let mut result = self.teardown(slot, !others_remain).await;
        if matches!(&result, Err(e) if e.is_connection()) {
            warn!(slot, "Connection reset during reclaim, retrying once");
            tokio::time::sleep(self.config.reclaim_retry_delay()).await;
            result = self.teardown(slot, !others_remain).await;
        }

        let record = registry.vacate(slot);
        match result {
            Ok(()) => {
                info!(slot, owner = record.as_ref().map(|r| r.owner_id.as_str()), "Reclaimed instance");
                Ok(true)
            }
            Err(e) => {
                warn!(slot, error = %e, "Remote cleanup failed, slot freed anyway");
                Ok(false)
            }
        }
    }

    async fn teardown(&self, slot: SlotId, remove_network: bool) -> Result<(), RemoteError> {
        let session = self.executor.connect().await?;
        let result = self.teardown_steps(&*session, slot, remove_network).await;
        session.close().await;
        result
    }

    /// Run every cleanup step even when one fails, reporting the first
    /// failure. Connection errors abort immediately so the caller can retry
    /// the whole teardown on a fresh session.
    async fn teardown_steps(
        &self,
        session: &dyn RemoteSession,
        slot: SlotId,
        remove_network: bool,
    ) -> Result<(), RemoteError> {
        let mut commands = vec![
            artifacts::stop_command(&self.config, slot),
            artifacts::cleanup_command(&self.config, slot),
        ];
        if remove_network {
            commands.push(artifacts::remove_network_command(&self.config));
        }

        let mut first_err = None;
        for command in commands {
            if let Err(e) = session.run(&command).await {
                if e.is_connection() {
                    return Err(e);
                }
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
