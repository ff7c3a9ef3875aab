use std::sync::Arc;

use termfleet_core::{
    FleetConfig, PoolError, ReconcileReport, RemoteExecutor, RemoteSession, SessionRecord, SlotId,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::artifacts;
use crate::registry::Registry;

/// Owns the registry and the executor; every allocate/reclaim/reconcile call
/// runs under one mutex so "find free slot" and "occupy it" are a single
/// atomic step.
pub struct SlotPool {
    pub(crate) config: FleetConfig,
    pub(crate) executor: Arc<dyn RemoteExecutor>,
    pub(crate) registry: Mutex<Registry>,
}

impl SlotPool {
    pub fn new(config: FleetConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        let registry = Mutex::new(Registry::new(config.max_instances));
        Self {
            config,
            executor,
            registry,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// (occupied, capacity) from the registry. Cheap; no remote traffic.
    pub async fn occupancy(&self) -> (usize, usize) {
        let registry = self.registry.lock().await;
        (registry.occupied_count(), registry.capacity())
    }

    /// Slot currently registered to an owner, if any.
    pub async fn find_slot_by_owner(&self, owner_id: &str) -> Option<SlotId> {
        self.registry.lock().await.find_by_owner(owner_id)
    }

    /// Occupied slots with their records, lowest slot first.
    pub async fn sessions(&self) -> Vec<(SlotId, SessionRecord)> {
        let registry = self.registry.lock().await;
        registry.records().map(|(s, r)| (s, r.clone())).collect()
    }

    /// Number of live terminal workloads, counted on the fleet host itself
    /// rather than in memory, to survive registry/reality drift after a
    /// restart. Falls back to the registry count only when the live query
    /// cannot reach the host.
    pub async fn count_active(&self) -> Result<usize, PoolError> {
        match self.live_containers().await {
            Ok(names) => Ok(names.len()),
            Err(e) if e.is_connection() => {
                let (occupied, _) = self.occupancy().await;
                warn!(error = %e, occupied, "Live capacity query unreachable, using registry count");
                Ok(occupied)
            }
            Err(e) => Err(PoolError::Remote(e)),
        }
    }

    /// Names of live containers matching the slot naming convention.
    pub(crate) async fn live_containers(&self) -> Result<Vec<String>, termfleet_core::RemoteError> {
        let session = self.executor.connect().await?;
        let result = session.run(&artifacts::list_command(&self.config)).await;
        session.close().await;

        let output = result?;
        Ok(output
            .lines()
            .into_iter()
            .filter(|name| self.parse_slot(name).is_some())
            .map(str::to_string)
            .collect())
    }

    /// Slot number encoded in a container name, when the name follows the
    /// "<prefix>-<slot>" convention and is inside the pool bounds.
    pub(crate) fn parse_slot(&self, name: &str) -> Option<SlotId> {
        let slot: SlotId = name
            .strip_prefix(&self.config.container_prefix)?
            .strip_prefix('-')?
            .parse()
            .ok()?;
        (slot >= 1 && slot as usize <= self.config.max_instances).then_some(slot)
    }

    /// Compare the registry against live fleet-host state: free slots whose
    /// workload is gone, remove workloads no slot claims.
    pub async fn reconcile(&self) -> Result<ReconcileReport, PoolError> {
        let mut registry = self.registry.lock().await;

        let session = self.executor.connect().await?;
        let result = self.reconcile_locked(&mut registry, &*session).await;
        session.close().await;

        let report = result?;
        if !report.is_clean() {
            info!(
                freed = report.freed_slots.len(),
                orphans = report.removed_orphans.len(),
                "Reconciliation swept registry drift"
            );
        }
        Ok(report)
    }

    async fn reconcile_locked(
        &self,
        registry: &mut Registry,
        session: &dyn RemoteSession,
    ) -> Result<ReconcileReport, PoolError> {
        let output = session.run(&artifacts::list_command(&self.config)).await?;
        let live: Vec<String> = output
            .lines()
            .into_iter()
            .filter(|n| self.parse_slot(n).is_some())
            .map(str::to_string)
            .collect();

        let mut report = ReconcileReport::default();

        // Registered but not running: the workload died or the host was
        // cleaned underneath us. Free the slot.
        let registered: Vec<SlotId> = registry.records().map(|(s, _)| s).collect();
        for slot in registered {
            let name = self.config.container_name(slot);
            if !live.iter().any(|n| n == &name) {
                registry.vacate(slot);
                report.freed_slots.push(slot);
            }
        }

        // Running but not registered: stale workload from a previous process
        // lifetime. Remove it and its descriptor directory.
        for name in live {
            let slot = match self.parse_slot(&name) {
                Some(slot) => slot,
                None => continue,
            };
            if registry.get(slot).is_none() {
                session.run(&artifacts::remove_container_command(&name)).await?;
                session.run(&artifacts::cleanup_command(&self.config, slot)).await?;
                report.removed_orphans.push(name);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{request, test_pool};
    use termfleet_core::PoolError;

    #[tokio::test]
    async fn test_count_active_uses_live_state() {
        let (pool, fleet) = test_pool(5);
        // Registry is empty (fresh process), but the host still runs two
        // terminals plus unrelated containers.
        fleet.set_live(&["mt-term-1", "mt-term-3", "postgres-1", "mt-term-99"]);
        assert_eq!(pool.count_active().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_active_falls_back_to_registry_on_connection_error() {
        let (pool, fleet) = test_pool(3);
        pool.allocate(&request("u1")).await.unwrap();
        fleet.refuse_next_connects(1);
        assert_eq!(pool.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_active_propagates_command_failure() {
        let (pool, fleet) = test_pool(3);
        fleet.fail_commands_matching("docker ps");
        let err = pool.count_active().await.unwrap_err();
        assert!(matches!(err, PoolError::Remote(_)));
    }

    #[tokio::test]
    async fn test_reconcile_frees_slots_with_dead_workloads() {
        let (pool, fleet) = test_pool(3);
        pool.allocate(&request("u1")).await.unwrap();
        pool.allocate(&request("u2")).await.unwrap();
        fleet.set_live(&["mt-term-2"]);

        let report = pool.reconcile().await.unwrap();
        assert_eq!(report.freed_slots, vec![1]);
        assert_eq!(pool.occupancy().await, (1, 3));
        assert_eq!(pool.find_slot_by_owner("u2").await, Some(2));
    }

    #[tokio::test]
    async fn test_reconcile_removes_unregistered_workloads() {
        let (pool, fleet) = test_pool(3);
        fleet.set_live(&["mt-term-2"]);

        let report = pool.reconcile().await.unwrap();
        assert_eq!(report.removed_orphans, vec!["mt-term-2".to_string()]);
        assert!(fleet.count_commands("docker rm -f 'mt-term-2'") == 1);
        assert!(fleet.count_commands("rm -rf '/opt/termfleet/slot-2'") == 1);
    }

    #[tokio::test]
    async fn test_reconcile_clean_when_registry_matches_host() {
        let (pool, fleet) = test_pool(3);
        pool.allocate(&request("u1")).await.unwrap();
        fleet.set_live(&["mt-term-1"]);

        let report = pool.reconcile().await.unwrap();
        assert!(report.is_clean());
    }
}
