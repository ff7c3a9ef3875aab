use termfleet_core::{ConnectRequest, PoolError, RemoteSession, SessionGrant, SessionRecord, SlotId};
use tracing::{debug, info};

use crate::artifacts;
use crate::pool::SlotPool;

impl SlotPool {
    /// Allocate a terminal slot for the requesting owner.
    ///
    /// Idempotent per owner: a second connect without a disconnect returns
    /// the existing slot and issues no remote traffic. The registry mutex is
    /// held across the whole find-free/stage/start/occupy sequence.
    pub async fn allocate(&self, request: &ConnectRequest) -> Result<SessionGrant, PoolError> {
        request.validate()?;

        let mut registry = self.registry.lock().await;

        if let Some(slot) = registry.find_by_owner(&request.owner_id) {
            if let Some(record) = registry.get_mut(slot) {
                record.touch();
            }
            debug!(owner = %request.owner_id, slot, "Reusing existing session");
            return Ok(SessionGrant {
                slot_id: slot,
                symbol: request.symbol.clone(),
                timeframe: request.timeframe.clone(),
            });
        }

        let slot = registry.find_free().ok_or(PoolError::CapacityExceeded {
            occupied: registry.occupied_count(),
            max: registry.capacity(),
        })?;

        let session = self
            .executor
            .connect()
            .await
            .map_err(|e| allocation_error("connecting to the fleet host", e))?;
        let started = self.start_workload(&*session, request, slot).await;
        session.close().await;
        started?;

        // Only a fully started workload occupies the slot; any earlier
        // failure leaves it free for the next attempt, and partial remote
        // litter is removed by reclaim or the reconciliation sweep.
        registry.occupy(
            slot,
            SessionRecord::new(&*request.owner_id, &*request.symbol, &*request.timeframe),
        );

        info!(owner = %request.owner_id, slot, symbol = %request.symbol, "Allocated terminal instance");
        Ok(SessionGrant {
            slot_id: slot,
            symbol: request.symbol.clone(),
            timeframe: request.timeframe.clone(),
        })
    }

    async fn start_workload(
        &self,
        session: &dyn RemoteSession,
        request: &ConnectRequest,
        slot: SlotId,
    ) -> Result<(), PoolError> {
        let terminal_ini =
            artifacts::render_terminal_config(&request.credentials, &request.symbol, &request.timeframe);
        let compose = artifacts::render_compose(&self.config, slot);

        session
            .run(&artifacts::stage_command(&self.config, slot, &terminal_ini, &compose))
            .await
            .map_err(|e| allocation_error("staging the workload descriptor", e))?;

        session
            .run(&artifacts::ensure_network_command(&self.config))
            .await
            .map_err(|e| allocation_error("preparing the fleet network", e))?;

        session
            .run(&artifacts::start_command(&self.config, slot))
            .await
            .map_err(|e| allocation_error("starting the workload", e))?;

        Ok(())
    }
}

fn allocation_error(context: &str, source: termfleet_core::RemoteError) -> PoolError {
    PoolError::Allocation {
        context: context.to_string(),
        source,
    }
}
