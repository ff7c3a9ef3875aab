use std::sync::Arc;

use termfleet_pool::SlotPool;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    pub pool: Arc<SlotPool>,
}

impl AppState {
    pub fn new(pool: Arc<SlotPool>) -> Self {
        Self { pool }
    }
}
