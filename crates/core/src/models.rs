use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::PoolError;

// ---------------------------------------------------------------------------
// Slots & Sessions
// ---------------------------------------------------------------------------

/// Numbered execution unit in `[1, max_instances]`. Each slot hosts at most
/// one trading terminal at a time.
pub type SlotId = u32;

/// Broker account credentials handed to the terminal at allocation time.
///
/// The password never appears in a remote command string directly; the
/// rendered configuration artifact is transported base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerCredentials {
    /// Broker server name (e.g. "Demo-Server-01").
    pub server: String,
    /// Account login number.
    pub login: String,
    pub password: String,
}

/// Metadata for an occupied slot. Absent from the registry ⇒ slot is free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub symbol: String,
    /// Terminal-native timeframe notation (e.g. "M15", "H1").
    pub timeframe: String,
    pub last_active_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(owner_id: impl Into<String>, symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            last_active_at: Utc::now(),
        }
    }

    /// Refresh the activity timestamp (heartbeat / idempotent reconnect).
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Boundary requests & responses
// ---------------------------------------------------------------------------

/// Inbound connect request: who wants a terminal and what it should trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub owner_id: String,
    pub credentials: BrokerCredentials,
    pub symbol: String,
    pub timeframe: String,
}

impl ConnectRequest {
    /// All fields are required; missing data fails fast before any remote
    /// traffic happens.
    pub fn validate(&self) -> Result<(), PoolError> {
        let missing: Vec<&str> = [
            ("owner_id", &self.owner_id),
            ("credentials.server", &self.credentials.server),
            ("credentials.login", &self.credentials.login),
            ("credentials.password", &self.credentials.password),
            ("symbol", &self.symbol),
            ("timeframe", &self.timeframe),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Result of a successful allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub slot_id: SlotId,
    pub symbol: String,
    pub timeframe: String,
}

/// Outcome of one reconciliation sweep against the fleet host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Slots vacated because their workload was gone on the fleet host.
    pub freed_slots: Vec<SlotId>,
    /// Containers removed because no registry slot claimed them.
    pub removed_orphans: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.freed_slots.is_empty() && self.removed_orphans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConnectRequest {
        ConnectRequest {
            owner_id: "user-1".to_string(),
            credentials: BrokerCredentials {
                server: "Demo-Server".to_string(),
                login: "100234".to_string(),
                password: "hunter2".to_string(),
            },
            symbol: "EURUSD".to_string(),
            timeframe: "M15".to_string(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_named_in_error() {
        let mut req = request();
        req.symbol = String::new();
        req.credentials.password = "  ".to_string();

        let err = req.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("symbol"));
        assert!(msg.contains("credentials.password"));
        assert!(!msg.contains("owner_id"));
    }
}
