use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use termfleet_core::{ConnectRequest, PoolError, SlotId};

use crate::state::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Sessions
        .route("/session/connect", post(connect_session))
        .route("/session/disconnect", post(disconnect_session))
        .route("/sessions", get(list_sessions))
        // Capacity
        .route("/capacity", get(capacity))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

async fn connect_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    match state.pool.allocate(&req).await {
        Ok(grant) => (StatusCode::OK, Json(serde_json::to_value(grant).unwrap())),
        Err(e) => {
            let (status, body) = error_response(&e);
            (status, Json(body))
        }
    }
}

#[derive(Deserialize)]
struct DisconnectRequest {
    owner_id: String,
    /// Omitted when the caller lost its session metadata; falls back to the
    /// owner's registered slot.
    slot_id: Option<SlotId>,
}

#[derive(Serialize)]
struct DisconnectResponse {
    success: bool,
    message: String,
}

async fn disconnect_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DisconnectRequest>,
) -> impl IntoResponse {
    let slot = match req.slot_id {
        Some(slot) => Some(slot),
        None => state.pool.find_slot_by_owner(&req.owner_id).await,
    };

    let Some(slot) = slot else {
        return Json(DisconnectResponse {
            success: true,
            message: format!("no active session for {}", req.owner_id),
        });
    };

    // Disconnect always yields a structured result the UI can render;
    // reclaim failures after registry cleanup come back as success=false.
    match state.pool.reclaim(slot).await {
        Ok(true) => Json(DisconnectResponse {
            success: true,
            message: format!("slot {slot} released"),
        }),
        Ok(false) => Json(DisconnectResponse {
            success: false,
            message: format!("slot {slot} freed, but remote cleanup failed"),
        }),
        Err(e) => Json(DisconnectResponse {
            success: false,
            message: e.to_string(),
        }),
    }
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions: Vec<_> = state
        .pool
        .sessions()
        .await
        .into_iter()
        .map(|(slot, record)| {
            serde_json::json!({
                "slot_id": slot,
                "owner_id": record.owner_id,
                "symbol": record.symbol,
                "timeframe": record.timeframe,
                "last_active_at": record.last_active_at,
            })
        })
        .collect();
    Json(sessions)
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

async fn capacity(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.pool.count_active().await {
        Ok(active) => {
            let (_, max) = state.pool.occupancy().await;
            (
                StatusCode::OK,
                Json(serde_json::json!({ "active": active, "max": max })),
            )
        }
        Err(e) => {
            let (status, body) = error_response(&e);
            (status, Json(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a pool error to an HTTP status and a structured JSON body. Every
/// failure leaves this boundary as a renderable payload, never a bare 500.
fn error_response(err: &PoolError) -> (StatusCode, serde_json::Value) {
    match err {
        PoolError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string(), "is_at_capacity": false }),
        ),
        PoolError::CapacityExceeded { occupied, max } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": err.to_string(),
                "is_at_capacity": true,
                "occupancy": occupied,
                "max": max,
            }),
        ),
        PoolError::SlotOutOfRange { .. } => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string(), "is_at_capacity": false }),
        ),
        PoolError::Allocation { .. } | PoolError::Remote(_) => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": err.to_string(), "is_at_capacity": false }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termfleet_core::RemoteError;

    #[test]
    fn test_capacity_error_carries_occupancy_flag() {
        let err = PoolError::CapacityExceeded { occupied: 15, max: 15 };
        let (status, body) = error_response(&err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["is_at_capacity"], true);
        assert_eq!(body["occupancy"], 15);
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let (status, body) = error_response(&PoolError::Validation("missing symbol".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["is_at_capacity"], false);
        assert!(body["error"].as_str().unwrap().contains("missing symbol"));
    }

    #[test]
    fn test_allocation_error_is_bad_gateway() {
        let err = PoolError::Allocation {
            context: "starting the workload".into(),
            source: RemoteError::Connection("host unreachable".into()),
        };
        let (status, body) = error_response(&err);
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("host unreachable"));
    }
}
