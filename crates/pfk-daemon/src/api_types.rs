//! Request and response types for all pfk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use pfk_engine::PhaseSnapshot;
use pfk_schemas::{Breach, Transition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub db_connected: bool,
}

/// Uniform error body for refused or failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /v1/accounts/:id/snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub account_id: Uuid,
    pub account_status: String,
    pub current_phase_number: u32,
    pub snapshot: PhaseSnapshot,
}

// ---------------------------------------------------------------------------
// /v1/accounts/:id/trades  /v1/accounts/:id/evaluate
// ---------------------------------------------------------------------------

/// Result of a trade ingestion or manual evaluation, summarizing what the
/// committed outcome contained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub account_id: Uuid,
    pub phase_id: Uuid,
    pub phase_status: String,
    pub equity_micros: i64,
    pub breach_recorded: bool,
    pub transition_recorded: bool,
    pub new_phase_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// /v1/anchors/sweep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRequest {
    /// UTC day id (YYYYMMDD). Defaults to today.
    pub day_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub day_id: u32,
    pub anchors_created: u64,
}

// ---------------------------------------------------------------------------
// /v1/accounts/:id/reset
// ---------------------------------------------------------------------------

/// Resets over HTTP are always manual; the engine enforces the account's
/// permission flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetApiRequest {
    pub actor: String,
    pub reason: String,
    #[serde(default)]
    pub clear_trade_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub account_id: Uuid,
    pub closed_phase_id: Uuid,
    pub new_phase_id: Uuid,
    pub account_status: String,
}

// ---------------------------------------------------------------------------
// /v1/breaches/recent  /v1/transitions/recent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBreachesResponse {
    pub breaches: Vec<Breach>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTransitionsResponse {
    pub transitions: Vec<Transition>,
}
