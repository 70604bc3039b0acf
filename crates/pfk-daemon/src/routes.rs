//! Axum router and all HTTP handlers for pfk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use pfk_engine::{EngineError, EngineEvent, ResetRequest};
use pfk_schemas::{day_id_utc, TradeRecord};
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        ErrorResponse, EvaluationResponse, HealthResponse, RecentBreachesResponse,
        RecentTransitionsResponse, ResetApiRequest, ResetResponse, SnapshotResponse, SweepRequest,
        SweepResponse,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/accounts/:id/snapshot", get(account_snapshot))
        .route("/v1/accounts/:id/trades", post(submit_trade))
        .route("/v1/accounts/:id/evaluate", post(evaluate_account))
        .route("/v1/accounts/:id/reset", post(reset_handler))
        .route("/v1/anchors/sweep", post(sweep_anchors))
        .route("/v1/breaches/recent", get(breaches_recent))
        .route("/v1/transitions/recent", get(transitions_recent))
        .with_state(state)
}

/// Fail closed: account routes refuse with 503 until a DB pool is present.
fn require_pool(st: &AppState) -> Result<&PgPool, Response> {
    st.pool.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "database not connected".to_string(),
            }),
        )
            .into_response()
    })
}

/// Map engine errors onto HTTP statuses; anything else is a 500.
fn error_response(err: anyhow::Error) -> Response {
    let status = match err.downcast_ref::<EngineError>() {
        Some(EngineError::PhaseNotActive { .. }) => StatusCode::CONFLICT,
        Some(EngineError::SequenceConflict { .. }) => StatusCode::CONFLICT,
        Some(EngineError::PhaseStillActive) => StatusCode::CONFLICT,
        Some(EngineError::InvalidTrade(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(EngineError::ResetNotPermitted) => StatusCode::FORBIDDEN,
        Some(EngineError::ConcurrencyConflict { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        Some(EngineError::RulesMissing { .. }) | None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Broadcast engine events on the SSE bus and, when a trail is configured,
/// append them to the JSONL audit trail. Trail write failures are logged,
/// never surfaced — the DB transaction already committed.
fn publish_events(st: &AppState, events: &[EngineEvent]) {
    for ev in events {
        if let Some(trail) = &st.trail {
            let (account_id, kind) = match ev {
                EngineEvent::PhaseChanged { account_id, .. } => {
                    (*account_id, pfk_audit::EVENT_TRANSITION_RECORDED)
                }
                EngineEvent::BreachRecorded { account_id, .. } => {
                    (*account_id, pfk_audit::EVENT_BREACH_RECORDED)
                }
                EngineEvent::AccountReset { account_id, .. } => {
                    (*account_id, pfk_audit::EVENT_ACCOUNT_RESET)
                }
            };
            match serde_json::to_value(ev) {
                Ok(payload) => {
                    if let Ok(mut writer) = trail.lock() {
                        if let Err(e) = writer.append(account_id, kind, payload) {
                            warn!(error = %e, "audit trail append failed");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "engine event serialize failed"),
            }
        }
        let _ = st.bus.send(BusMsg::Engine(ev.clone()));
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            db_connected: st.pool.is_some(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/accounts/:id/snapshot
// ---------------------------------------------------------------------------

pub(crate) async fn account_snapshot(
    State(st): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let result = async {
        let (bundle, snap) = pfk_db::load_phase_snapshot(pool, account_id, Utc::now()).await?;
        anyhow::Ok(SnapshotResponse {
            account_id,
            account_status: bundle.account.status.as_str().to_string(),
            current_phase_number: bundle.account.current_phase_number,
            snapshot: snap,
        })
    }
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/accounts/:id/trades
// ---------------------------------------------------------------------------

pub(crate) async fn submit_trade(
    State(st): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Json(rec): Json<TradeRecord>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match pfk_db::ingest_trade(pool, account_id, &rec, Utc::now()).await {
        Ok(out) => {
            publish_events(&st, &out.events);
            info!(
                account_id = %account_id,
                seq = rec.seq,
                breach = out.breach.is_some(),
                "trade ingested"
            );
            (
                StatusCode::OK,
                Json(EvaluationResponse {
                    account_id,
                    phase_id: out.phase_after.phase_id,
                    phase_status: out.phase_after.status.as_str().to_string(),
                    equity_micros: out.phase_after.equity_micros,
                    breach_recorded: out.breach.is_some(),
                    transition_recorded: out.transition.is_some(),
                    new_phase_id: out.new_phase.as_ref().map(|p| p.phase_id),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/accounts/:id/evaluate
// ---------------------------------------------------------------------------

pub(crate) async fn evaluate_account(
    State(st): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match pfk_db::run_manual_evaluation(pool, account_id, Utc::now()).await {
        Ok(out) => {
            publish_events(&st, &out.events);
            (
                StatusCode::OK,
                Json(EvaluationResponse {
                    account_id,
                    phase_id: out.phase_after.phase_id,
                    phase_status: out.phase_after.status.as_str().to_string(),
                    equity_micros: out.phase_after.equity_micros,
                    breach_recorded: out.breach.is_some(),
                    transition_recorded: out.transition.is_some(),
                    new_phase_id: out.new_phase.as_ref().map(|p| p.phase_id),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/anchors/sweep
// ---------------------------------------------------------------------------

pub(crate) async fn sweep_anchors(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SweepRequest>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let day_id = req.day_id.unwrap_or_else(|| day_id_utc(now));
    match pfk_db::anchor_sweep(pool, day_id, now).await {
        Ok(created) => {
            info!(day_id, created, "anchor sweep");
            (
                StatusCode::OK,
                Json(SweepResponse {
                    day_id,
                    anchors_created: created,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/accounts/:id/reset
// ---------------------------------------------------------------------------

pub(crate) async fn reset_handler(
    State(st): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<ResetApiRequest>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let reset_req = ResetRequest {
        manual: true,
        actor: req.actor,
        reason: req.reason,
        clear_trade_history: req.clear_trade_history,
    };
    match pfk_db::reset_account(pool, account_id, &reset_req, Utc::now()).await {
        Ok(out) => {
            publish_events(&st, &out.events);
            info!(account_id = %account_id, new_phase = %out.new_phase.phase_id, "account reset");
            (
                StatusCode::OK,
                Json(ResetResponse {
                    account_id,
                    closed_phase_id: out.closed_phase.phase_id,
                    new_phase_id: out.new_phase.phase_id,
                    account_status: out.account_after.status.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/breaches/recent  GET /v1/transitions/recent
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RecentQuery {
    limit: Option<i64>,
}

pub(crate) async fn breaches_recent(
    State(st): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match pfk_db::recent_breaches(pool, q.limit.unwrap_or(50).clamp(1, 500)).await {
        Ok(breaches) => {
            (StatusCode::OK, Json(RecentBreachesResponse { breaches })).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub(crate) async fn transitions_recent(
    State(st): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Response {
    let pool = match require_pool(&st) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match pfk_db::recent_transitions(pool, q.limit.unwrap_or(50).clamp(1, 500)).await {
        Ok(transitions) => {
            (StatusCode::OK, Json(RecentTransitionsResponse { transitions })).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Engine(_) => "engine",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
