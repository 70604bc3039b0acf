//! pfk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the shared
//! state, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use pfk_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    // The daemon boots without a database rather than crash-looping; account
    // routes fail closed with 503 until the pool is present.
    let pool = match pfk_db::connect_from_env().await {
        Ok(pool) => {
            pfk_db::migrate(&pool).await?;
            Some(pool)
        }
        Err(e) => {
            warn!(error = %e, "starting without a database; account routes disabled");
            None
        }
    };

    let mut app_state = state::AppState::new(pool);
    app_state.trail = open_audit_trail()?;
    let shared = Arc::new(app_state);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8731)));
    info!("pfk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("PFK_DAEMON_ADDR").ok()?.parse().ok()
}

/// Open the JSONL lifecycle trail named by PFK_AUDIT_TRAIL, resuming the
/// hash chain from the last event already on disk. Unset env means no trail.
fn open_audit_trail() -> anyhow::Result<Option<std::sync::Mutex<pfk_audit::TrailWriter>>> {
    let Ok(path) = std::env::var("PFK_AUDIT_TRAIL") else {
        return Ok(None);
    };

    let mut writer = pfk_audit::TrailWriter::new(&path, true)?;
    if std::path::Path::new(&path).exists() {
        let events = pfk_audit::read_trail(&path)?;
        writer.set_seq(events.len() as u64);
        writer.set_last_hash(events.last().and_then(|ev| ev.hash_self.clone()));
    }

    info!(path, "audit trail enabled");
    Ok(Some(std::sync::Mutex::new(writer)))
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
