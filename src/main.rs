//! Naja - rescue dispatch and escalation engine for snakebite emergencies.
//!
//! # API Endpoints
//!
//! - `POST /incidents` - Report a bite and start dispatch
//! - `GET  /incidents/:id` - Incident detail
//! - `POST /incidents/:id/raise-range` - Escalate a failed session
//! - `PUT  /incidents/:id/symptoms` - Update symptoms, re-score severity
//! - `POST /incidents/:id/cancel` - Reporter aborts the incident
//! - `POST /requests/:id/respond` - Rescuer accepts or rejects a ping
//! - `POST /missions/:id/cancel` - Assigned mission fell through
//! - `PUT  /rescuers/:id` - Rescuer position/availability feed
//! - `GET  /health` - Health check

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use naja::api::{
    AppState, get_incident, health_check, post_cancel_incident, post_cancel_mission,
    post_incident, post_raise_range, post_respond, put_rescuer, put_symptoms,
};
use naja::config::DispatchConfig;
use naja::notify::{LogNotifier, SharedNotifier, WebhookNotifier};
use naja::storage::Storage;
use naja::sweeper::Sweeper;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:naja.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("naja=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("NAJA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("NAJA_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let config = DispatchConfig::from_env();

    info!(
        port,
        db_url = %db_url,
        radius_tiers = ?config.radius_tiers_km,
        attempts_per_tier = config.attempts_per_tier,
        response_deadline_secs = config.response_deadline.as_secs(),
        max_sessions = config.max_sessions,
        "Starting Naja dispatch engine"
    );

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    let notifier: SharedNotifier = match &config.webhook_url {
        Some(url) => {
            info!(url = %url, "Webhook notifier enabled");
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    };

    // Background expiry sweep
    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(storage.clone(), config.clone(), notifier.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    // Create application state
    let state = AppState {
        storage,
        config: Arc::new(config),
        notifier,
    };

    // Build router
    let app = Router::new()
        .route("/incidents", post(post_incident))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/raise-range", post(post_raise_range))
        .route("/incidents/:id/symptoms", put(put_symptoms))
        .route("/incidents/:id/cancel", post(post_cancel_incident))
        .route("/requests/:id/respond", post(post_respond))
        .route("/missions/:id/cancel", post(post_cancel_mission))
        .route("/rescuers/:id", put(put_rescuer))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Naja is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the sweeper once the server is down
    shutdown.cancel();
    let _ = sweeper_handle.await;

    Ok(())
}
