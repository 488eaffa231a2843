//! Echoless Relay Server
//!
//! The signaling backend for Echoless voice rooms. Browsers connect over a
//! WebSocket, join a room by id, and use the relay to:
//!
//! 1. **Discover peers**: a joiner receives the current member list and the
//!    members are told about the joiner, so every pair can start a WebRTC
//!    handshake.
//!
//! 2. **Exchange signals**: SDP offers, answers and ICE candidates are
//!    forwarded to a single target connection without inspection.
//!
//! 3. **Share room state**: mute flags, text chat and leave notices are
//!    broadcast to the room.
//!
//! Audio never passes through the relay. Rooms live only as long as they
//! have members, with a 24h TTL as a backstop for lost disconnects.

mod error;
mod handler;
mod ice;
mod presence;
mod protocol;
mod registry;
mod relay;
mod rooms;
mod state;

use std::time::Duration;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ice::IceConfig;
use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "echoless-relay", version, about = "Echoless voice room signaling relay")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3001, env = "PORT")]
    port: u16,

    /// Origin allowed to call the relay from a browser ("*" for any)
    #[arg(long, default_value = "http://localhost:3000", env = "FRONTEND_URL")]
    frontend_url: String,

    /// Room TTL in seconds, refreshed on every membership change
    #[arg(long, default_value_t = 86400, env = "ROOM_TTL_SECS")]
    room_ttl_secs: i64,

    /// Expired room sweep interval in seconds
    #[arg(long, default_value_t = 300, env = "SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: u64,

    /// Twilio account SID for TURN credentials
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    twilio_account_sid: Option<String>,

    /// Twilio auth token for TURN credentials
    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    twilio_auth_token: Option<String>,

    /// Timeout for the TURN credential request in seconds
    #[arg(long, default_value_t = 5, env = "ICE_TIMEOUT_SECS")]
    ice_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            port: self.port,
            frontend_url: self.frontend_url,
            room_ttl_secs: self.room_ttl_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            ice: IceConfig {
                twilio_account_sid: self.twilio_account_sid,
                twilio_auth_token: self.twilio_auth_token,
                timeout_secs: self.ice_timeout_secs,
            },
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echoless_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Args::parse().into_config();
    let port = config.port;
    let sweep_interval = config.sweep_interval_secs.max(1);

    let state = RelayState::new(config);

    // Spawn periodic sweep of rooms whose disconnects were lost
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            sweep_state.sweep_expired_rooms().await;
        }
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Echoless relay server starting on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = addr.as_str(), error = %e, "Failed to bind address");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Build the HTTP router with all routes and layers.
fn build_router(state: RelayState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/rooms", post(create_room_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if frontend_url == "*" {
        return cors.allow_origin(Any);
    }
    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(
                frontend_url = frontend_url,
                error = %e,
                "Invalid FRONTEND_URL, cross-origin requests will be refused"
            );
            cors
        }
    }
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Mint a fresh room id. Nothing is stored until someone joins it.
async fn create_room_handler() -> impl IntoResponse {
    let room_id = uuid::Uuid::new_v4().to_string();
    tracing::debug!(room_id = room_id.as_str(), "Room id issued");
    Json(json!({ "roomId": room_id }))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "echoless-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "online_clients": state.online_count(),
        "active_rooms": state.presence.room_count().await.unwrap_or_default(),
        "participants": state.presence.participant_count().await.unwrap_or_default(),
        "turn_configured": state.ice.has_upstream(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
