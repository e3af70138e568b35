//! Channel relay process (spec §6): accepts websocket connections, speaks
//! the `RelayClientFrame`/`RelayServerFrame` pub/sub protocol, and wires a
//! [`GameServer`] to it as the one privileged subscriber that observes every
//! broadcast and may inject `SERVER_SNAPSHOT`/rebroadcast messages. The
//! static HTTP file server the teacher's `main.rs` serves behind this one is
//! an external collaborator (spec §2) and is not reimplemented here.

mod connection;
mod hub;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use game_server::{ChannelRelay, GameServer, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::hub::Hub;

/// How often the watchdog sweeps channels with no remaining subscribers.
/// Mirrors the teacher's 20-minute `cleanup_dead_rooms` cadence.
const CHANNEL_SWEEP_INTERVAL_SECS: u64 = 1200;

const CONFIG_PATH: &str = "AsterobiaConfig.json";

#[derive(Clone)]
struct AppState {
    hub: Hub,
    game_server: Arc<GameServer>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = ServerConfig::load(&PathBuf::from(CONFIG_PATH), &ServerConfig::default());
    let hub = Hub::new();
    let game_server = GameServer::new(config);
    game_server.wire_to_relay(Arc::new(hub.clone()) as Arc<dyn ChannelRelay>);

    let watchdog_hub = hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(CHANNEL_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let dropped = watchdog_hub.sweep_empty_channels();
            if dropped > 0 {
                tracing::info!(dropped, "swept empty relay channels");
            }
        }
    });

    let state = AppState { hub, game_server };
    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/rooms", get(rooms_handler))
        .route("/reload", get(reload_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
    tracing::info!("relay listening on 127.0.0.1:8080");
    axum::serve(listener, app).await.unwrap();
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| connection::handle(socket, state.hub))
}

/// Lists every live channel and its subscriber count — spec §6 `GET /rooms`,
/// the relay-side replacement for the teacher's `/enlist`.
async fn rooms_handler(State(state): State<AppState>) -> String {
    let mut counts = state.hub.channel_subscriber_counts();
    counts.sort_by(|a, b| a.0.cmp(&b.0));
    counts
        .into_iter()
        .map(|(channel, subscribers)| format!("Channel: {channel:<40} Subscribers: {subscribers:03}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reloads `AsterobiaConfig.json` — spec §6 `GET /reload`. Only rooms
/// created after this call see the new values, matching the teacher's
/// `reload_config` leaving already-running rooms alone.
async fn reload_handler(State(state): State<AppState>) -> String {
    let config = ServerConfig::load(&PathBuf::from(CONFIG_PATH), &state.game_server.current_config());
    state.game_server.reload_config(config);
    format!(
        "reloaded: tick_rate_hz={} physics_enabled={} max_slot={}",
        config.room.tick_rate_hz, config.room.physics_enabled, config.max_slot
    )
}
