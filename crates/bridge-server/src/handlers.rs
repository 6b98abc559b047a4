//! HTTP and WebSocket handlers for the LED bridge.
//!
//! This module wires the broker link, the ingress task and the HTTP
//! boundary together, and runs the viewer push loop.

use crate::config::Config;
use crate::metrics::{self, ViewerMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use ledbridge_core::{
    run_ingress, Bridge, CommandError, CommandKind, CommandRouter, ViewerSession,
};
use ledbridge_protocol::{codec, EffectConfig};
use ledbridge_transport::MqttLink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Device state and viewers.
    pub bridge: Arc<Bridge>,
    /// Command path to the broker.
    pub commands: CommandRouter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, commands: CommandRouter, config: Config) -> Self {
        Self {
            bridge,
            commands,
            config,
        }
    }
}

/// Body of `POST /send-effect` and `POST /save-default`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Target device.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Effect name.
    #[serde(default)]
    pub effect_name: Option<String>,
    /// Effect parameters; empty when omitted.
    #[serde(default)]
    pub config: Option<EffectConfig>,
}

/// Result of a command request.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Whether the command reached the broker.
    pub success: bool,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Run the bridge: broker link, ingress task and HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let topics = config.topics.to_topic_map()?;
    let broker_options = config.broker.to_options();
    let bridge = Arc::new(Bridge::new(topics.clone()));

    let (link, event_loop) =
        MqttLink::new(&broker_options, &topics).context("Failed to create broker link")?;
    let (ingress_tx, ingress_rx) = mpsc::channel(broker_options.ingress_capacity);

    tokio::spawn(run_ingress(bridge.clone(), ingress_rx, |message, outcome| {
        metrics::record_broker_message(outcome.as_str(), message.payload_size());
    }));
    tokio::spawn(async move {
        if let Err(e) = event_loop.run(ingress_tx).await {
            error!(error = %e, "Broker event loop stopped");
        }
    });

    let commands = CommandRouter::new(Arc::new(link.clone()), topics);
    let state = Arc::new(AppState::new(bridge, commands, config.clone()));
    let app = build_router(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Bridge listening on http://{}", addr);
    info!("Viewer endpoint: ws://{}{}", addr, config.websocket_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = link.disconnect().await {
        warn!(error = %e, "Failed to close broker session");
    }
    info!("Bridge stopped");

    Ok(())
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/api/clients", get(clients_handler))
        .route("/api/effects/:client_id", get(effects_handler))
        .route("/send-effect", post(send_effect_handler))
        .route("/save-default", post(save_default_handler))
        .route(&state.config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler));

    if let Some(dir) = &state.config.static_dir {
        info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.bridge.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": stats.online_count,
        "viewers": state.bridge.viewer_count(),
    }))
}

/// `GET /api/clients`: the current online set.
async fn clients_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.bridge.online_devices().await)
}

/// `GET /api/effects/:client_id`: effects a device announced, or `[]`.
async fn effects_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> impl IntoResponse {
    Json(state.bridge.device_effects(&client_id).await)
}

/// `POST /send-effect`.
async fn send_effect_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    route_command(&state, CommandKind::SendEffect, body).await
}

/// `POST /save-default`.
async fn save_default_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    route_command(&state, CommandKind::SaveDefault, body).await
}

/// Turn a command request into a `{success, error?}` response.
async fn route_command(
    state: &AppState,
    kind: CommandKind,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(command = kind.as_str(), error = %rejection, "Rejected request body");
            metrics::record_command(kind.as_str(), "invalid");
            return (
                StatusCode::BAD_REQUEST,
                Json(CommandResponse::failed(rejection.body_text())),
            )
                .into_response();
        }
    };

    let result = state
        .commands
        .dispatch(
            kind,
            request.client_id.as_deref(),
            request.effect_name.as_deref(),
            request.config,
        )
        .await;

    match result {
        Ok(_) => {
            metrics::record_command(kind.as_str(), "ok");
            Json(CommandResponse::ok()).into_response()
        }
        Err(e @ CommandError::Validation(_)) => {
            metrics::record_command(kind.as_str(), "invalid");
            (StatusCode::BAD_REQUEST, Json(CommandResponse::failed(e.to_string()))).into_response()
        }
        Err(e @ CommandError::Publish(_)) => {
            metrics::record_command(kind.as_str(), "failed");
            metrics::record_error("publish");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommandResponse::failed(e.to_string())),
            )
                .into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

/// Push device snapshots to one viewer until it goes away.
async fn handle_viewer(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ViewerMetricsGuard::new();

    let ViewerSession { id, mut updates } = state.bridge.connect_viewer().await;
    debug!(viewer = %id, "Viewer connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            update = updates.next() => {
                let Some(snapshot) = update else {
                    debug!(viewer = %id, "Viewer removed from hub");
                    break;
                };
                let text = match codec::encode_snapshot(&snapshot) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(viewer = %id, error = %e, "Failed to encode snapshot");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
                metrics::record_push();
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(viewer = %id, "Received close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Viewers are receive-only
                    }
                    Some(Err(e)) => {
                        warn!(viewer = %id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(viewer = %id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.bridge.disconnect_viewer(id);
    debug!(viewer = %id, "Viewer disconnected");
}
