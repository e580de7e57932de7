//! Connection handlers for the Parley server.
//!
//! This module owns the connection lifecycle: each WebSocket gets a
//! [`Session`] with an outbound mailbox, inbound text records are decoded
//! and dispatched onto the registry, and every error is answered with an
//! `error` envelope to the originating session only. Closing the socket
//! runs the disconnect sweep before the handler returns.

use crate::config::Config;
use crate::directory::{AdminDirectory, HttpAdminDirectory};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use parley_core::{RoomRegistry, Session};
use parley_protocol::{codec, ClientEnvelope, ServerEnvelope};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room registry.
    pub registry: RoomRegistry,
    /// Optional admin-directory lookup, enabled by configuration.
    pub directory: Option<Arc<dyn AdminDirectory>>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin-directory HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let directory: Option<Arc<dyn AdminDirectory>> = match &config.directory.endpoint {
            Some(endpoint) => Some(Arc::new(HttpAdminDirectory::new(
                endpoint.clone(),
                config.directory_timeout(),
            )?)),
            None => None,
        };

        Ok(Self {
            registry: RoomRegistry::new(),
            directory,
            config,
        })
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = Router::new()
        .route(&config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, config.websocket_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEnvelope>();
    let session = Session::new(outbound_tx);

    debug!(session = session.id(), "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Envelopes queued for this session by registry broadcasts.
            Some(envelope) = outbound_rx.recv() => {
                match codec::encode(&envelope) {
                    Ok(text) => {
                        metrics::record_envelope("outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(session = session.id(), error = %e, "Failed to encode envelope");
                    }
                }
            }

            // Inbound traffic from the client.
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(raw))) => {
                        let start = Instant::now();
                        metrics::record_envelope("inbound");
                        dispatch(&state, &session, &raw).await;
                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // The protocol is text records; tolerate clients that
                        // send them in binary frames.
                        match String::from_utf8(data) {
                            Ok(raw) => {
                                metrics::record_envelope("inbound");
                                dispatch(&state, &session, &raw).await;
                            }
                            Err(_) => {
                                metrics::record_error("malformed");
                                session.send(ServerEnvelope::error("malformed", "malformed envelope"));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = session.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = session.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = session.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Disconnect is the only cancellation signal: vacate every room before
    // acknowledging the close.
    state.registry.disconnect(&session);
    metrics::set_active_rooms(state.registry.room_count());

    debug!(session = session.id(), "WebSocket disconnected");
}

/// Decode one inbound text record and route it onto the registry.
///
/// Every failure is answered with an `error` envelope to this session only.
async fn dispatch(state: &Arc<AppState>, session: &Arc<Session>, raw: &str) {
    let envelope = match codec::decode(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            metrics::record_error(e.code());
            session.send(ServerEnvelope::error(e.code(), e.to_string()));
            return;
        }
    };

    let result = match envelope {
        ClientEnvelope::Create { room, sender } => {
            // Seed admins from the directory before touching the registry,
            // so no room lock spans the remote call.
            let seeded = match &state.directory {
                Some(directory) => directory.admins_for(&room).await,
                None => Vec::new(),
            };
            let result = state.registry.create(session, &room, &sender, seeded);
            metrics::set_active_rooms(state.registry.room_count());
            result
        }
        ClientEnvelope::Join { room, sender } => state.registry.join(session, &room, &sender),
        ClientEnvelope::Leave { room } => {
            state.registry.leave(session, &room);
            metrics::set_active_rooms(state.registry.room_count());
            Ok(())
        }
        ClientEnvelope::Message {
            room,
            content,
            timestamp,
            reply_to,
        } => state
            .registry
            .send_message(session, &room, &content, timestamp, reply_to),
        ClientEnvelope::Reaction { room, target, emoji } => {
            state.registry.send_reaction(session, &room, &target, &emoji)
        }
        ClientEnvelope::PresenceRequest { room } => state.registry.presence_request(session, &room),
        ClientEnvelope::Typing { room, typing } => state.registry.typing(session, &room, typing),
        ClientEnvelope::Moderate { room, action, target } => {
            let result = state.registry.moderate(session, &room, &action, &target);
            metrics::set_active_rooms(state.registry.room_count());
            result
        }
    };

    if let Err(e) = result {
        metrics::record_error(e.code());
        session.send(ServerEnvelope::error(e.code(), e.to_string()));
    }
}
