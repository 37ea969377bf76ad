//! WebSocket transport for the relay.
//!
//! One axum route upgrades `/ws` requests; each upgraded socket gets a
//! writer task (outbound channel → socket, plus keepalive pings) and a reader
//! task (socket → [`Relay`]). When either side ends, the other is aborted and
//! the connection is removed from every room.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::registry::{ConnectionId, RoomRegistry};
use crate::relay::Relay;

/// Default interval between keepalive pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);
/// Default grace period after a missed ping before the connection is dropped.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(60);
/// Default maximum accepted text frame size in bytes (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Shared server state: the relay plus per-connection transport limits.
pub struct RelayState {
    /// Event router and its membership registry.
    pub relay: Relay,
    max_frame_size: usize,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates state with a fresh registry and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(RoomRegistry::new()))
    }

    /// Creates state over an existing registry with default limits.
    #[must_use]
    pub fn with_registry(registry: Arc<RoomRegistry>) -> Self {
        Self {
            relay: Relay::new(registry),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Creates state from a resolved [`RelayConfig`].
    #[must_use]
    pub fn with_config(config: &RelayConfig, registry: Arc<RoomRegistry>) -> Self {
        Self::with_registry(registry)
            .with_max_frame_size(config.max_frame_size)
            .with_keepalive(
                Duration::from_secs(config.ping_interval_secs),
                Duration::from_secs(config.ping_timeout_secs),
            )
    }

    /// Overrides the maximum accepted text frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Overrides the keepalive ping interval and timeout.
    #[must_use]
    pub fn with_keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    /// How long a connection may stay silent before it is closed.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }

    /// Size-checks and dispatches one inbound text frame.
    fn handle_text(&self, conn: ConnectionId, text: &str) {
        if text.len() > self.max_frame_size {
            tracing::warn!(
                conn_id = %conn,
                size = text.len(),
                max = self.max_frame_size,
                "frame exceeds size limit, dropping"
            );
            return;
        }
        self.relay.handle_frame(conn, text);
    }
}

/// Keepalive timer whose first tick lands one interval from now.
///
/// A zero interval disables pings.
fn keepalive_timer(interval: Duration) -> Option<tokio::time::Interval> {
    (!interval.is_zero())
        .then(|| tokio::time::interval_at(tokio::time::Instant::now() + interval, interval))
}

async fn next_ping(timer: Option<&mut tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Assign a [`ConnectionId`] and register the outbound channel.
/// 2. Forward outbound messages and keepalive pings from the writer task.
/// 3. Dispatch inbound text frames to the relay from the reader task.
/// 4. On close, error, or idle timeout, remove the connection from all rooms.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.relay.connect(conn, tx);

    let ping_interval = state.ping_interval;
    let mut write_task = tokio::spawn(async move {
        let mut ping = keepalive_timer(ping_interval);
        loop {
            tokio::select! {
                next = rx.recv() => {
                    let Some(msg) = next else { break };
                    let closing = matches!(msg, Message::Close(_));
                    if ws_sender.send(msg).await.is_err() {
                        tracing::warn!(conn_id = %conn, "WebSocket write failed");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                () = next_ping(ping.as_mut()) => {
                    if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        tracing::debug!(conn_id = %conn, "keepalive ping failed");
                        break;
                    }
                }
            }
        }
    });

    let idle_timeout = state.idle_timeout();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        loop {
            let Ok(next) = tokio::time::timeout(idle_timeout, ws_receiver.next()).await else {
                tracing::info!(conn_id = %conn, "keepalive timeout, closing connection");
                break;
            };
            let msg = match next {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn, error = %e, "WebSocket read failed");
                    break;
                }
                None => break,
            };
            match msg {
                Message::Text(text) => reader_state.handle_text(conn, text.as_str()),
                Message::Close(_) => {
                    tracing::debug!(conn_id = %conn, "received close frame");
                    break;
                }
                _ => {
                    // Binary, ping and pong frames only count as liveness.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.relay.disconnect(conn);
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Liveness check for load balancers.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Builds the axum router for the relay.
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/health", axum::routing::get(health))
        .with_state(state)
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_shutdown(addr, state, std::future::pending()).await
}

/// Starts the relay server and stops it once `shutdown` resolves.
///
/// Before the listener stops, every open connection is sent a close frame.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_shutdown<F>(
    addr: &str,
    state: Arc<RelayState>,
    shutdown: F,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::clone(state.relay.registry());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let signal = async move {
            shutdown.await;
            tracing::info!("shutting down, closing all connections");
            registry.close_all();
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
        {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}
