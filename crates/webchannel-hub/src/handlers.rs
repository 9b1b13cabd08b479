//! Connection handlers for the webchannel hub.
//!
//! This module handles the WebSocket lifecycle: it decodes client frames
//! into the connection's [`Session`] and writes the session's outbound
//! frames back to the socket.

use crate::config::Config;
use crate::metrics::{self, SessionMetricsGuard};
use crate::session::{Flow, Session};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};
use webchannel_core::ConnectionRegistry;
use webchannel_protocol::{codec, codes, Frame, PROTOCOL_VERSION};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Shared hub state.
pub struct AppState {
    /// Channel registry shared by every session.
    pub registry: ConnectionRegistry,
    /// Hub configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            registry: ConnectionRegistry::with_config(config.registry_config()),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let websocket_path = config.websocket_path.clone();
    let state = Arc::new(AppState::new(config));

    let listener = TcpListener::bind(addr).await?;

    info!("Webchannel hub listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    let mut channels = state.registry.channel_names();
    channels.sort();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION.to_string(),
        "channels": stats.channel_count,
        "connections": stats.connection_count,
        "channel_names": channels,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_message_size = state.config.limits.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = SessionMetricsGuard::new();

    let connection_id = format!("conn_{}", NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed));
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let mut session = Session::new(&connection_id, state.registry.clone(), out_tx.clone());

    let heartbeat = u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX);
    let connected = Frame::connected(&connection_id, PROTOCOL_VERSION.major, heartbeat);
    if !send_frame(&mut sender, &connected).await {
        error!(connection = %connection_id, "Failed to send Connected frame");
        return;
    }

    let idle_timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    // Read buffer for frames split across messages
    let mut read_buffer = BytesMut::with_capacity(4096);

    'conn: loop {
        tokio::select! {
            biased;

            Some(frame) = out_rx.recv() => {
                if !send_frame(&mut sender, &frame).await {
                    break;
                }
            }

            msg = receiver.next() => {
                idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);

                let data = match msg {
                    Some(Ok(WsMessage::Binary(data))) => data,
                    // Treat text as binary
                    Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(WsMessage::Pong(_))) => continue,
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };

                let start = Instant::now();
                metrics::record_frame(data.len(), "inbound");
                read_buffer.extend_from_slice(&data);

                loop {
                    match codec::decode_from(&mut read_buffer) {
                        Ok(Some(frame)) => {
                            if session.handle_frame(frame) == Flow::Close {
                                flush(&mut sender, &mut out_rx).await;
                                break 'conn;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(connection = %connection_id, error = %e, "Invalid frame");
                            metrics::record_error("decode");
                            let _ = out_tx.send(Frame::error(0, codes::INVALID_FRAME, e.to_string()));
                            read_buffer.clear();
                            break;
                        }
                    }
                }

                metrics::record_latency(start.elapsed().as_secs_f64());
            }

            () = &mut idle => {
                debug!(connection = %connection_id, "Idle timeout");
                break;
            }
        }
    }

    debug!(
        connection = %session.connection_id(),
        channels = ?session.joined_channels(),
        "WebSocket disconnected"
    );
    session.close();
}

/// Encode and send one frame. Returns `false` once the socket is gone.
async fn send_frame(sender: &mut SplitSink<WebSocket, WsMessage>, frame: &Frame) -> bool {
    let data = match codec::encode(frame) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "Failed to encode frame");
            metrics::record_error("encode");
            return true;
        }
    };
    metrics::record_frame(data.len(), "outbound");
    sender.send(WsMessage::Binary(data.to_vec())).await.is_ok()
}

/// Send whatever the session queued before the connection closes.
async fn flush(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    out_rx: &mut UnboundedReceiver<Frame>,
) {
    while let Ok(frame) = out_rx.try_recv() {
        if !send_frame(sender, &frame).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};
    use webchannel_core::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start_hub() -> (Arc<AppState>, String) {
        let state = Arc::new(AppState::new(Config::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(Arc::clone(&state));
        tokio::spawn(async move { axum::serve(listener, router).await });
        (state, format!("ws://{}/ws", addr))
    }

    async fn send(client: &mut Client, frame: Frame) {
        let data = codec::encode(&frame).unwrap();
        client.send(ClientMessage::Binary(data.to_vec())).await.unwrap();
    }

    async fn next_frame(client: &mut Client) -> Frame {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("hub did not answer")
                .unwrap()
                .unwrap();
            if let ClientMessage::Binary(data) = msg {
                return codec::decode(&data).unwrap();
            }
        }
    }

    #[test]
    fn test_app_state_uses_configured_limits() {
        let mut config = Config::default();
        config.limits.max_channels = 3;
        config.limits.max_connections_per_channel = 2;

        let state = AppState::new(config);
        assert_eq!(state.registry.config().max_channels, 3);
        assert_eq!(state.registry.config().max_connections_per_channel, 2);
        assert_eq!(state.registry.stats().channel_count, 0);
    }

    #[tokio::test]
    async fn test_health_reports_registry() {
        let state = Arc::new(AppState::new(Config::default()));
        let _a = webchannel_core::SharedChannel::join(&state.registry, "default").unwrap();
        let _b = webchannel_core::SharedChannel::join(&state.registry, "second-channel").unwrap();

        let response = health_handler(State(Arc::clone(&state)))
            .await
            .into_response();
        assert!(response.status().is_success());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["channels"], 2);
        assert_eq!(health["connections"], 2);
        assert_eq!(health["channel_names"], json!(["default", "second-channel"]));
    }

    #[tokio::test]
    async fn test_broadcast_between_remote_contexts() {
        let (state, url) = start_hub().await;
        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();

        for client in [&mut a, &mut b] {
            match next_frame(client).await {
                Frame::Connected { version, .. } => assert_eq!(version, PROTOCOL_VERSION.major),
                other => panic!("Expected Connected frame, got {:?}", other),
            }
            send(client, Frame::hello(PROTOCOL_VERSION.major)).await;
        }

        send(&mut a, Frame::join(1, "default")).await;
        assert_eq!(next_frame(&mut a).await, Frame::ack(1));
        assert_eq!(next_frame(&mut a).await, Frame::connections("default", 1));
        send(&mut a, Frame::register(2, "default", "set-bg-color")).await;
        assert_eq!(next_frame(&mut a).await, Frame::ack(2));

        send(&mut b, Frame::join(1, "default")).await;
        assert_eq!(next_frame(&mut b).await, Frame::ack(1));
        assert_eq!(next_frame(&mut b).await, Frame::connections("default", 2));
        assert_eq!(next_frame(&mut a).await, Frame::connections("default", 2));

        let message = Message::broadcast("bg-red-500").with_callback_key("set-bg-color");
        send(&mut b, Frame::send_with_ack(2, "default", message)).await;
        assert_eq!(next_frame(&mut b).await, Frame::ack(2));
        assert_eq!(
            next_frame(&mut a).await,
            Frame::callback("default", "set-bg-color", json!("bg-red-500"))
        );

        b.close(None).await.unwrap();
        assert_eq!(next_frame(&mut a).await, Frame::connections("default", 1));
        assert_eq!(state.registry.count("default"), 1);
    }

    #[tokio::test]
    async fn test_unsupported_version_closes_session() {
        let (_state, url) = start_hub().await;
        let (mut client, _) = connect_async(url.as_str()).await.unwrap();
        next_frame(&mut client).await;

        send(&mut client, Frame::hello(PROTOCOL_VERSION.major + 1)).await;
        match next_frame(&mut client).await {
            Frame::Error { code, .. } => assert_eq!(code, codes::UNSUPPORTED_VERSION),
            other => panic!("Expected version error, got {:?}", other),
        }
    }
}
