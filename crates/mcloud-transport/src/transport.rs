//! Websocket framing: one task per connection reads `Envelope` frames and
//! dispatches them through a [`MessageHandler`]; outbound frames (responses
//! and events) are written through a per-client sender held in a
//! [`ClientRegistry`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use mcloud_shared::ClientId;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Dispatches one decoded frame. Implemented by the ticket registry, which
/// owns the `task_start`/ping/unknown-task branching described by the wire
/// protocol.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, client: ClientId, envelope: Envelope, transport: Arc<Transport>);

    async fn on_disconnect(&self, client: ClientId);
}

/// Tracks one outbound channel per live connection so that handlers,
/// running on arbitrary tasks, can push responses and events back out.
#[derive(Default)]
pub struct ClientRegistry {
    senders: DashMap<ClientId, mpsc::UnboundedSender<Message>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, client: ClientId, sender: mpsc::UnboundedSender<Message>) {
        self.senders.insert(client, sender);
    }

    fn remove(&self, client: ClientId) {
        self.senders.remove(&client);
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.senders.contains_key(&client)
    }

    pub fn send(&self, client: ClientId, envelope: &Envelope) -> bool {
        let Some(sender) = self.senders.get(&client) else {
            return false;
        };
        match envelope.to_json() {
            Ok(text) => sender.send(Message::Text(text.into())).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound envelope");
                false
            }
        }
    }
}

pub struct Transport {
    pub clients: ClientRegistry,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            clients: ClientRegistry::new(),
        }
    }

    pub fn send_response(&self, client: ClientId, id: i64, success: bool, response: serde_json::Value) {
        self.clients.send(client, &Envelope::response(id, success, response));
    }

    pub fn send_event(&self, client: ClientId, name: impl Into<String>, data: serde_json::Value) {
        self.clients.send(client, &Envelope::event(name, data));
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

struct AppState {
    transport: Arc<Transport>,
    handler: Arc<dyn MessageHandler>,
}

/// Build the axum router serving one websocket endpoint at `/ws`.
pub fn router(transport: Arc<Transport>, handler: Arc<dyn MessageHandler>) -> Router {
    let state = Arc::new(AppState { transport, handler });
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

pub async fn serve(addr: std::net::SocketAddr, transport: Arc<Transport>, handler: Arc<dyn MessageHandler>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "transport listening");
    axum::serve(listener, router(transport, handler)).await
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client = ClientId::new();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.transport.clients.insert(client, tx);
    tracing::info!(%client, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%client, error = %e, "websocket read error");
                break;
            }
        };
        match frame {
            Message::Text(text) => match Envelope::from_json(&text) {
                Ok(envelope) => state.handler.on_message(client, envelope, Arc::clone(&state.transport)).await,
                Err(e) => {
                    tracing::warn!(%client, error = %e, "dropping malformed frame");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.transport.clients.remove(client);
    writer.abort();
    state.handler.on_disconnect(client).await;
    tracing::info!(%client, "client disconnected");
}
