//! Live push channel.
//!
//! Sockets register here per user; the fan-out consumer forwards freshly
//! persisted notifications to whatever sessions this instance holds. The
//! channel is best-effort: a user without an open socket still finds the
//! notification through the REST backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use shared::auth::identity_from_headers;
use shared::events::NotificationPush;
use shared::ServiceError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::AppState;

type Sender = mpsc::UnboundedSender<String>;

#[derive(Default)]
pub struct LiveSessions {
    sessions: DashMap<i64, Vec<(u64, Sender)>>,
    next_id: AtomicU64,
}

impl LiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: i64) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .entry(user_id)
            .or_default()
            .push((session_id, tx));
        (session_id, rx)
    }

    pub fn deregister(&self, user_id: i64, session_id: u64) {
        if let Some(mut entry) = self.sessions.get_mut(&user_id) {
            entry.retain(|(id, _)| *id != session_id);
            drop(entry);
        }
        self.sessions.remove_if(&user_id, |_, senders| senders.is_empty());
    }

    /// Sends to every open session of the user, pruning any that have
    /// gone away. Returns how many sessions took the message.
    pub fn push_to_user(&self, user_id: i64, message: &str) -> usize {
        let mut delivered = 0;
        if let Some(mut entry) = self.sessions.get_mut(&user_id) {
            entry.retain(|(_, tx)| match tx.send(message.to_string()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            });
        }
        delivered
    }

    pub fn session_count(&self, user_id: i64) -> usize {
        self.sessions.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }
}

/// Handshake for `/ws`. The gateway forwards the caller's identity and
/// proves itself with the internal secret; unauthenticated sockets never
/// reach the registry.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ServiceError> {
    if !state.secret.verify(&headers) {
        warn!("push handshake without a valid internal secret");
        return Err(ServiceError::Forbidden);
    }
    let identity = identity_from_headers(&headers).ok_or(ServiceError::Unauthenticated)?;

    let sessions = state.sessions.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, sessions, identity.user_id)))
}

async fn handle_socket(socket: WebSocket, sessions: Arc<LiveSessions>, user_id: i64) {
    let (session_id, mut rx) = sessions.register(user_id);
    info!(user_id, session_id, "push session opened");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                // Clients only listen on this socket.
                Some(Ok(_)) => {}
            },
        }
    }

    sessions.deregister(user_id, session_id);
    info!(user_id, session_id, "push session closed");
}

/// Forwards persisted-notification events to this instance's sockets.
/// Every instance subscribes under its own consumer group and filters by
/// the sessions it actually holds.
pub struct PushFanout {
    sessions: Arc<LiveSessions>,
}

impl PushFanout {
    pub fn new(sessions: Arc<LiveSessions>) -> Self {
        Self { sessions }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(Ok(payload)) = m.payload_view::<str>() {
                        self.handle_payload(payload);
                    }
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("Error committing push event: {}", e);
                    }
                }
                Err(e) => error!("Error receiving push event: {}", e),
            }
        }
    }

    fn handle_payload(&self, payload: &str) {
        match serde_json::from_str::<NotificationPush>(payload) {
            Ok(push) => {
                let delivered = self.sessions.push_to_user(push.user_id, payload);
                debug!(
                    user_id = push.user_id,
                    notification_id = push.notification_id,
                    delivered,
                    "fanned out push notification"
                );
            }
            Err(e) => warn!("Skipping malformed push event: {}", e),
        }
    }
}
