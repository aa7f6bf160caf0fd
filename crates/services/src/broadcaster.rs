//! Fans translated/audio messages out to every client subscribed to a
//! session, filtered by the client's preferred language. Each client has its
//! own bounded outbound queue so one slow reader can't back up delivery to
//! everyone else; past the soft limit a broadcast is simply skipped for that
//! client rather than enqueued, past the hard limit the client is
//! disconnected outright.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub payload: String,
}

/// Result of a single [`Broadcaster::publish`] call.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    /// Socket ids force-disconnected because their queue hit the hard limit.
    pub overflowing: Vec<String>,
    /// Count of recipients silently skipped for this event (soft limit).
    pub dropped: usize,
}

struct Subscriber {
    language: String,
    sender: mpsc::Sender<OutboundMessage>,
    /// Fired to tell the owning connection's select loop to close the socket
    /// outright once its outbound queue has hit the hard limit.
    kill: mpsc::Sender<()>,
}

/// A single session's fan-out table: socket id -> subscriber.
#[derive(Default)]
struct SessionChannel {
    subscribers: HashMap<String, Subscriber>,
}

pub struct Broadcaster {
    sessions: RwLock<HashMap<String, SessionChannel>>,
    soft_limit: usize,
    hard_limit: usize,
}

impl Broadcaster {
    pub fn new(soft_limit: usize, hard_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            soft_limit,
            hard_limit,
        }
    }

    pub async fn subscribe(
        &self,
        session_id: &str,
        socket_id: &str,
        language: &str,
    ) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(self.hard_limit.max(1));
        let (kill, _kill_rx) = mpsc::channel(1);
        self.register(session_id, socket_id, language, tx, kill).await;
        rx
    }

    /// Like [`subscribe`](Self::subscribe), but attaches an already-created
    /// sender instead of allocating a new channel. Lets a connection keep a
    /// single outbound queue across however many sessions it joins over its
    /// lifetime (a client only ever belongs to one at a time; an admin
    /// socket may create several). `kill` is the connection's shared
    /// force-disconnect channel; cloning the same sender into every
    /// registration for a socket means any one of them hitting the hard
    /// limit can close the connection regardless of which session triggered it.
    pub async fn register(
        &self,
        session_id: &str,
        socket_id: &str,
        language: &str,
        sender: mpsc::Sender<OutboundMessage>,
        kill: mpsc::Sender<()>,
    ) {
        let mut sessions = self.sessions.write().await;
        let channel = sessions.entry(session_id.to_string()).or_default();
        channel.subscribers.insert(
            socket_id.to_string(),
            Subscriber {
                language: language.to_string(),
                sender,
                kill,
            },
        );
    }

    pub async fn unsubscribe(&self, session_id: &str, socket_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(channel) = sessions.get_mut(session_id) {
            channel.subscribers.remove(socket_id);
            if channel.subscribers.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    pub async fn update_language(&self, session_id: &str, socket_id: &str, language: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(channel) = sessions.get_mut(session_id) {
            if let Some(sub) = channel.subscribers.get_mut(socket_id) {
                sub.language = language.to_string();
            }
        }
    }

    /// Delivers `message` to every subscriber of `session_id` whose
    /// preferred language is `language`. Past the soft limit a recipient's
    /// queue is left alone and this event is simply skipped for them
    /// (`dropped` counts these); once a queue is completely full the
    /// recipient is force-disconnected via its `kill` channel and its
    /// socket id is included in `overflowing` so the caller can drop its
    /// broadcast-group membership too.
    pub async fn publish(&self, session_id: &str, language: &str, message: OutboundMessage) -> PublishOutcome {
        let sessions = self.sessions.read().await;
        let Some(channel) = sessions.get(session_id) else {
            return PublishOutcome::default();
        };

        let mut overflowing = Vec::new();
        let mut dropped = 0usize;
        for (socket_id, sub) in &channel.subscribers {
            if sub.language != language {
                continue;
            }
            let max_capacity = sub.sender.max_capacity();
            let queued = max_capacity.saturating_sub(sub.sender.capacity());
            if max_capacity > 0 && queued >= self.soft_limit {
                dropped += 1;
                tracing::debug!(session_id, socket_id, queued, "outbound queue past soft limit, skipping broadcast for slow client");
                continue;
            }
            match sub.sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    overflowing.push(socket_id.clone());
                    let _ = sub.kill.try_send(());
                    tracing::warn!(session_id, socket_id, "outbound queue at hard limit, disconnecting slow client");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    overflowing.push(socket_id.clone());
                }
            }
        }
        PublishOutcome { overflowing, dropped }
    }

    pub fn hard_limit(&self) -> usize {
        self.hard_limit
    }
}
