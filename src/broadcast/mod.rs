//! Real-time broadcast transport for text updates.
//!
//! The channel is transport-only: every published message carries the sender's
//! [`SessionId`], and receivers get every message including their own echoes.
//! Filtering self-originated messages is the composition root's job, keeping
//! the transport free of policy.
//!
//! Publishing is fire-and-forget and best-effort: a transport failure is
//! logged and swallowed, never surfaced to the caller, since realtime sync is
//! an enhancement rather than a core guarantee.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::buffer::SourceBundle;

/// Name of the broadcast channel shared by all playground sessions
pub const CHANNEL_NAME: &str = "editor";

/// Event name for full-bundle text updates
pub const TEXT_UPDATE_EVENT: &str = "text-update";

/// Buffered messages per subscriber before lagging
const CHANNEL_CAPACITY: usize = 1024;

/// Ephemeral identity for one editing session.
///
/// Generated once per engine, immutable, and used solely to distinguish
/// self-originated broadcast events from others'.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A full-bundle snapshot published on every local edit.
///
/// Receivers treat each message as a complete snapshot, not a diff, so
/// out-of-order delivery can at worst regress to a stale snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    /// Sender session identifier
    pub id: SessionId,
    pub html: String,
    pub css: String,
    pub js: String,
}

impl TextUpdate {
    /// Snapshot the bundle under the given sender session
    pub fn new(session: &SessionId, bundle: &SourceBundle) -> Self {
        Self {
            id: session.clone(),
            html: bundle.markup.clone(),
            css: bundle.style.clone(),
            js: bundle.script.clone(),
        }
    }

    /// Convert the payload back into a bundle
    pub fn into_bundle(self) -> SourceBundle {
        SourceBundle {
            markup: self.html,
            style: self.css,
            script: self.js,
        }
    }
}

/// Thin contract over a pub/sub transport for text updates. Owns no buffers.
pub trait BroadcastChannel: Send + Sync {
    /// Publish an update, best-effort. Never fails to the caller.
    fn publish(&self, update: TextUpdate);

    /// Subscribe to all updates on the channel, own echoes included
    fn subscribe(&self) -> BroadcastReceiver;
}

/// Receiving half of a broadcast subscription
pub struct BroadcastReceiver {
    inner: broadcast::Receiver<TextUpdate>,
}

impl BroadcastReceiver {
    /// Await the next update; `None` once the channel is closed.
    ///
    /// Lagged messages are skipped: each update is a full snapshot, so only
    /// the most recent ones matter.
    pub async fn recv(&mut self) -> Option<TextUpdate> {
        loop {
            match self.inner.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "broadcast receiver lagged, skipping to latest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process broadcast transport backed by a tokio broadcast channel.
///
/// Every engine sharing a `LocalBroadcast` sees every published update, which
/// mirrors the shared `editor` channel of the hosted transport.
#[derive(Clone)]
pub struct LocalBroadcast {
    tx: broadcast::Sender<TextUpdate>,
}

impl LocalBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Default for LocalBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for LocalBroadcast {
    fn publish(&self, update: TextUpdate) {
        // A send error only means there are no subscribers right now.
        if self.tx.send(update).is_err() {
            debug!(channel = CHANNEL_NAME, "no subscribers for text update");
        }
    }

    fn subscribe(&self) -> BroadcastReceiver {
        BroadcastReceiver {
            inner: self.tx.subscribe(),
        }
    }
}
