//! Per-session connection registry and broadcast fan-out.

use axum::extract::ws::Message;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
/// Handle used to push messages to one connected client.
///
/// The sender feeds a dedicated writer task owned by the socket handler, so
/// pushing here never blocks. A closed channel means the peer is gone.
pub struct ConnectionHandle {
    /// Distinguishes this socket from a replacement after a reconnect.
    pub id: Uuid,
    /// Outbound channel into the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Wrap an outbound channel with a fresh connection identity.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Push a pre-serialized payload; `false` means the peer is dead.
    pub fn send_text(&self, payload: &str) -> bool {
        self.tx.send(Message::Text(payload.into())).is_ok()
    }
}

/// Live connections for one session, keyed by participant identity.
///
/// A participant keeps their slot after disconnecting; only the handle is
/// cleared. Insertion order is join order and is preserved.
#[derive(Debug, Default)]
pub struct Roster {
    slots: IndexMap<String, Option<ConnectionHandle>>,
}

impl Roster {
    /// Register or replace a participant's connection, creating the slot on first join.
    pub fn register(&mut self, key: &str, conn: ConnectionHandle) {
        self.slots.insert(key.to_string(), Some(conn));
    }

    /// Clear a participant's connection if it still matches `conn_id`.
    ///
    /// The id guard keeps a stale read loop, finishing after a reconnect, from
    /// clobbering the replacement handle. Returns whether a handle was cleared.
    pub fn unregister(&mut self, key: &str, conn_id: Uuid) -> bool {
        if let Some(slot) = self.slots.get_mut(key) {
            if slot.as_ref().is_some_and(|conn| conn.id == conn_id) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Drop a participant's slot entirely, connection included.
    pub fn remove(&mut self, key: &str) {
        self.slots.shift_remove(key);
    }

    /// Whether this participant has a slot (connected or not).
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of participant slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no participant has a slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live connections.
    pub fn live_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.is_some()).count()
    }

    /// Participant identities in join order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Deliver one event to a single participant's live connection.
    ///
    /// Same pruning contract as [`Roster::broadcast`]; a no-op for unknown
    /// or disconnected participants.
    pub fn send_to<T: Serialize>(&mut self, key: &str, event: &T) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize direct event");
                return;
            }
        };

        if let Some(slot) = self.slots.get_mut(key) {
            if let Some(conn) = slot {
                if !conn.send_text(&payload) {
                    warn!(participant = %key, "dropping dead connection during send");
                    *slot = None;
                }
            }
        }
    }

    /// Deliver one event to every live connection, pruning dead ones.
    ///
    /// The event is serialized once. Fire-and-forget: a failed send silently
    /// clears that connection and never surfaces to the caller, so one dead
    /// peer cannot affect the other's experience.
    pub fn broadcast<T: Serialize>(&mut self, event: &T) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast event");
                return;
            }
        };

        for (key, slot) in self.slots.iter_mut() {
            if let Some(conn) = slot {
                if !conn.send_text(&payload) {
                    warn!(participant = %key, "dropping dead connection during broadcast");
                    *slot = None;
                }
            }
        }
    }
}
