//! Room registry and broadcast fan-out.
//!
//! One registry instance is shared by every connection task. Membership is
//! the only shared mutable state in the crate; all of it lives behind a
//! single mutex, and every public method releases that mutex before anything
//! touches a socket. Deliveries go through each peer's bounded outbound
//! queue with `try_send`, so a slow or dead recipient never blocks a join,
//! a leave, or delivery to anyone else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

pub type ClientId = String;

/// One live connection, as the registry sees it: the server-assigned
/// ephemeral id, the caller-supplied user id, and the outbound queue.
#[derive(Clone)]
pub struct Peer {
    pub client_id: ClientId,
    pub user_id: String,
    tx: mpsc::Sender<String>,
}

impl Peer {
    /// Ephemeral ids must be unguessable, so they come from the OS CSPRNG
    /// (UUIDv4), never from a counter.
    pub fn new(user_id: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            tx,
        }
    }

    fn try_deliver(&self, payload: &str) -> bool {
        self.tx.try_send(payload.to_owned()).is_ok()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Cloneable handle to the room → peers map. Rooms are created on first
/// join and pruned as soon as the last member leaves.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<String, HashMap<ClientId, Peer>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `peer` to the room, creating the room if needed. Returns the
    /// roster as it was immediately before the insert, taken under the same
    /// lock: the caller can announce the join to exactly those members and
    /// hand the newcomer exactly that roster, with no window for a
    /// concurrent join to appear in both or neither.
    pub fn join(&self, room_id: &str, peer: Peer) -> Vec<Peer> {
        let mut rooms = self.rooms.lock().expect("registry mutex poisoned");
        let room = rooms.entry(room_id.to_owned()).or_default();
        let prior: Vec<Peer> = room.values().cloned().collect();
        room.insert(peer.client_id.clone(), peer);
        prior
    }

    /// Removes the connection from the room. Empty rooms are dropped here so
    /// long-running processes do not accumulate dead entries.
    pub fn leave(&self, room_id: &str, client_id: &str) -> Option<Peer> {
        let mut rooms = self.rooms.lock().expect("registry mutex poisoned");
        let room = rooms.get_mut(room_id)?;
        let peer = room.remove(client_id);
        if room.is_empty() {
            rooms.remove(room_id);
        }
        peer
    }

    /// Point-in-time copy of the room's members, in no particular order.
    pub fn members(&self, room_id: &str) -> Vec<Peer> {
        let rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms
            .get(room_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn peer(&self, room_id: &str, client_id: &str) -> Option<Peer> {
        let rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms.get(room_id)?.get(client_id).cloned()
    }

    /// Number of rooms currently held. Exposed for the health/stats surface.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().expect("registry mutex poisoned").len()
    }

    /// Delivers `payload` to every member of the room except `exclude`.
    /// A recipient whose queue is closed or full is counted as failed and
    /// removed from the room; its own read loop will finish the teardown
    /// when the transport closes. Failures are never surfaced to the caller
    /// beyond the report.
    pub fn broadcast(&self, room_id: &str, payload: &str, exclude: Option<&str>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut dead: Vec<ClientId> = Vec::new();

        for peer in self.members(room_id) {
            if Some(peer.client_id.as_str()) == exclude {
                continue;
            }
            if peer.try_deliver(payload) {
                report.delivered += 1;
            } else {
                report.failed += 1;
                dead.push(peer.client_id);
            }
        }

        for client_id in dead {
            tracing::debug!(room_id, %client_id, "pruning unreachable peer");
            self.leave(room_id, &client_id);
        }

        report
    }

    /// Delivers `payload` to the single member with the given ephemeral id.
    /// Returns false if no such member exists or its queue is gone; a dead
    /// target is pruned, an unknown one is simply reported.
    pub fn send_to(&self, room_id: &str, client_id: &str, payload: &str) -> bool {
        let Some(peer) = self.peer(room_id, client_id) else {
            return false;
        };
        if peer.try_deliver(payload) {
            true
        } else {
            tracing::debug!(room_id, %client_id, "pruning unreachable peer");
            self.leave(room_id, client_id);
            false
        }
    }
}
