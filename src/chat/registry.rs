use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::ServerEvent;

/// Transient identifier for one live socket. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle the registry keeps per connection: the sending half of the queue a
/// writer task drains into the socket.
pub type Outbox = UnboundedSender<String>;

/// Which live connections are bound to which booking. Bindings are created on
/// a successful join and removed only by the socket close path; registry state
/// starts empty on every process start.
#[derive(Clone, Default)]
pub struct ChatRegistry {
    rooms: Arc<Mutex<HashMap<i64, HashMap<ConnectionId, Outbox>>>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, booking_id: i64, conn: ConnectionId, outbox: Outbox) {
        let mut rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms.entry(booking_id).or_default().insert(conn, outbox);
        debug!(booking_id, conn = %conn, "connection registered");
    }

    /// Remove every binding for a connection, dropping rooms that empty out.
    pub fn unregister(&self, conn: ConnectionId) {
        let mut rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms.retain(|booking_id, members| {
            if members.remove(&conn).is_some() {
                debug!(booking_id, conn = %conn, "connection unregistered");
            }
            !members.is_empty()
        });
    }

    /// Snapshot of the outboxes currently bound to a booking.
    pub fn connections_for(&self, booking_id: i64) -> Vec<Outbox> {
        let rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms
            .get(&booking_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_size(&self, booking_id: i64) -> usize {
        let rooms = self.rooms.lock().expect("registry mutex poisoned");
        rooms.get(&booking_id).map_or(0, HashMap::len)
    }

    /// Best-effort fan-out of one event to a booking's room. The event is
    /// serialized once; connections whose receiving half is already gone are
    /// skipped without touching the registry (cleanup belongs to the close
    /// path alone).
    pub fn broadcast(&self, booking_id: i64, event: &ServerEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(booking_id, error = %err, "failed to serialize event");
                return;
            }
        };

        let targets = self.connections_for(booking_id);
        let mut delivered = 0usize;
        for outbox in &targets {
            if outbox.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            booking_id,
            delivered,
            skipped = targets.len() - delivered,
            "broadcast event"
        );
    }
}
