//! Poll rooms: which live sessions are watching which poll.
//!
//! The registry never owns a connection. It keeps the session id and the
//! sending half of the session's outbound queue; the transport owns the rest.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::{PollSnapshot, ServerMessage};

/// Sending half of a session's outbound queue.
pub type SessionSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live viewer connection as seen by the synchronization layer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: SessionSender,
}

impl SessionHandle {
    /// Creates a handle plus the receiving half the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionHandle {
                id: SessionId::new(),
                tx,
            },
            rx,
        )
    }

    /// Fire-and-forget. Returns false once the transport is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, HashMap<SessionId, SessionSender>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the session and hands it the initial snapshot.
    ///
    /// Returns false when the session is already gone, in which case it is
    /// not left behind in the room.
    pub fn attach(&self, poll_id: Uuid, session: &SessionHandle, snapshot: &PollSnapshot) -> bool {
        self.rooms
            .entry(poll_id)
            .or_default()
            .insert(session.id, session.tx.clone());

        if session.send(ServerMessage::PollUpdate(snapshot.clone())) {
            debug!(poll_id = %poll_id, session_id = %session.id, "Session attached");
            true
        } else {
            self.detach(poll_id, session.id);
            false
        }
    }

    /// Returns whether the session was attached. Empty rooms are released.
    pub fn detach(&self, poll_id: Uuid, session_id: SessionId) -> bool {
        let mut removed = false;
        let mut emptied = false;
        if let Some(mut room) = self.rooms.get_mut(&poll_id) {
            removed = room.remove(&session_id).is_some();
            emptied = room.is_empty();
        }

        if emptied {
            self.rooms.remove_if(&poll_id, |_, room| room.is_empty());
            debug!(poll_id = %poll_id, "Room released");
        }
        removed
    }

    /// Pushes the snapshot to every session in the room and returns how many
    /// accepted it. Sessions whose queue is closed are detached.
    pub fn broadcast(&self, poll_id: Uuid, snapshot: &PollSnapshot) -> usize {
        let msg = ServerMessage::PollUpdate(snapshot.clone());
        let mut delivered = 0;
        let mut dead = Vec::new();

        if let Some(room) = self.rooms.get(&poll_id) {
            for (session_id, tx) in room.iter() {
                if tx.send(msg.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*session_id);
                }
            }
        }

        for session_id in dead {
            debug!(poll_id = %poll_id, session_id = %session_id, "Dropping unreachable session");
            self.detach(poll_id, session_id);
        }
        delivered
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn session_count(&self, poll_id: Uuid) -> usize {
        self.rooms.get(&poll_id).map(|room| room.len()).unwrap_or(0)
    }
}
