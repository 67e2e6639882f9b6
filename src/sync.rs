//! Synchronization service: the only place where ledger, gate and rooms meet.
//!
//! Every operation that changes or reads a poll for a room takes that poll's
//! ledger lock first. Broadcasts are queued while the lock is still held, so
//! each session sees one poll's snapshots in ledger order.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::models::{PollSummary, ViewerIdentity};
use crate::error::SyncError;
use crate::gate::VoteGate;
use crate::ledger::VoteLedger;
use crate::protocol::{ClientMessage, PollSnapshot, ServerMessage};
use crate::rooms::{RoomRegistry, SessionHandle, SessionId};

pub struct SyncService {
    ledger: VoteLedger,
    gate: Arc<dyn VoteGate>,
    rooms: RoomRegistry,
    /// Room each session is attached to. At most one per session.
    memberships: DashMap<SessionId, Uuid>,
}

impl SyncService {
    pub fn new(ledger: VoteLedger, gate: Arc<dyn VoteGate>) -> Self {
        SyncService {
            ledger,
            gate,
            rooms: RoomRegistry::new(),
            memberships: DashMap::new(),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Single entry point for a decoded client frame.
    pub async fn dispatch(&self, session: &SessionHandle, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinPoll(join) => {
                let _ = self.join(join.poll_id, session).await;
            }
            ClientMessage::CastVote(vote) => {
                let viewer = Self::viewer_identity(vote.viewer_token.as_deref(), session.id);
                let _ = self
                    .vote(vote.poll_id, vote.option_id, &viewer, session)
                    .await;
            }
            ClientMessage::LeavePoll => self.leave(session.id),
        }
    }

    /// Uses the viewer's durable token when it sent a usable one, otherwise
    /// the connection itself.
    pub fn viewer_identity(token: Option<&str>, session_id: SessionId) -> ViewerIdentity {
        token
            .and_then(ViewerIdentity::parse)
            .unwrap_or_else(|| ViewerIdentity::from(session_id.as_uuid()))
    }

    /// Attaches the session to the poll's room, leaving any previous room.
    /// The joiner alone receives either the snapshot or a `join_error`.
    pub async fn join(
        &self,
        poll_id: Uuid,
        session: &SessionHandle,
    ) -> Result<PollSnapshot, SyncError> {
        self.leave(session.id);

        let guard = match self.ledger.lock(poll_id).await {
            Ok(guard) => guard,
            Err(e) => {
                debug!(poll_id = %poll_id, session_id = %session.id, error = %e, "Join rejected");
                session.send(ServerMessage::JoinError(e.client_message()));
                return Err(e);
            }
        };

        let snapshot = guard.snapshot();
        if self.rooms.attach(poll_id, session, &snapshot) {
            self.memberships.insert(session.id, poll_id);
        }
        drop(guard);

        Ok(snapshot)
    }

    /// Validates and applies one vote. Rejections go to the voter only; on
    /// success the whole room, voter included, receives the new snapshot.
    pub async fn vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        viewer: &ViewerIdentity,
        session: &SessionHandle,
    ) -> Result<PollSnapshot, SyncError> {
        match self.apply_gated_vote(poll_id, option_id, viewer).await {
            Ok(snapshot) => {
                debug!(
                    poll_id = %poll_id,
                    option_id = %option_id,
                    total_votes = snapshot.total_votes(),
                    "Vote counted"
                );
                Ok(snapshot)
            }
            Err(e) => {
                debug!(poll_id = %poll_id, session_id = %session.id, error = %e, "Vote rejected");
                session.send(ServerMessage::VoteError(e.client_message()));
                Err(e)
            }
        }
    }

    /// The viewer is marked before the count moves, and the mark is withdrawn
    /// if the count cannot move. A failure can only lose a vote, never count
    /// one twice.
    async fn apply_gated_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        viewer: &ViewerIdentity,
    ) -> Result<PollSnapshot, SyncError> {
        let mut guard = self.ledger.lock(poll_id).await?;

        if self.gate.has_voted(poll_id, viewer).await? {
            return Err(SyncError::AlreadyVoted);
        }
        guard.check_vote(option_id)?;

        self.gate.mark_voted(poll_id, viewer).await?;

        let snapshot = match guard.apply_vote(option_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Err(undo) = self.gate.unmark_voted(poll_id, viewer).await {
                    error!(poll_id = %poll_id, error = %undo, "Vote not counted and viewer left marked");
                }
                return Err(e);
            }
        };

        self.rooms.broadcast(poll_id, &snapshot);
        drop(guard);

        Ok(snapshot)
    }

    /// Detaches the session from its room, if any. Safe to call repeatedly.
    pub fn leave(&self, session_id: SessionId) {
        if let Some((_, poll_id)) = self.memberships.remove(&session_id) {
            self.rooms.detach(poll_id, session_id);
            debug!(poll_id = %poll_id, session_id = %session_id, "Session left room");
        }
    }

    pub fn current_room(&self, session_id: SessionId) -> Option<Uuid> {
        self.memberships.get(&session_id).map(|entry| *entry.value())
    }

    pub async fn snapshot(&self, poll_id: Uuid) -> Result<PollSnapshot, SyncError> {
        self.ledger.get_snapshot(poll_id).await
    }

    pub async fn create_poll(
        &self,
        owner_token: &str,
        question: &str,
        options: &[String],
    ) -> Result<PollSnapshot, SyncError> {
        self.ledger.create_poll(owner_token, question, options).await
    }

    pub async fn polls_owned_by(&self, owner_token: &str) -> Result<Vec<PollSummary>, SyncError> {
        self.ledger.polls_owned_by(owner_token).await
    }

    /// Ends the poll and pushes the inactive snapshot to its room.
    pub async fn end_poll(&self, poll_id: Uuid) -> Result<PollSnapshot, SyncError> {
        let mut guard = self.ledger.lock(poll_id).await?;
        let snapshot = guard.end().await?;
        self.rooms.broadcast(poll_id, &snapshot);
        Ok(snapshot)
    }

    pub async fn end_poll_as_owner(
        &self,
        poll_id: Uuid,
        owner_token: &str,
    ) -> Result<PollSnapshot, SyncError> {
        let mut guard = self.ledger.lock(poll_id).await?;
        if guard.owner_token() != owner_token {
            return Err(SyncError::NotOwner);
        }
        let snapshot = guard.end().await?;
        self.rooms.broadcast(poll_id, &snapshot);
        info!(poll_id = %poll_id, "Poll ended by owner");
        Ok(snapshot)
    }
}
