//! Client-side state machine for one viewer tab.
//!
//! Pure logic: it consumes [`ServerMessage`]s and produces the
//! [`ClientMessage`]s to send, so it runs the same over a real socket or in
//! a test.

pub mod marker;

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{CastVote, ClientMessage, JoinPoll, PollSnapshot, ServerMessage};

pub use marker::{FileMarkerStore, MarkerError, MarkerStore, MemoryMarkerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Unattached,
    /// `join_poll` sent, no answer yet.
    Joining(Uuid),
    Attached(Uuid),
}

/// What the vote area should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    Loading,
    Open,
    AlreadyVoted,
    Ended,
}

#[derive(Error, Debug)]
pub enum VoteBlocked {
    #[error("not attached to this poll")]
    NotAttached,
    #[error("poll has ended")]
    PollEnded,
    #[error("already voted on this poll")]
    AlreadyVoted,
    #[error("option is not part of this poll")]
    UnknownOption,
    #[error(transparent)]
    Marker(#[from] MarkerError),
}

pub struct ViewerSession<M: MarkerStore> {
    markers: M,
    state: ViewerState,
    snapshot: Option<PollSnapshot>,
    has_voted: bool,
    last_error: Option<String>,
}

impl<M: MarkerStore> ViewerSession<M> {
    pub fn new(markers: M) -> Self {
        ViewerSession {
            markers,
            state: ViewerState::Unattached,
            snapshot: None,
            has_voted: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&PollSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn markers(&self) -> &M {
        &self.markers
    }

    fn current_poll(&self) -> Option<Uuid> {
        match self.state {
            ViewerState::Unattached => None,
            ViewerState::Joining(id) | ViewerState::Attached(id) => Some(id),
        }
    }

    /// Page load for `poll_id`. Reads the local marker before anything else
    /// so voting is gated without a round trip. Opening the poll that is
    /// already open sends nothing.
    pub fn open(&mut self, poll_id: Uuid) -> Option<ClientMessage> {
        if self.current_poll() == Some(poll_id) {
            return None;
        }

        self.has_voted = self.markers.has_voted(poll_id);
        self.snapshot = None;
        self.last_error = None;
        self.state = ViewerState::Joining(poll_id);
        Some(ClientMessage::JoinPoll(JoinPoll { poll_id }))
    }

    /// Navigation away from the poll page.
    pub fn close(&mut self) -> Option<ClientMessage> {
        let was_open = self.current_poll().is_some();
        self.state = ViewerState::Unattached;
        self.snapshot = None;
        was_open.then_some(ClientMessage::LeavePoll)
    }

    /// The transport dropped. The server has already detached us; the next
    /// connection must join again.
    pub fn disconnected(&mut self) -> Option<ClientMessage> {
        let poll_id = self.current_poll()?;
        self.state = ViewerState::Unattached;
        self.open(poll_id)
    }

    pub fn handle(&mut self, msg: ServerMessage) {
        let already_voted = msg.is_already_voted();
        match msg {
            ServerMessage::PollUpdate(snapshot) => {
                // Late frames from a room we already left are ignored.
                if self.current_poll() == Some(snapshot.poll_id) {
                    self.state = ViewerState::Attached(snapshot.poll_id);
                    self.snapshot = Some(snapshot);
                }
            }
            ServerMessage::VoteError(reason) => {
                if already_voted {
                    self.has_voted = true;
                }
                self.last_error = Some(reason);
            }
            ServerMessage::JoinError(reason) => {
                if let ViewerState::Joining(_) = self.state {
                    self.state = ViewerState::Unattached;
                }
                self.last_error = Some(reason);
            }
        }
    }

    pub fn status(&self) -> VoteStatus {
        match &self.snapshot {
            Some(snapshot) if !snapshot.is_active => VoteStatus::Ended,
            _ if self.has_voted => VoteStatus::AlreadyVoted,
            Some(_) => VoteStatus::Open,
            None => VoteStatus::Loading,
        }
    }

    pub fn can_vote(&self) -> bool {
        self.status() == VoteStatus::Open
    }

    /// Records the marker first, then returns the frame to send.
    pub fn cast_vote(&mut self, option_id: Uuid) -> Result<ClientMessage, VoteBlocked> {
        let snapshot = match (&self.state, &self.snapshot) {
            (ViewerState::Attached(_), Some(snapshot)) => snapshot,
            _ => return Err(VoteBlocked::NotAttached),
        };
        if !snapshot.is_active {
            return Err(VoteBlocked::PollEnded);
        }
        if self.has_voted {
            return Err(VoteBlocked::AlreadyVoted);
        }
        if snapshot.vote_count(option_id).is_none() {
            return Err(VoteBlocked::UnknownOption);
        }

        let poll_id = snapshot.poll_id;
        let token = self
            .markers
            .get(poll_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.markers.set(poll_id, &token)?;
        self.has_voted = true;

        Ok(ClientMessage::CastVote(CastVote {
            poll_id,
            option_id,
            viewer_token: Some(token),
        }))
    }
}
