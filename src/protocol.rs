//! Wire messages exchanged with viewers over the live connection.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Poll;

/// Complete, self-sufficient state of one poll as rendered by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub poll_id: Uuid,
    pub question: String,
    pub options: Vec<OptionSnapshot>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSnapshot {
    pub id: Uuid,
    pub text: String,
    pub vote_count: u64,
}

impl PollSnapshot {
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.vote_count).sum()
    }

    pub fn vote_count(&self, option_id: Uuid) -> Option<u64> {
        self.options
            .iter()
            .find(|o| o.id == option_id)
            .map(|o| o.vote_count)
    }
}

impl From<&Poll> for PollSnapshot {
    fn from(poll: &Poll) -> Self {
        PollSnapshot {
            poll_id: poll.id,
            question: poll.question.clone(),
            options: poll
                .options
                .iter()
                .map(|o| OptionSnapshot {
                    id: o.id,
                    text: o.text.clone(),
                    vote_count: o.vote_count,
                })
                .collect(),
            is_active: poll.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPoll {
    pub poll_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVote {
    pub poll_id: Uuid,
    pub option_id: Uuid,
    /// Durable per-browser-per-poll token. Absent for clients that keep no marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_token: Option<String>,
}

/// Client -> service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinPoll(JoinPoll),
    CastVote(CastVote),
    LeavePoll,
}

/// `vote_error` reason for a viewer that already voted. Clients key their
/// local "already voted" state off this exact string.
pub const ALREADY_VOTED_REASON: &str = "You have already voted on this poll";

/// Service -> client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    PollUpdate(PollSnapshot),
    VoteError(String),
    JoinError(String),
}

impl ClientMessage {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_already_voted(&self) -> bool {
        matches!(self, ServerMessage::VoteError(reason) if reason == ALREADY_VOTED_REASON)
    }

    /// SSE event name, identical to the WebSocket `event` tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::PollUpdate(_) => "poll_update",
            ServerMessage::VoteError(_) => "vote_error",
            ServerMessage::JoinError(_) => "join_error",
        }
    }
}
