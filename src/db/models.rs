use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub owner_token: String,
    pub question: String,
    /// Display order.
    pub options: Vec<PollOption>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: Uuid,
    pub text: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub poll_id: Uuid,
    pub question: String,
    pub is_active: bool,
    pub total_votes: u64,
    pub created_at: DateTime<Utc>,
}

/// Opaque per-browser-per-poll token used only to prevent double voting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerIdentity(String);

impl ViewerIdentity {
    pub const MAX_LEN: usize = 128;

    /// Accepts a client-supplied token; rejects empty or oversized ones.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || token.len() > Self::MAX_LEN {
            return None;
        }
        Some(ViewerIdentity(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for ViewerIdentity {
    fn from(id: Uuid) -> Self {
        ViewerIdentity(id.to_string())
    }
}

impl Poll {
    /// Builds a fresh active poll. Option text is trimmed.
    pub fn new(owner_token: &str, question: &str, options: &[String]) -> Self {
        Poll {
            id: Uuid::new_v4(),
            owner_token: owner_token.to_string(),
            question: question.trim().to_string(),
            options: options
                .iter()
                .map(|text| PollOption {
                    id: Uuid::new_v4(),
                    text: text.trim().to_string(),
                    vote_count: 0,
                })
                .collect(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.vote_count).sum()
    }

    pub fn summary(&self) -> PollSummary {
        PollSummary {
            poll_id: self.id,
            question: self.question.clone(),
            is_active: self.is_active,
            total_votes: self.total_votes(),
            created_at: self.created_at,
        }
    }
}
