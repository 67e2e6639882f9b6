//! Authoritative per-poll state.
//!
//! Polls are cached in memory behind one mutex each and written through to a
//! [`PollStore`] before the cached copy changes. Votes on the same poll are
//! serialized by that mutex; different polls never contend.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::models::{Poll, PollSummary};
use crate::error::SyncError;
use crate::protocol::PollSnapshot;

/// Persistence backend behind the ledger.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), SyncError>;

    async fn load_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, SyncError>;

    async fn polls_owned_by(&self, owner_token: &str) -> Result<Vec<PollSummary>, SyncError>;

    /// Must be a single atomic increment in the backend.
    async fn increment_vote(&self, poll_id: Uuid, option_id: Uuid) -> Result<(), SyncError>;

    async fn close_poll(&self, poll_id: Uuid) -> Result<(), SyncError>;
}

pub struct VoteLedger {
    store: Arc<dyn PollStore>,
    polls: DashMap<Uuid, Arc<Mutex<Poll>>>,
}

/// Exclusive access to one poll. Held for the whole check-apply-broadcast
/// sequence of a vote so that nothing interleaves on the same poll.
pub struct PollGuard {
    store: Arc<dyn PollStore>,
    poll: OwnedMutexGuard<Poll>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        VoteLedger {
            store,
            polls: DashMap::new(),
        }
    }

    pub async fn create_poll(
        &self,
        owner_token: &str,
        question: &str,
        options: &[String],
    ) -> Result<PollSnapshot, SyncError> {
        if question.trim().is_empty() {
            return Err(SyncError::InvalidPoll("question must not be empty"));
        }
        if options.len() < 2 {
            return Err(SyncError::InvalidPoll("a poll needs at least two options"));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(SyncError::InvalidPoll("options must not be empty"));
        }

        let poll = Poll::new(owner_token, question, options);
        self.store.insert_poll(&poll).await?;

        let snapshot = PollSnapshot::from(&poll);
        self.polls.insert(poll.id, Arc::new(Mutex::new(poll)));

        info!(poll_id = %snapshot.poll_id, options = snapshot.options.len(), "Poll created");
        Ok(snapshot)
    }

    /// Locks the poll, loading it from the store on first use.
    pub async fn lock(&self, poll_id: Uuid) -> Result<PollGuard, SyncError> {
        let cell = self.cell(poll_id).await?;
        Ok(PollGuard {
            store: self.store.clone(),
            poll: cell.lock_owned().await,
        })
    }

    pub async fn get_snapshot(&self, poll_id: Uuid) -> Result<PollSnapshot, SyncError> {
        Ok(self.lock(poll_id).await?.snapshot())
    }

    pub async fn apply_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
    ) -> Result<PollSnapshot, SyncError> {
        self.lock(poll_id).await?.apply_vote(option_id).await
    }

    pub async fn end_poll(&self, poll_id: Uuid) -> Result<PollSnapshot, SyncError> {
        self.lock(poll_id).await?.end().await
    }

    pub async fn polls_owned_by(&self, owner_token: &str) -> Result<Vec<PollSummary>, SyncError> {
        self.store.polls_owned_by(owner_token).await
    }

    async fn cell(&self, poll_id: Uuid) -> Result<Arc<Mutex<Poll>>, SyncError> {
        if let Some(cell) = self.polls.get(&poll_id) {
            return Ok(cell.clone());
        }

        let poll = self
            .store
            .load_poll(poll_id)
            .await?
            .ok_or(SyncError::NotFound)?;
        debug!(poll_id = %poll_id, "Poll loaded into ledger");

        // A concurrent loader may have won; keep whichever cell landed first.
        Ok(self
            .polls
            .entry(poll_id)
            .or_insert_with(|| Arc::new(Mutex::new(poll)))
            .clone())
    }
}

impl PollGuard {
    pub fn poll_id(&self) -> Uuid {
        self.poll.id
    }

    pub fn owner_token(&self) -> &str {
        &self.poll.owner_token
    }

    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot::from(&*self.poll)
    }

    /// Whether `apply_vote` would accept this option right now. Returns the
    /// option's index.
    pub fn check_vote(&self, option_id: Uuid) -> Result<usize, SyncError> {
        if !self.poll.is_active {
            return Err(SyncError::PollEnded);
        }
        self.poll
            .options
            .iter()
            .position(|o| o.id == option_id)
            .ok_or(SyncError::OptionNotFound)
    }

    pub async fn apply_vote(&mut self, option_id: Uuid) -> Result<PollSnapshot, SyncError> {
        let index = self.check_vote(option_id)?;

        self.store.increment_vote(self.poll.id, option_id).await?;
        self.poll.options[index].vote_count += 1;

        Ok(self.snapshot())
    }

    /// Ending an ended poll is a no-op returning the current snapshot.
    pub async fn end(&mut self) -> Result<PollSnapshot, SyncError> {
        if self.poll.is_active {
            self.store.close_poll(self.poll.id).await?;
            self.poll.is_active = false;
            info!(poll_id = %self.poll.id, total_votes = self.poll.total_votes(), "Poll ended");
        }
        Ok(self.snapshot())
    }
}
