//! In-process backend used when no database is configured, and in tests.
//! State lives only as long as the process.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::db::models::{Poll, PollSummary, ViewerIdentity};
use crate::error::SyncError;
use crate::gate::VoteGate;
use crate::ledger::PollStore;

#[derive(Default)]
pub struct MemoryDb {
    polls: DashMap<Uuid, Poll>,
    votes: DashSet<(Uuid, ViewerIdentity)>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryDb {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), SyncError> {
        self.polls.insert(poll.id, poll.clone());
        Ok(())
    }

    async fn load_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, SyncError> {
        Ok(self.polls.get(&poll_id).map(|p| p.value().clone()))
    }

    async fn polls_owned_by(&self, owner_token: &str) -> Result<Vec<PollSummary>, SyncError> {
        let mut summaries: Vec<PollSummary> = self
            .polls
            .iter()
            .filter(|p| p.owner_token == owner_token)
            .map(|p| p.summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn increment_vote(&self, poll_id: Uuid, option_id: Uuid) -> Result<(), SyncError> {
        let mut poll = self.polls.get_mut(&poll_id).ok_or(SyncError::NotFound)?;
        let option = poll
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
            .ok_or(SyncError::OptionNotFound)?;
        option.vote_count += 1;
        Ok(())
    }

    async fn close_poll(&self, poll_id: Uuid) -> Result<(), SyncError> {
        let mut poll = self.polls.get_mut(&poll_id).ok_or(SyncError::NotFound)?;
        poll.is_active = false;
        Ok(())
    }
}

#[async_trait]
impl VoteGate for MemoryDb {
    async fn has_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<bool, SyncError> {
        Ok(self.votes.contains(&(poll_id, viewer.clone())))
    }

    async fn mark_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<(), SyncError> {
        self.votes.insert((poll_id, viewer.clone()));
        Ok(())
    }

    async fn unmark_voted(
        &self,
        poll_id: Uuid,
        viewer: &ViewerIdentity,
    ) -> Result<(), SyncError> {
        self.votes.remove(&(poll_id, viewer.clone()));
        Ok(())
    }
}
