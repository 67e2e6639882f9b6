use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::ViewerIdentity;
use crate::error::SyncError;

/// Records which viewer identities have already cast a counted vote.
///
/// This is the authoritative double-vote check. The marker a viewer keeps
/// locally only disables its UI early and is never trusted on its own.
#[async_trait]
pub trait VoteGate: Send + Sync {
    async fn has_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<bool, SyncError>;

    /// Durable and idempotent.
    async fn mark_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<(), SyncError>;

    /// Withdraws a mark whose vote could not be counted.
    async fn unmark_voted(
        &self,
        poll_id: Uuid,
        viewer: &ViewerIdentity,
    ) -> Result<(), SyncError>;
}
