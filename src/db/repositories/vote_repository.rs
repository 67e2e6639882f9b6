use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::ViewerIdentity;
use crate::db::repositories::PgStore;
use crate::error::SyncError;
use crate::gate::VoteGate;

#[async_trait]
impl VoteGate for PgStore {
    async fn has_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<bool, SyncError> {
        let row = sqlx::query("SELECT 1 FROM viewer_votes WHERE poll_id = $1 AND viewer_token = $2")
            .bind(poll_id)
            .bind(viewer.as_str())
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }

    async fn mark_voted(&self, poll_id: Uuid, viewer: &ViewerIdentity) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO viewer_votes (poll_id, viewer_token) VALUES ($1, $2) ON CONFLICT (poll_id, viewer_token) DO NOTHING",
        )
        .bind(poll_id)
        .bind(viewer.as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn unmark_voted(
        &self,
        poll_id: Uuid,
        viewer: &ViewerIdentity,
    ) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM viewer_votes WHERE poll_id = $1 AND viewer_token = $2")
            .bind(poll_id)
            .bind(viewer.as_str())
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
