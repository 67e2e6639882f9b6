use async_trait::async_trait;
use sqlx::Row;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::connection::DbPool;
use crate::db::models::{Poll, PollOption, PollSummary};
use crate::error::SyncError;
use crate::ledger::PollStore;

/// Postgres-backed poll and vote-gate storage.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn count_from_db(votes: i64) -> u64 {
    u64::try_from(votes).unwrap_or(0)
}

#[async_trait]
impl PollStore for PgStore {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO polls (id, owner_token, question, is_active, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(poll.id)
        .bind(&poll.owner_token)
        .bind(&poll.question)
        .bind(poll.is_active)
        .bind(poll.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, option) in poll.options.iter().enumerate() {
            sqlx::query(
                "INSERT INTO poll_options (id, poll_id, position, option_text, votes) VALUES ($1, $2, $3, $4, 0)",
            )
            .bind(option.id)
            .bind(poll.id)
            .bind(position as i32)
            .bind(&option.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, SyncError> {
        let Some(row) = sqlx::query(
            "SELECT id, owner_token, question, is_active, created_at FROM polls WHERE id = $1",
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let options = sqlx::query(
            "SELECT id, option_text, votes FROM poll_options WHERE poll_id = $1 ORDER BY position",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| PollOption {
            id: r.get("id"),
            text: r.get("option_text"),
            vote_count: count_from_db(r.get("votes")),
        })
        .collect();

        Ok(Some(Poll {
            id: row.get("id"),
            owner_token: row.get("owner_token"),
            question: row.get("question"),
            options,
            is_active: row.get("is_active"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }))
    }

    async fn polls_owned_by(&self, owner_token: &str) -> Result<Vec<PollSummary>, SyncError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.question, p.is_active, p.created_at,
                   COALESCE(SUM(o.votes), 0)::BIGINT AS total_votes
            FROM polls p
            LEFT JOIN poll_options o ON o.poll_id = p.id
            WHERE p.owner_token = $1
            GROUP BY p.id
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(owner_token)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PollSummary {
                poll_id: r.get("id"),
                question: r.get("question"),
                is_active: r.get("is_active"),
                total_votes: count_from_db(r.get("total_votes")),
                created_at: r.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }

    async fn increment_vote(&self, poll_id: Uuid, option_id: Uuid) -> Result<(), SyncError> {
        let result =
            sqlx::query("UPDATE poll_options SET votes = votes + 1 WHERE id = $1 AND poll_id = $2")
                .bind(option_id)
                .bind(poll_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::OptionNotFound);
        }
        Ok(())
    }

    async fn close_poll(&self, poll_id: Uuid) -> Result<(), SyncError> {
        let result = sqlx::query("UPDATE polls SET is_active = FALSE WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound);
        }
        Ok(())
    }
}
