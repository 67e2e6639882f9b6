//! Boundary with the authoring side: create, list own, end, fetch.
//!
//! The owner is whoever holds the session's opaque owner token. Account
//! handling lives elsewhere; this surface only needs a stable token.

use crate::db::models::PollSummary;
use crate::error::PollError;
use crate::protocol::PollSnapshot;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;
use uuid::Uuid;

const OWNER_TOKEN_KEY: &str = "owner_token";

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollResponse {
    pub poll_id: Uuid,
    pub poll: PollSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndPollResponse {
    pub success: bool,
    pub poll: PollSnapshot,
}

async fn owner_token_from_session(session: &Session) -> Result<String, PollError> {
    session
        .get::<String>(OWNER_TOKEN_KEY)
        .await?
        .ok_or(PollError::Unauthorized)
}

/// Returns the session's owner token, minting one on first use.
async fn ensure_owner_token(session: &Session) -> Result<String, PollError> {
    if let Some(token) = session.get::<String>(OWNER_TOKEN_KEY).await? {
        return Ok(token);
    }
    let token = Uuid::new_v4().to_string();
    session.insert(OWNER_TOKEN_KEY, &token).await?;
    Ok(token)
}

pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let owner_token = ensure_owner_token(&session).await?;

    let poll = app_state
        .sync
        .create_poll(&owner_token, &payload.question, &payload.options)
        .await?;

    info!(poll_id = %poll.poll_id, "Poll created via API");
    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse {
            poll_id: poll.poll_id,
            poll,
        }),
    ))
}

pub async fn my_polls(
    Extension(app_state): Extension<AppState>,
    session: Session,
) -> Result<Json<Vec<PollSummary>>, PollError> {
    let owner_token = owner_token_from_session(&session).await?;
    let polls = app_state.sync.polls_owned_by(&owner_token).await?;
    Ok(Json(polls))
}

pub async fn end_poll(
    Extension(app_state): Extension<AppState>,
    session: Session,
    Path(poll_id): Path<Uuid>,
) -> Result<Json<EndPollResponse>, PollError> {
    let owner_token = owner_token_from_session(&session).await?;
    let poll = app_state
        .sync
        .end_poll_as_owner(poll_id, &owner_token)
        .await?;

    Ok(Json(EndPollResponse {
        success: true,
        poll,
    }))
}

pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<Json<PollSnapshot>, PollError> {
    Ok(Json(app_state.sync.snapshot(poll_id).await?))
}
