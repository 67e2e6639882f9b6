//! Read-only live feed over server-sent events.
//!
//! An SSE client is a room session like any WebSocket viewer; it just never
//! sends frames. When the client goes away the stream is dropped, which
//! detaches the session.

use crate::protocol::ServerMessage;
use crate::rooms::{SessionHandle, SessionId};
use crate::startup::AppState;
use crate::sync::SyncService;
use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// Leaves the room when the SSE stream is dropped.
struct LeaveOnDrop {
    sync: Arc<SyncService>,
    session_id: SessionId,
}

impl Drop for LeaveOnDrop {
    fn drop(&mut self) {
        self.sync.leave(self.session_id);
        debug!(session_id = %self.session_id, "SSE viewer disconnected");
    }
}

fn to_event(msg: &ServerMessage) -> Event {
    let data = match msg {
        ServerMessage::PollUpdate(snapshot) => json!(snapshot),
        ServerMessage::VoteError(reason) | ServerMessage::JoinError(reason) => {
            json!({ "error": reason })
        }
    };
    Event::default().event(msg.event_name()).data(data.to_string())
}

pub async fn poll_updates_sse(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sync = app_state.sync.clone();
    let keep_alive = app_state.config.sse_keep_alive;

    let stream = async_stream::stream! {
        let (session, mut rx) = SessionHandle::channel();
        let _guard = LeaveOnDrop { sync: sync.clone(), session_id: session.id };

        match sync.join(poll_id, &session).await {
            Ok(_) => {
                while let Some(msg) = rx.recv().await {
                    yield Ok(to_event(&msg));
                }
            }
            Err(e) => {
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({ "error": e.client_message() }).to_string()));
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive"))
}
