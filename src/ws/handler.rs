use axum::{
    extract::{Extension, ws::WebSocketUpgrade},
    response::Response,
};

use crate::startup::AppState;
use crate::ws::actor;

/// GET /ws
/// Upgrades and hands the socket to a per-connection actor. Viewers are
/// anonymous; identity for voting travels with each `cast_vote`.
pub async fn ws_upgrade(
    Extension(state): Extension<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| actor::run_connection(socket, state))
}
