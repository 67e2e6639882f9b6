use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::rooms::SessionHandle;
use crate::startup::AppState;
use crate::sync::SyncService;

/// Close code sent when the peer stops answering pings.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Upper bound on flushing queued frames once the connection is over.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run the actor-per-connection pattern for one viewer.
///
/// - Writer task: owns the sink, drains the session's outbound queue and
///   transport control frames.
/// - Heartbeat task: pings periodically and finishes if a pong is late.
/// - This task: reads frames and dispatches them in arrival order.
///
/// Whatever ends the connection, the session leaves its room before the
/// actor returns.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (session, outbound) = SessionHandle::channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();
    let sync = state.sync.clone();

    info!(session_id = %session.id, "WebSocket viewer connected");

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, outbound, control_rx));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut heartbeat_handle = tokio::spawn(heartbeat_task(
        control_tx.clone(),
        pong_rx,
        state.config.ws_ping_interval,
        state.config.ws_pong_timeout,
    ));

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&sync, &session, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    session.send(ServerMessage::VoteError(
                        "Binary frames are not supported".to_string(),
                    ));
                }
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = control_tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(session_id = %session.id, reason = ?frame, "Viewer closed connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(session_id = %session.id, error = %e, "WebSocket receive error");
                    break;
                }
                None => {
                    info!(session_id = %session.id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut heartbeat_handle => {
                warn!(session_id = %session.id, "Heartbeat lost, dropping viewer");
                break;
            }
        }
    }

    let session_id = session.id;
    sync.leave(session_id);
    heartbeat_handle.abort();

    // Closing every sender lets the writer flush what is queued (a pong
    // timeout close frame, say) and finish on its own.
    drop(session);
    drop(control_tx);
    drop(pong_tx);
    if timeout(WRITER_DRAIN, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    info!(session_id = %session_id, "WebSocket viewer disconnected");
}

async fn handle_text(sync: &SyncService, session: &SessionHandle, text: &str) {
    match ClientMessage::from_text(text) {
        Ok(msg) => sync.dispatch(session, msg).await,
        Err(e) => {
            debug!(
                session_id = %session.id,
                error = %e,
                "Undecodable frame: {}",
                text.chars().take(100).collect::<String>()
            );
            session.send(ServerMessage::VoteError("Invalid message".to_string()));
        }
    }
}

/// Forwards control frames and serialized session messages to the sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let frame = tokio::select! {
            Some(frame) = control.recv() => frame,
            Some(msg) = outbound.recv() => match msg.to_text() {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound message");
                    continue;
                }
            },
            else => break,
        };

        if ws_sender.send(frame).await.is_err() {
            // Sink is broken; dropping `outbound` makes broadcasts detach us.
            break;
        }
    }
}

/// Finishes when the connection should be considered dead.
async fn heartbeat_task(
    control: mpsc::UnboundedSender<Message>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    every: Duration,
    grace: Duration,
) {
    let mut ticker = interval(every);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        // Pongs from earlier rounds don't count for this one.
        while pong_rx.try_recv().is_ok() {}

        if control.send(Message::Ping(vec![1, 2, 3, 4])).is_err() {
            break;
        }

        match timeout(grace, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                let _ = control.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}
