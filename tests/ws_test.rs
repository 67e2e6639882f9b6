//! Integration tests for the live poll protocol over a real WebSocket.

use futures::{SinkExt, StreamExt};
use live_poller::config::Config;
use live_poller::protocol::{
    CastVote, ClientMessage, JoinPoll, PollSnapshot, ServerMessage,
};
use live_poller::startup::{AppState, build_router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the server on a random port and return its state and address.
async fn start_test_server() -> (AppState, SocketAddr) {
    start_test_server_with(Config::default()).await
}

async fn start_test_server_with(config: Config) -> (AppState, SocketAddr) {
    let state = AppState::in_memory(config);
    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, msg: ClientMessage) {
    ws.send(Message::Text(msg.to_text().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return ServerMessage::from_text(&text).unwrap();
        }
    }
}

async fn recv_update(ws: &mut Client) -> PollSnapshot {
    match recv(ws).await {
        ServerMessage::PollUpdate(snapshot) => snapshot,
        other => panic!("expected poll_update, got {other:?}"),
    }
}

/// Nothing else arrives within a short window.
async fn assert_silent(ws: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

fn join(poll_id: Uuid) -> ClientMessage {
    ClientMessage::JoinPoll(JoinPoll { poll_id })
}

fn vote(poll_id: Uuid, option_id: Uuid, token: &str) -> ClientMessage {
    ClientMessage::CastVote(CastVote {
        poll_id,
        option_id,
        viewer_token: Some(token.to_string()),
    })
}

async fn wait_for_rooms(state: &AppState, expected: usize) {
    for _ in 0..50 {
        if state.sync.rooms().room_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "room count stayed at {}, expected {expected}",
        state.sync.rooms().room_count()
    );
}

#[tokio::test]
async fn vote_is_broadcast_and_second_vote_rejected() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "A or B?", &["A".into(), "B".into()])
        .await
        .unwrap();
    let (a, b) = (p1.options[0].id, p1.options[1].id);

    let mut v1 = connect(addr).await;
    let mut other = connect(addr).await;

    send(&mut v1, join(p1.poll_id)).await;
    let initial = recv_update(&mut v1).await;
    assert_eq!(initial.vote_count(a), Some(0));
    assert_eq!(initial.vote_count(b), Some(0));
    assert!(initial.is_active);

    send(&mut other, join(p1.poll_id)).await;
    recv_update(&mut other).await;

    send(&mut v1, vote(p1.poll_id, a, "v1-token")).await;
    for ws in [&mut v1, &mut other] {
        let update = recv_update(ws).await;
        assert_eq!(update.vote_count(a), Some(1));
        assert_eq!(update.vote_count(b), Some(0));
        assert!(update.is_active);
    }

    send(&mut v1, vote(p1.poll_id, b, "v1-token")).await;
    assert_eq!(
        recv(&mut v1).await,
        ServerMessage::VoteError("You have already voted on this poll".into())
    );
    assert_silent(&mut other).await;
    assert_eq!(state.sync.snapshot(p1.poll_id).await.unwrap().total_votes(), 1);
}

#[tokio::test]
async fn ended_poll_is_pushed_and_votes_rejected() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Still open?", &["yes".into(), "no".into()])
        .await
        .unwrap();

    let mut v2 = connect(addr).await;
    send(&mut v2, join(p1.poll_id)).await;
    recv_update(&mut v2).await;

    state
        .sync
        .end_poll_as_owner(p1.poll_id, "owner")
        .await
        .unwrap();
    assert!(!recv_update(&mut v2).await.is_active);

    send(&mut v2, vote(p1.poll_id, p1.options[0].id, "v2-token")).await;
    assert_eq!(
        recv(&mut v2).await,
        ServerMessage::VoteError("Poll has ended".into())
    );
    assert_eq!(state.sync.snapshot(p1.poll_id).await.unwrap().total_votes(), 0);
}

#[tokio::test]
async fn joining_unknown_poll_only_errors_the_joiner() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Real poll?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut watcher = connect(addr).await;
    send(&mut watcher, join(p1.poll_id)).await;
    recv_update(&mut watcher).await;

    let mut stray = connect(addr).await;
    send(&mut stray, join(Uuid::new_v4())).await;
    assert_eq!(
        recv(&mut stray).await,
        ServerMessage::JoinError("Poll not found".into())
    );

    assert_silent(&mut watcher).await;
    assert_eq!(state.sync.rooms().room_count(), 1);
    assert_eq!(state.sync.rooms().session_count(p1.poll_id), 1);
}

#[tokio::test]
async fn disconnect_releases_room() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Leaving?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    send(&mut ws, join(p1.poll_id)).await;
    recv_update(&mut ws).await;
    assert_eq!(state.sync.rooms().room_count(), 1);

    ws.close(None).await.unwrap();
    drop(ws);
    wait_for_rooms(&state, 0).await;
}

#[tokio::test]
async fn leave_poll_detaches_without_closing() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Navigate away?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    send(&mut ws, join(p1.poll_id)).await;
    recv_update(&mut ws).await;

    send(&mut ws, ClientMessage::LeavePoll).await;
    wait_for_rooms(&state, 0).await;

    state.sync.end_poll(p1.poll_id).await.unwrap();
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Robust?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    ws.send(Message::Text("{\"event\":\"bogus\"}".into()))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut ws).await,
        ServerMessage::VoteError("Invalid message".into())
    );

    send(&mut ws, join(p1.poll_id)).await;
    assert_eq!(recv_update(&mut ws).await.poll_id, p1.poll_id);
}

#[tokio::test]
async fn many_viewers_converge_on_final_tally() {
    let (state, addr) = start_test_server().await;
    let p1 = state
        .sync
        .create_poll("owner", "Load test?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut watcher = connect(addr).await;
    send(&mut watcher, join(p1.poll_id)).await;
    recv_update(&mut watcher).await;

    let mut voters = Vec::new();
    for i in 0..20 {
        let option = p1.options[i % 2].id;
        let poll_id = p1.poll_id;
        voters.push(tokio::spawn(async move {
            let mut ws = connect(addr).await;
            // Two frames with the same token; only one may count.
            let token = format!("viewer-{i}");
            send(&mut ws, vote(poll_id, option, &token)).await;
            send(&mut ws, vote(poll_id, option, &token)).await;
            // Wait for the rejection so both frames are processed before we hang up.
            loop {
                if let ServerMessage::VoteError(_) = recv(&mut ws).await {
                    break;
                }
            }
        }));
    }
    for voter in voters {
        voter.await.unwrap();
    }

    assert_eq!(state.sync.snapshot(p1.poll_id).await.unwrap().total_votes(), 20);

    let mut last_total = 0;
    while last_total < 20 {
        let update = recv_update(&mut watcher).await;
        assert!(update.total_votes() > last_total, "snapshot regressed");
        last_total = update.total_votes();
    }
}

fn fast_heartbeat() -> Config {
    Config {
        ws_ping_interval: Duration::from_millis(100),
        ws_pong_timeout: Duration::from_millis(100),
        ..Config::default()
    }
}

#[tokio::test]
async fn silent_viewer_is_dropped_after_pong_timeout() {
    let (state, addr) = start_test_server_with(fast_heartbeat()).await;
    let p1 = state
        .sync
        .create_poll("owner", "Anyone there?", &["a".into(), "b".into()])
        .await
        .unwrap();

    // Pongs are only written while the client reads, so never reading means
    // never answering a ping.
    let mut ws = connect(addr).await;
    send(&mut ws, join(p1.poll_id)).await;
    wait_for_rooms(&state, 1).await;
    wait_for_rooms(&state, 0).await;

    // The server says why before hanging up.
    let mut close_code = None;
    while let Ok(Some(Ok(frame))) = tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
        if let Message::Close(frame) = frame {
            close_code = frame.map(|f| f.code);
            break;
        }
    }
    assert_eq!(close_code, Some(CloseCode::Away));
}

#[tokio::test]
async fn responsive_viewer_survives_heartbeats() {
    let (state, addr) = start_test_server_with(fast_heartbeat()).await;
    let p1 = state
        .sync
        .create_poll("owner", "Still here?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    send(&mut ws, join(p1.poll_id)).await;
    recv_update(&mut ws).await;

    // Reading lets the client answer each ping.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
    let mut pings = 0;
    while let Ok(Some(Ok(frame))) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Message::Ping(_) = frame {
            pings += 1;
        }
    }
    assert!(pings >= 2, "expected several pings, saw {pings}");
    assert_eq!(state.sync.rooms().session_count(p1.poll_id), 1);
}

#[tokio::test]
async fn zero_ping_interval_does_not_drop_viewers() {
    let (state, addr) = start_test_server_with(Config {
        ws_ping_interval: Duration::ZERO,
        ..Config::default()
    })
    .await;
    let p1 = state
        .sync
        .create_poll("owner", "Zero?", &["a".into(), "b".into()])
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    send(&mut ws, join(p1.poll_id)).await;
    recv_update(&mut ws).await;
    assert_silent(&mut ws).await;
    assert_eq!(state.sync.rooms().session_count(p1.poll_id), 1);

    send(&mut ws, vote(p1.poll_id, p1.options[0].id, "zero-token")).await;
    assert_eq!(recv_update(&mut ws).await.total_votes(), 1);
}
