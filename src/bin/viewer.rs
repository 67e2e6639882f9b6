//! Terminal viewer: watches one poll live and votes from stdin.
//!
//! usage: viewer <ws-url> <poll-id> [marker-file]

use futures::{SinkExt, StreamExt};
use live_poller::protocol::{ClientMessage, ServerMessage};
use live_poller::viewer::{FileMarkerStore, MarkerError, ViewerSession, VoteBlocked, VoteStatus};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
enum ClientError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error("could not encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("stdin: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(poll)) = (args.next(), args.next()) else {
        eprintln!("usage: viewer <ws-url> <poll-id> [marker-file]");
        std::process::exit(2);
    };
    let Ok(poll_id) = poll.parse::<Uuid>() else {
        eprintln!("invalid poll id: {poll}");
        std::process::exit(2);
    };
    let marker_path = args
        .next()
        .unwrap_or_else(|| "viewer_markers.json".to_string());

    if let Err(e) = run(&url, poll_id, &marker_path).await {
        error!("viewer stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(url: &str, poll_id: Uuid, marker_path: &str) -> Result<(), ClientError> {
    let markers = FileMarkerStore::open(marker_path)?;
    let mut viewer = ViewerSession::new(markers);

    // Gate the vote prompt from the local marker before connecting.
    let Some(join) = viewer.open(poll_id) else {
        return Ok(());
    };
    render(&viewer);

    let (socket, _) = connect_async(url).await?;
    info!("connected to {url}");
    let (mut sink, mut stream) = socket.split();
    sink.send(Message::Text(join.to_text()?)).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::from_text(&text) {
                    Ok(ServerMessage::JoinError(reason)) => {
                        println!("! {reason}");
                        break;
                    }
                    Ok(ServerMessage::VoteError(reason)) => {
                        println!("! {reason}");
                        viewer.handle(ServerMessage::VoteError(reason));
                    }
                    Ok(update) => {
                        viewer.handle(update);
                        render(&viewer);
                    }
                    Err(e) => warn!("ignoring undecodable frame: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!("server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line == "q" {
                    if let Some(leave) = viewer.close() {
                        sink.send(Message::Text(leave.to_text()?)).await?;
                    }
                    let _ = sink.close().await;
                    break;
                }
                if let Some(frame) = vote_from_input(&mut viewer, line)? {
                    sink.send(Message::Text(frame.to_text()?)).await?;
                }
            }
        }
    }
    Ok(())
}

fn vote_from_input(
    viewer: &mut ViewerSession<FileMarkerStore>,
    line: &str,
) -> Result<Option<ClientMessage>, ClientError> {
    let Some(option_id) = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| viewer.snapshot()?.options.get(i).map(|o| o.id))
    else {
        println!("enter an option number, or q to quit");
        return Ok(None);
    };

    match viewer.cast_vote(option_id) {
        Ok(frame) => Ok(Some(frame)),
        Err(VoteBlocked::Marker(e)) => Err(e.into()),
        Err(blocked) => {
            println!("cannot vote: {blocked}");
            Ok(None)
        }
    }
}

fn render(viewer: &ViewerSession<FileMarkerStore>) {
    match viewer.snapshot() {
        None => println!("Loading poll..."),
        Some(snapshot) => {
            println!();
            println!("{}", snapshot.question);
            for (i, option) in snapshot.options.iter().enumerate() {
                println!("  {}. {:<30} {} votes", i + 1, option.text, option.vote_count);
            }
        }
    }
    match viewer.status() {
        VoteStatus::Loading => {}
        VoteStatus::Open => println!("Choose one option to submit your vote"),
        VoteStatus::AlreadyVoted => println!("You have already voted"),
        VoteStatus::Ended => println!("Poll has ended"),
    }
}
