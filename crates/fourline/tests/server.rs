//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use fourline::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        game: GameConfig {
            bot_pacing: false,
            ..GameConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = FourlineServerBuilder::new()
        .config(config)
        .build(DevAuthenticator)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, seq: u64, payload: ClientMessage) {
    let envelope = ClientEnvelope {
        seq,
        timestamp: 0,
        payload,
    };
    let bytes = serde_json::to_vec(&envelope).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

/// Next server envelope, skipping control frames.
async fn recv(ws: &mut ClientWs) -> ServerEnvelope {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                return serde_json::from_slice(&msg.into_data()).expect("decode");
            }
            Message::Close(_) => panic!("server closed the connection"),
            _ => continue,
        }
    }
}

/// Skips envelopes until the payload matches.
async fn recv_until(ws: &mut ClientWs, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let env = recv(ws).await;
        if pred(&env.payload) {
            return env.payload;
        }
    }
}

/// Sends a handshake and returns the reply envelope.
async fn handshake(ws: &mut ClientWs, token: &str) -> ServerEnvelope {
    send(
        ws,
        0,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            token: Some(token.into()),
        },
    )
    .await;
    recv(ws).await
}

async fn login(addr: &str, player_id: u64) -> ClientWs {
    let mut ws = connect(addr).await;
    let ack = handshake(&mut ws, &player_id.to_string()).await;
    assert!(matches!(ack.payload, ServerMessage::HandshakeAck { .. }));
    ws
}

fn expect_error(msg: ServerMessage, want: ErrorReason) {
    match msg {
        ServerMessage::Error { code, reason, .. } => {
            assert_eq!(reason, want);
            assert_eq!(code, want.code());
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = handshake(&mut ws, "42:alice").await;
    assert_eq!(ack.seq, 0);
    match ack.payload {
        ServerMessage::HandshakeAck {
            player_id,
            display_name,
            resumed,
            ..
        } => {
            assert_eq!(player_id, PlayerId(42));
            assert_eq!(display_name, "alice");
            assert_eq!(resumed, None);
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        0,
        ClientMessage::Handshake {
            version: 999,
            token: Some("1".into()),
        },
    )
    .await;
    expect_error(recv(&mut ws).await.payload, ErrorReason::BadRequest);
}

#[tokio::test]
async fn test_handshake_auth_failure() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = handshake(&mut ws, "not-a-number").await;
    expect_error(reply.payload, ErrorReason::Unauthorized);
}

#[tokio::test]
async fn test_handshake_bot_identity_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = handshake(&mut ws, "0").await;
    expect_error(reply.payload, ErrorReason::Unauthorized);
}

#[tokio::test]
async fn test_first_message_must_be_handshake() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, 0, ClientMessage::Heartbeat { client_time: 1 }).await;
    expect_error(recv(&mut ws).await.payload, ErrorReason::BadRequest);
}

// =========================================================================
// Requests
// =========================================================================

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::Heartbeat { client_time: 12345 }).await;
    let env = recv(&mut ws).await;
    assert_eq!(env.seq, 1);
    match env.payload {
        ServerMessage::HeartbeatAck { client_time, .. } => assert_eq!(client_time, 12345),
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reply_sequence_increments() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    for seq in 1..=3 {
        send(&mut ws, seq, ClientMessage::Heartbeat { client_time: seq }).await;
        assert_eq!(recv(&mut ws).await.seq, seq);
    }
}

#[tokio::test]
async fn test_get_session_without_session_is_empty() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::GetSession { session_id: None }).await;
    assert_eq!(
        recv(&mut ws).await.payload,
        ServerMessage::SessionState { session: None }
    );

    send(
        &mut ws,
        2,
        ClientMessage::GetSession {
            session_id: Some(SessionId(424_242)),
        },
    )
    .await;
    expect_error(recv(&mut ws).await.payload, ErrorReason::NotFound);
}

#[tokio::test]
async fn test_queue_join_and_leave() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    match recv(&mut ws).await.payload {
        ServerMessage::QueueJoined {
            position,
            timeout_ms,
        } => {
            assert_eq!(position, 1);
            assert_eq!(timeout_ms, 10_000);
        }
        other => panic!("expected QueueJoined, got {other:?}"),
    }

    send(&mut ws, 2, ClientMessage::JoinQueue { difficulty: None }).await;
    expect_error(recv(&mut ws).await.payload, ErrorReason::AlreadyQueued);

    send(&mut ws, 3, ClientMessage::LeaveQueue).await;
    assert_eq!(recv(&mut ws).await.payload, ServerMessage::QueueLeft);
}

#[tokio::test]
async fn test_quit_without_session_is_rejected() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::Quit).await;
    expect_error(recv(&mut ws).await.payload, ErrorReason::SessionNotActive);
}

#[tokio::test]
async fn test_quit_while_queued_leaves_queue() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    assert!(matches!(
        recv(&mut ws).await.payload,
        ServerMessage::QueueJoined { .. }
    ));

    send(&mut ws, 2, ClientMessage::Quit).await;
    assert_eq!(recv(&mut ws).await.payload, ServerMessage::QueueLeft);

    // The ticket is gone, so joining again succeeds.
    send(&mut ws, 3, ClientMessage::JoinQueue { difficulty: None }).await;
    assert!(matches!(
        recv(&mut ws).await.payload,
        ServerMessage::QueueJoined { position: 1, .. }
    ));
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(
        &mut ws,
        1,
        ClientMessage::Disconnect {
            reason: "bye".into(),
        },
    )
    .await;

    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "connection should close after Disconnect");
}

// =========================================================================
// Games
// =========================================================================

#[tokio::test]
async fn test_two_players_matched_and_play_to_win() {
    let addr = start_server().await;
    let mut ws1 = login(&addr, 1).await;
    let mut ws2 = login(&addr, 2).await;

    send(&mut ws1, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    assert!(matches!(
        recv(&mut ws1).await.payload,
        ServerMessage::QueueJoined { .. }
    ));
    send(&mut ws2, 1, ClientMessage::JoinQueue { difficulty: None }).await;

    let started = |m: &ServerMessage| matches!(m, ServerMessage::SessionStarted { .. });
    let ServerMessage::SessionStarted { session } = recv_until(&mut ws1, started).await else {
        unreachable!()
    };
    let ServerMessage::SessionStarted { session: seen } = recv_until(&mut ws2, started).await else {
        unreachable!()
    };
    assert_eq!(session, seen);
    assert!(!session.has_bot());

    let id = session.session_id;
    let red = session.players[0];
    let (mut red_ws, mut yellow_ws) = if red == PlayerId(1) {
        (ws1, ws2)
    } else {
        (ws2, ws1)
    };

    // Red stacks column 0, yellow stacks column 1.
    let mut seq = 2;
    for turn in 0..7 {
        let (mover, column) = if turn % 2 == 0 {
            (&mut red_ws, 0)
        } else {
            (&mut yellow_ws, 1)
        };
        send(mover, seq, ClientMessage::SubmitMove { session_id: id, column }).await;
        seq += 1;
        if turn < 6 {
            for ws in [&mut red_ws, &mut yellow_ws] {
                let update = recv_until(ws, |m| matches!(m, ServerMessage::StateUpdated { .. })).await;
                let ServerMessage::StateUpdated { last_move, .. } = update else {
                    unreachable!()
                };
                assert_eq!(last_move.column, column);
            }
        }
    }

    for ws in [&mut red_ws, &mut yellow_ws] {
        let ended = recv_until(ws, |m| matches!(m, ServerMessage::SessionEnded { .. })).await;
        let ServerMessage::SessionEnded { session } = ended else {
            unreachable!()
        };
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.winner, Some(red));
        assert_eq!(session.moves.len(), 7);
    }
}

#[tokio::test]
async fn test_illegal_move_rejected() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(
        &mut ws,
        1,
        ClientMessage::PlayBot {
            difficulty: Some(Difficulty::Easy),
        },
    )
    .await;
    let ServerMessage::SessionStarted { session } =
        recv_until(&mut ws, |m| matches!(m, ServerMessage::SessionStarted { .. })).await
    else {
        unreachable!()
    };
    assert!(session.has_bot());
    assert_eq!(session.bot_difficulty, Some(Difficulty::Easy));

    send(
        &mut ws,
        2,
        ClientMessage::SubmitMove {
            session_id: session.session_id,
            column: 9,
        },
    )
    .await;
    let rejected = recv_until(&mut ws, |m| matches!(m, ServerMessage::Error { .. })).await;
    match rejected {
        ServerMessage::Error { reason, .. } => {
            // Seating is random: the bot may still be thinking on red.
            assert!(matches!(reason, ErrorReason::IllegalMove | ErrorReason::NotYourTurn));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_play_bot_and_bot_replies() {
    let addr = start_server().await;
    let mut ws = login(&addr, 1).await;

    send(&mut ws, 1, ClientMessage::PlayBot { difficulty: None }).await;
    let ServerMessage::SessionStarted { session } =
        recv_until(&mut ws, |m| matches!(m, ServerMessage::SessionStarted { .. })).await
    else {
        unreachable!()
    };
    assert_eq!(session.bot_difficulty, Some(Difficulty::Medium));

    if session.player_to_move() == Some(PlayerId(1)) {
        send(
            &mut ws,
            2,
            ClientMessage::SubmitMove {
                session_id: session.session_id,
                column: 3,
            },
        )
        .await;
    }
    let bot_move = recv_until(&mut ws, |m| {
        matches!(m, ServerMessage::StateUpdated { last_move, .. } if last_move.player.is_bot())
    })
    .await;
    let ServerMessage::StateUpdated { session: after, .. } = bot_move else {
        unreachable!()
    };
    assert_eq!(after.player_to_move(), Some(PlayerId(1)));

    send(&mut ws, 3, ClientMessage::GetSession { session_id: None }).await;
    let state = recv_until(&mut ws, |m| matches!(m, ServerMessage::SessionState { .. })).await;
    assert!(matches!(
        state,
        ServerMessage::SessionState { session: Some(s) } if s.session_id == session.session_id
    ));
}

#[tokio::test]
async fn test_quit_ends_session_for_opponent() {
    let addr = start_server().await;
    let mut ws1 = login(&addr, 1).await;
    let mut ws2 = login(&addr, 2).await;

    send(&mut ws1, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    send(&mut ws2, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    recv_until(&mut ws1, |m| matches!(m, ServerMessage::SessionStarted { .. })).await;
    recv_until(&mut ws2, |m| matches!(m, ServerMessage::SessionStarted { .. })).await;

    send(&mut ws1, 2, ClientMessage::Quit).await;
    let ended = recv_until(&mut ws2, |m| matches!(m, ServerMessage::SessionEnded { .. })).await;
    let ServerMessage::SessionEnded { session } = ended else {
        unreachable!()
    };
    assert_eq!(session.status, SessionStatus::Abandoned);
    assert_eq!(session.end_reason, Some(EndReason::Quit));
}

#[tokio::test]
async fn test_reconnect_resumes_session() {
    let addr = start_server().await;
    let mut ws1 = login(&addr, 1).await;
    let mut ws2 = login(&addr, 2).await;

    send(&mut ws1, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    send(&mut ws2, 1, ClientMessage::JoinQueue { difficulty: None }).await;
    let ServerMessage::SessionStarted { session } =
        recv_until(&mut ws1, |m| matches!(m, ServerMessage::SessionStarted { .. })).await
    else {
        unreachable!()
    };
    recv_until(&mut ws2, |m| matches!(m, ServerMessage::SessionStarted { .. })).await;

    // Drop the socket without a Disconnect message.
    drop(ws1);
    let notice = recv_until(&mut ws2, |m| {
        matches!(m, ServerMessage::OpponentDisconnected { .. })
    })
    .await;
    assert!(matches!(
        notice,
        ServerMessage::OpponentDisconnected { player_id: PlayerId(1), grace_ms: 30_000, .. }
    ));

    let mut ws1 = connect(&addr).await;
    let ack = handshake(&mut ws1, "1").await;
    match ack.payload {
        ServerMessage::HandshakeAck { resumed, .. } => {
            assert_eq!(resumed, Some(session.session_id));
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
    let state = recv_until(&mut ws1, |m| matches!(m, ServerMessage::SessionState { .. })).await;
    assert!(matches!(
        state,
        ServerMessage::SessionState { session: Some(s) } if s.status == SessionStatus::InProgress
    ));
    assert!(matches!(
        recv_until(&mut ws2, |m| matches!(m, ServerMessage::OpponentReconnected { .. })).await,
        ServerMessage::OpponentReconnected { player_id: PlayerId(1), .. }
    ));
}
