//! Per-connection handler: handshake, auth, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get the player's identity
//!   3. Attach to the hub → send HandshakeAck
//!   4. Loop: receive envelopes → dispatch to the arena
//!
//! Outbound frames go through a writer task fed by the same channel the
//! hub pushes session events into, so replies and events share one
//! sequence. The hub holds the only strong sender: when it lets go (the
//! connection was superseded, detached or closed) the writer drains what
//! is left and closes the socket.

use std::sync::Arc;

use fourline_game::now_ms;
use fourline_hub::{Identity, verify};
use fourline_protocol::{
    ClientEnvelope, ClientMessage, Codec, ErrorReason, PROTOCOL_VERSION, PlayerId,
    ProtocolError, ServerEnvelope, ServerMessage,
};
use fourline_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::arena::JoinOutcome;
use crate::server::ServerState;
use crate::{AnalyticsSink, Authenticator, FourlineError, GameStore};

/// How the read loop ended.
enum Exit {
    /// The client said goodbye.
    Goodbye,
    /// The transport dropped or went idle.
    Lost,
}

/// What to do after one client message.
enum Step {
    Reply(ServerMessage),
    Quiet,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, K, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, K, A, C>>,
) -> Result<(), FourlineError>
where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let identity = perform_handshake(&conn, &state).await?;
    let player_id = identity.player_id;

    // --- Step 2: Attach ---
    let (tx, rx) = mpsc::unbounded_channel();
    let replies = tx.downgrade();
    let attached = state.arena.connect(player_id, conn_id, tx).await;
    tracing::info!(
        %conn_id,
        %player_id,
        name = %identity.display_name,
        resumed = ?attached.resumed,
        "player authenticated"
    );

    // The ack goes out before the writer starts, so it precedes anything
    // the hub has already queued.
    let ack = ServerMessage::HandshakeAck {
        player_id,
        display_name: identity.display_name,
        server_time: now_ms(),
        resumed: attached.resumed,
    };
    if let Err(e) = send_direct(&conn, &state.codec, 0, ack).await {
        state.arena.disconnect(player_id, conn_id);
        return Err(e);
    }
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    // --- Step 3: Message loop ---
    let exit = read_loop(&conn, &state, player_id, &replies).await;
    match exit {
        Exit::Goodbye => state.arena.close(player_id).await,
        Exit::Lost => state.arena.disconnect(player_id, conn_id),
    }

    let _ = writer.await;
    tracing::debug!(%conn_id, %player_id, "connection handler finished");
    Ok(())
}

/// Performs the initial handshake: receive Handshake, validate, auth.
async fn perform_handshake<S, K, A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<S, K, A, C>,
) -> Result<Identity, FourlineError>
where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: ClientEnvelope = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            let msg = ServerMessage::error(ErrorReason::BadRequest, format!("invalid handshake: {e}"));
            send_direct(conn, &state.codec, 0, msg).await?;
            return Err(e.into());
        }
    };

    let (version, token) = match envelope.payload {
        ClientMessage::Handshake { version, token } => (version, token),
        _ => {
            let msg = ServerMessage::error(ErrorReason::BadRequest, "expected Handshake");
            send_direct(conn, &state.codec, 0, msg).await?;
            return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        let msg = ServerMessage::error(
            ErrorReason::BadRequest,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        );
        send_direct(conn, &state.codec, 0, msg).await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    match verify(&state.auth, token.as_deref().unwrap_or("")).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            let err = FourlineError::from(e);
            send_direct(conn, &state.codec, 0, err.to_message()).await?;
            Err(err)
        }
    }
}

async fn read_loop<S, K, A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<S, K, A, C>,
    player_id: PlayerId,
    replies: &mpsc::WeakUnboundedSender<ServerMessage>,
) -> Exit
where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player_id, "connection closed");
                return Exit::Lost;
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                return Exit::Lost;
            }
            Err(_) => {
                tracing::info!(%player_id, "connection idle, treating as lost");
                return Exit::Lost;
            }
        };
        state.arena.hub().touch(player_id);

        let envelope: ClientEnvelope = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                reply(
                    replies,
                    ServerMessage::error(ErrorReason::BadRequest, format!("invalid message: {e}")),
                );
                continue;
            }
        };

        match dispatch(state, player_id, envelope.payload).await {
            Ok(Step::Reply(msg)) => reply(replies, msg),
            Ok(Step::Quiet) => {}
            Ok(Step::Close) => return Exit::Goodbye,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "request rejected");
                reply(replies, e.to_message());
            }
        }
    }
}

/// Routes one client message to the arena.
async fn dispatch<S, K, A, C>(
    state: &ServerState<S, K, A, C>,
    player_id: PlayerId,
    msg: ClientMessage,
) -> Result<Step, FourlineError>
where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    let arena = &state.arena;
    let step = match msg {
        ClientMessage::Handshake { .. } => Step::Reply(ServerMessage::error(
            ErrorReason::BadRequest,
            "already authenticated",
        )),

        ClientMessage::Heartbeat { client_time } => Step::Reply(ServerMessage::HeartbeatAck {
            client_time,
            server_time: now_ms(),
        }),

        ClientMessage::JoinQueue { difficulty } => match arena.join_queue(player_id, difficulty).await? {
            JoinOutcome::Queued {
                position,
                timeout_ms,
            } => Step::Reply(ServerMessage::QueueJoined {
                position,
                timeout_ms,
            }),
            // SessionStarted reaches both seats through the hub.
            JoinOutcome::Matched(_) => Step::Quiet,
        },

        ClientMessage::LeaveQueue => {
            arena.leave_queue(player_id);
            Step::Reply(ServerMessage::QueueLeft)
        }

        ClientMessage::PlayBot { difficulty } => {
            arena.create_bot_session(player_id, difficulty).await?;
            Step::Quiet
        }

        ClientMessage::SubmitMove { session_id, column } => {
            arena.submit_move(session_id, player_id, column).await?;
            Step::Quiet
        }

        ClientMessage::GetSession { session_id } => {
            let session = match session_id.or_else(|| arena.session_of(player_id)) {
                Some(id) => Some(arena.get_session(id).await?),
                None => None,
            };
            Step::Reply(ServerMessage::SessionState { session })
        }

        ClientMessage::Quit => {
            let left_queue = arena.leave_queue(player_id);
            match arena.quit(player_id).await? {
                Some(_) => Step::Quiet,
                None if left_queue => Step::Reply(ServerMessage::QueueLeft),
                None => Step::Reply(ServerMessage::error(
                    ErrorReason::SessionNotActive,
                    "not in a session",
                )),
            }
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            Step::Close
        }
    };
    Ok(step)
}

/// Drains the outbound channel onto the socket, then closes it.
async fn write_loop<S, K, A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<S, K, A, C>>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    let mut seq: u64 = 1;
    while let Some(payload) = rx.recv().await {
        let envelope = ServerEnvelope {
            seq: next_seq(&mut seq),
            timestamp: now_ms(),
            payload,
        };
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
    }
    let _ = conn.close().await;
}

/// Queues a reply behind any pending events. Dropped if the connection has
/// been superseded.
fn reply(replies: &mpsc::WeakUnboundedSender<ServerMessage>, msg: ServerMessage) {
    if let Some(tx) = replies.upgrade() {
        let _ = tx.send(msg);
    }
}

/// Sends one frame straight to the socket, bypassing the writer.
async fn send_direct(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    seq: u64,
    payload: ServerMessage,
) -> Result<(), FourlineError> {
    let envelope = ServerEnvelope {
        seq,
        timestamp: now_ms(),
        payload,
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
