//! Wire messages exchanged over a client connection.
//!
//! Both directions use internally tagged JSON: the variant name goes in a
//! `"type"` field next to the variant's own fields, e.g.
//! `{ "type": "SubmitMove", "session_id": 3, "column": 4 }`.
//!
//! Every message travels inside an [`Envelope`] that adds a per-sender
//! sequence number and a timestamp.

use fourline_engine::Difficulty;
use serde::{Deserialize, Serialize};

use crate::{MoveRecord, PlayerId, SessionId, SessionSnapshot};

/// Protocol version spoken by this crate. Handshakes with another version
/// are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on every connection. `token` is handed to the
    /// identity provider.
    Handshake {
        version: u32,
        token: Option<String>,
    },

    /// Keep-alive. `client_time` is echoed back for RTT measurement.
    Heartbeat { client_time: u64 },

    /// Look for a human opponent. If none shows up before the match
    /// timeout, a bot of `difficulty` (server default when absent) takes
    /// the other seat.
    JoinQueue {
        #[serde(default)]
        difficulty: Option<Difficulty>,
    },

    /// Withdraw from the queue. Idempotent.
    LeaveQueue,

    /// Skip the queue and start a bot game right away.
    PlayBot {
        #[serde(default)]
        difficulty: Option<Difficulty>,
    },

    /// Drop a disc into `column` (0–6).
    SubmitMove { session_id: SessionId, column: usize },

    /// Ask for a session's current snapshot. Without an id, the sender's
    /// active session is returned.
    GetSession {
        #[serde(default)]
        session_id: Option<SessionId>,
    },

    /// Resign the current session. The session is abandoned.
    Quit,

    /// Explicit goodbye. Unlike a dropped connection there is no
    /// reconnect grace period.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Messages the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `Handshake`. `resumed` names the session the player was
    /// reattached to, if any.
    HandshakeAck {
        player_id: PlayerId,
        display_name: String,
        server_time: u64,
        resumed: Option<SessionId>,
    },

    /// Reply to `Heartbeat`.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// The player is waiting in the queue at `position` (1 = next).
    QueueJoined { position: usize, timeout_ms: u64 },

    /// The player is no longer queued.
    QueueLeft,

    /// A session was created with the player in one of its seats.
    SessionStarted { session: SessionSnapshot },

    /// A move was applied. `session` already includes it.
    StateUpdated {
        session: SessionSnapshot,
        last_move: MoveRecord,
    },

    /// The session reached a terminal status.
    SessionEnded { session: SessionSnapshot },

    /// The opponent's connection dropped. They have `grace_ms` to come
    /// back before the session is abandoned.
    OpponentDisconnected {
        session_id: SessionId,
        player_id: PlayerId,
        grace_ms: u64,
    },

    /// The opponent came back within the grace period.
    OpponentReconnected {
        session_id: SessionId,
        player_id: PlayerId,
    },

    /// Reply to `GetSession`.
    SessionState { session: Option<SessionSnapshot> },

    /// A request was rejected. State is unchanged.
    Error {
        code: u16,
        reason: ErrorReason,
        message: String,
    },
}

impl ServerMessage {
    /// Builds an `Error` with the code that belongs to `reason`.
    pub fn error(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self::Error {
            code: reason.code(),
            reason,
            message: message.into(),
        }
    }

    /// The session this message is about, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::SessionStarted { session }
            | Self::StateUpdated { session, .. }
            | Self::SessionEnded { session } => Some(session.session_id),
            Self::OpponentDisconnected { session_id, .. }
            | Self::OpponentReconnected { session_id, .. } => Some(*session_id),
            Self::SessionState { session } => session.as_ref().map(|s| s.session_id),
            Self::HandshakeAck { resumed, .. } => *resumed,
            _ => None,
        }
    }
}

/// Machine-readable rejection reason carried by [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Malformed message or wrong protocol version.
    BadRequest,
    /// Missing or rejected credentials.
    Unauthorized,
    /// The session does not exist (or was evicted).
    NotFound,
    /// The column is out of range or full.
    IllegalMove,
    /// The sender is not the player to move.
    NotYourTurn,
    /// The session is not accepting moves.
    SessionNotActive,
    /// The player already holds a queue ticket.
    AlreadyQueued,
    /// The player is already seated in an active session.
    AlreadyInSession,
    /// A component is shutting down or overloaded.
    Unavailable,
}

impl ErrorReason {
    /// HTTP-style status code.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest | Self::IllegalMove => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::NotYourTurn
            | Self::SessionNotActive
            | Self::AlreadyQueued
            | Self::AlreadyInSession => 409,
            Self::Unavailable => 503,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper. Every frame on the socket is one envelope.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ seq: 42                      │  per-sender counter
/// │ timestamp: 1700000000000     │  sender clock, ms since epoch
/// │ payload: { "type": ... }     │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Increments by one per message from the same sender.
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}

pub type ClientEnvelope = Envelope<ClientMessage>;
pub type ServerEnvelope = Envelope<ServerMessage>;

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes below are what browser clients parse, so they are
    //! pinned field by field.

    use fourline_engine::{Board, Disc};

    use super::*;
    use crate::SessionStatus;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session_id: SessionId(3),
            players: [PlayerId(1), PlayerId::BOT],
            board: Board::new(),
            turn: Disc::Red,
            status: SessionStatus::InProgress,
            winner: None,
            winning_line: None,
            moves: Vec::new(),
            started_at: 10,
            ended_at: None,
            end_reason: None,
            bot_difficulty: Some(Difficulty::Hard),
        }
    }

    // =====================================================================
    // ClientMessage
    // =====================================================================

    #[test]
    fn test_client_handshake_json_format() {
        let msg = ClientMessage::Handshake {
            version: 1,
            token: Some("abc".into()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Handshake");
        assert_eq!(json["version"], 1);
        assert_eq!(json["token"], "abc");
    }

    #[test]
    fn test_client_submit_move_parses_from_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"SubmitMove","session_id":3,"column":4}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubmitMove {
                session_id: SessionId(3),
                column: 4
            }
        );
    }

    #[test]
    fn test_client_join_queue_difficulty_optional() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"JoinQueue"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinQueue { difficulty: None });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"JoinQueue","difficulty":"hard"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinQueue {
                difficulty: Some(Difficulty::Hard)
            }
        );
    }

    #[test]
    fn test_client_unit_variants_parse_from_bare_tag() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"LeaveQueue"}"#).unwrap();
        assert_eq!(msg, ClientMessage::LeaveQueue);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"Quit"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Quit);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"GetSession"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetSession { session_id: None });
    }

    #[test]
    fn test_client_unknown_type_is_rejected() {
        let res: Result<ClientMessage, _> = serde_json::from_str(r#"{"type":"Teleport"}"#);
        assert!(res.is_err());
    }

    // =====================================================================
    // ServerMessage
    // =====================================================================

    #[test]
    fn test_server_error_json_format() {
        let msg = ServerMessage::error(ErrorReason::NotYourTurn, "wait for your turn");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 409);
        assert_eq!(json["reason"], "not_your_turn");
        assert_eq!(json["message"], "wait for your turn");
    }

    #[test]
    fn test_server_state_updated_json_format() {
        let last_move = MoveRecord {
            ply: 1,
            column: 3,
            row: 0,
            player: PlayerId(1),
            disc: Disc::Red,
            at: 11,
        };
        let msg = ServerMessage::StateUpdated {
            session: snapshot(),
            last_move,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "StateUpdated");
        assert_eq!(json["session"]["session_id"], 3);
        assert_eq!(json["session"]["bot_difficulty"], "hard");
        assert_eq!(json["last_move"]["column"], 3);
        assert_eq!(json["last_move"]["disc"], "red");
    }

    #[test]
    fn test_server_opponent_disconnected_json_format() {
        let msg = ServerMessage::OpponentDisconnected {
            session_id: SessionId(3),
            player_id: PlayerId(8),
            grace_ms: 30_000,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "OpponentDisconnected");
        assert_eq!(json["player_id"], 8);
        assert_eq!(json["grace_ms"], 30_000);
    }

    #[test]
    fn test_server_message_session_id() {
        assert_eq!(
            ServerMessage::SessionEnded { session: snapshot() }.session_id(),
            Some(SessionId(3))
        );
        assert_eq!(ServerMessage::QueueLeft.session_id(), None);
        assert_eq!(
            ServerMessage::SessionState { session: None }.session_id(),
            None
        );
    }

    #[test]
    fn test_error_reason_codes() {
        assert_eq!(ErrorReason::BadRequest.code(), 400);
        assert_eq!(ErrorReason::IllegalMove.code(), 400);
        assert_eq!(ErrorReason::Unauthorized.code(), 401);
        assert_eq!(ErrorReason::NotFound.code(), 404);
        assert_eq!(ErrorReason::AlreadyQueued.code(), 409);
        assert_eq!(ErrorReason::Unavailable.code(), 503);
    }

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_json_format() {
        let env = ServerEnvelope {
            seq: 4,
            timestamp: 99,
            payload: ServerMessage::QueueJoined {
                position: 1,
                timeout_ms: 10_000,
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["seq"], 4);
        assert_eq!(json["timestamp"], 99);
        assert_eq!(json["payload"]["type"], "QueueJoined");
        assert_eq!(json["payload"]["position"], 1);
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = ClientEnvelope {
            seq: 1,
            timestamp: 5,
            payload: ClientMessage::Heartbeat { client_time: 5 },
        };
        let bytes = serde_json::to_vec(&env).unwrap();
        let back: ClientEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
    }
}
