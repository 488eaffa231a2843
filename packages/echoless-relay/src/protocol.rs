//! Relay protocol message definitions.
//!
//! The relay speaks a simple JSON-over-WebSocket protocol. Every frame is a
//! tagged object (`{"type": "join", ...}`) with camelCase fields, matching
//! what the browser client sends. Signaling payloads are opaque to the relay:
//! they are carried as raw JSON values and forwarded untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a room under a nickname. Allowed once per connection.
    Join {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        nickname: String,
    },

    /// Forward an offer (or ICE candidate) to another participant.
    RelaySignal {
        target_id: String,
        caller_id: String,
        payload: Value,
    },

    /// Return an answer to the participant that initiated the handshake.
    RelayReturnSignal {
        caller_id: String,
        payload: Value,
    },

    /// Update this connection's mute state.
    UpdateState {
        is_muted: bool,
    },

    /// Send a chat message to everyone in the room.
    SendChat {
        body: String,
        /// Client clock, milliseconds since the Unix epoch.
        timestamp: i64,
    },

    /// Ping to keep connection alive.
    Ping,
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Messages sent from the relay server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection: the id the relay assigned to it.
    Connected {
        id: String,
    },

    /// Join acknowledgement with everyone already present and the ICE
    /// servers to use for peer connections.
    RoomJoined {
        members: Vec<Participant>,
        ice_servers: Vec<IceServer>,
    },

    /// Someone else joined the room.
    MemberJoined {
        member: Participant,
    },

    /// A signaling payload forwarded from another participant.
    SignalReceived {
        caller_id: String,
        payload: Value,
    },

    /// The answer to a signal this client sent earlier.
    SignalReturned {
        id: String,
        payload: Value,
    },

    /// A participant toggled their mute state.
    StateChanged {
        id: String,
        is_muted: bool,
    },

    /// A chat message, delivered to every member including the sender.
    ChatBroadcast(ChatMessage),

    /// A participant disconnected.
    MemberLeft {
        id: String,
    },

    /// Error response, only ever sent to the connection that caused it.
    Error {
        code: String,
        message: String,
    },

    /// Pong response to keep connection alive.
    Pong,
}

// ── Supporting Types ──────────────────────────────────────────────────────────

/// Public profile of a room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub nickname: String,
    pub is_muted: bool,
}

/// A room chat message. Never stored; it exists only while being delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_nickname: String,
    pub body: String,
    pub timestamp: i64,
}

/// A STUN/TURN server descriptor, shaped like the browser's `RTCIceServer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// `RTCIceServer.urls`: a single URL or a list of URLs sharing one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl From<String> for IceUrls {
    fn from(url: String) -> Self {
        IceUrls::One(url)
    }
}

impl From<&str> for IceUrls {
    fn from(url: &str) -> Self {
        IceUrls::One(url.to_string())
    }
}

impl PartialEq<&str> for IceUrls {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, IceUrls::One(url) if url == other)
    }
}

impl IceServer {
    /// A credential-less STUN entry.
    pub fn stun(urls: &str) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_parses_camel_case_fields() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"join","roomId":"r1","nickname":"ana"}"#).unwrap();
        match parsed {
            ClientMessage::Join { room_id, nickname } => {
                assert_eq!(room_id, "r1");
                assert_eq!(nickname, "ana");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_join_missing_fields_default_to_empty() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        match parsed {
            ClientMessage::Join { room_id, nickname } => {
                assert!(room_id.is_empty());
                assert!(nickname.is_empty());
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_relay_signal_keeps_payload_verbatim() {
        let frame = json!({
            "type": "relay_signal",
            "targetId": "b",
            "callerId": "a",
            "payload": { "type": "offer", "sdp": "v=0\r\n", "nested": [1, 2, { "x": null }] }
        });
        let parsed: ClientMessage = serde_json::from_value(frame.clone()).unwrap();
        match parsed {
            ClientMessage::RelaySignal {
                target_id,
                caller_id,
                payload,
            } => {
                assert_eq!(target_id, "b");
                assert_eq!(caller_id, "a");
                assert_eq!(payload, frame["payload"]);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_update_state_and_chat_parse() {
        let state: ClientMessage =
            serde_json::from_str(r#"{"type":"update_state","isMuted":true}"#).unwrap();
        assert!(matches!(state, ClientMessage::UpdateState { is_muted: true }));

        let chat: ClientMessage = serde_json::from_str(
            r#"{"type":"send_chat","body":"hi","timestamp":1700000000000}"#,
        )
        .unwrap();
        match chat {
            ClientMessage::SendChat { body, timestamp } => {
                assert_eq!(body, "hi");
                assert_eq!(timestamp, 1_700_000_000_000);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"destroy_room"}"#).is_err());
    }

    #[test]
    fn test_room_joined_serialization() {
        let msg = ServerMessage::RoomJoined {
            members: vec![Participant {
                id: "a".to_string(),
                nickname: "ana".to_string(),
                is_muted: false,
            }],
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "room_joined");
        assert_eq!(value["members"][0]["isMuted"], false);
        assert_eq!(value["iceServers"][0]["urls"], "stun:stun.l.google.com:19302");
        assert!(value["iceServers"][0].get("username").is_none());
    }

    #[test]
    fn test_ice_server_urls_accepts_string_or_list() {
        let single: IceServer =
            serde_json::from_value(json!({ "urls": "stun:stun.example.com:3478" })).unwrap();
        assert_eq!(single.urls, "stun:stun.example.com:3478");

        let multi: IceServer = serde_json::from_value(json!({
            "urls": ["turn:turn.example.com:3478?transport=udp", "turns:turn.example.com:443"],
            "username": "u",
            "credential": "c"
        }))
        .unwrap();
        assert_eq!(
            multi.urls,
            IceUrls::Many(vec![
                "turn:turn.example.com:3478?transport=udp".to_string(),
                "turns:turn.example.com:443".to_string(),
            ])
        );

        // Lists go back out as lists.
        let value = serde_json::to_value(&multi).unwrap();
        assert!(value["urls"].is_array());
        assert_eq!(value["urls"][1], "turns:turn.example.com:443");
    }

    #[test]
    fn test_chat_broadcast_is_flattened() {
        let msg = ServerMessage::ChatBroadcast(ChatMessage {
            id: "m1".to_string(),
            sender_id: "a".to_string(),
            sender_nickname: "ana".to_string(),
            body: "hello".to_string(),
            timestamp: 42,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "chat_broadcast");
        assert_eq!(value["senderNickname"], "ana");
        assert_eq!(value["timestamp"], 42);

        let parsed: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_state_changed_and_member_left_serialization() {
        let json = serde_json::to_string(&ServerMessage::StateChanged {
            id: "a".to_string(),
            is_muted: true,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"state_changed\""));
        assert!(json.contains("\"isMuted\":true"));

        let json = serde_json::to_string(&ServerMessage::MemberLeft { id: "a".to_string() }).unwrap();
        assert_eq!(json, r#"{"type":"member_left","id":"a"}"#);
    }

    #[test]
    fn test_pong_serialization() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
