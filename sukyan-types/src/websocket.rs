use crate::history::HeaderList;
use serde::{Deserialize, Serialize};
use sukyan_common::{HistoryId, ScanId, WorkspaceId, WsConnectionId, WsMessageId};

/// A WebSocket opcode as defined by RFC 6455. The wire interceptor (spec §6)
/// records this as a floating-point number in persisted messages; this type
/// converts both ways so downstream readers tolerate either typing (spec §9
/// open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0,
    Text = 1,
    Binary = 2,
    Close = 8,
    Ping = 9,
    Pong = 10,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Continuation),
            1 => Some(Self::Text),
            2 => Some(Self::Binary),
            8 => Some(Self::Close),
            9 => Some(Self::Ping),
            10 => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    pub fn as_f64(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        Self::from_u8(value.round() as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WsDirection {
    Sent,
    Received,
}

/// A captured WebSocket connection. Immutable except for `closed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConnection {
    pub id: WsConnectionId,
    pub url: String,
    pub request_headers: HeaderList,
    pub response_headers: HeaderList,
    pub status: Option<u16>,
    pub workspace_id: Option<WorkspaceId>,
    pub scan_id: Option<ScanId>,
    /// The upgrade handshake's history record, if the proxy captured one.
    pub upgrade_history_id: Option<HistoryId>,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
}

impl WsConnection {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// A single WebSocket frame payload, stored as text or base64-encoded binary
/// per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    pub id: WsMessageId,
    pub connection_id: WsConnectionId,
    pub opcode: Opcode,
    pub mask: bool,
    /// Text payload, or base64 when `is_binary` is set.
    pub payload: String,
    pub is_binary: bool,
    pub timestamp: i64,
    pub direction: WsDirection,
}

impl WsMessage {
    pub fn payload_bytes(&self) -> Vec<u8> {
        use base64::Engine as _;
        if self.is_binary {
            base64::engine::general_purpose::STANDARD
                .decode(&self.payload)
                .unwrap_or_default()
        } else {
            self.payload.as_bytes().to_vec()
        }
    }

    pub fn text(&self) -> Option<&str> {
        if self.is_binary {
            None
        } else {
            Some(&self.payload)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsConnectionFilter {
    pub workspace_id: Option<WorkspaceId>,
    pub scan_id: Option<ScanId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsMessageFilter {
    pub connection_id: Option<WsConnectionId>,
    pub direction: Option<WsDirection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_f64() {
        for op in [
            Opcode::Continuation,
            Opcode::Text,
            Opcode::Binary,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ] {
            let f = op.as_f64();
            assert_eq!(Opcode::from_f64(f), Some(op));
        }
    }

    #[test]
    fn opcode_from_u8_rejects_reserved_values() {
        assert_eq!(Opcode::from_u8(3), None);
    }

    #[test]
    fn control_opcodes_are_flagged() {
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Text.is_control());
    }

    #[test]
    fn text_message_exposes_text() {
        let msg = WsMessage {
            id: sukyan_common::WsMessageId::new("m1"),
            connection_id: sukyan_common::WsConnectionId::new("c1"),
            opcode: Opcode::Text,
            mask: false,
            payload: "hello world".to_string(),
            is_binary: false,
            timestamp: 0,
            direction: WsDirection::Received,
        };
        assert_eq!(msg.text(), Some("hello world"));
        assert_eq!(msg.payload_bytes(), b"hello world".to_vec());
    }
}
