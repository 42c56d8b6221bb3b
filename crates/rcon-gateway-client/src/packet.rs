//! RCON packet framing
//!
//! A frame on the wire is `length:i32le, request_id:i32le, type:i32le, body,
//! 0x00 0x00`, where `length` counts everything after itself, i.e.
//! `len(body) + 10`.
//!
//! Packet format reference: https://minecraft.wiki/w/RCON#Packet_format

use rcon_gateway_core::{RconError, Result};
use std::borrow::Cow;
use tracing::debug;

/// Frame bytes that are not body: request id (4) + type (4) + two nulls (2)
pub const PACKET_METADATA_LEN: usize = 10;

/// Upper bound accepted for a single frame's declared length; the server
/// caps response fragments far below this, so anything larger is garbage.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Types for an RCON TCP packet
///
/// Authentication *failure* is reported through a response request id of -1,
/// not through the error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// The server signals an error
    Error,
    /// Response payload, possibly one of several parts
    Multi,
    /// Execute a command
    Command,
    /// Authenticate with the RCON password
    Auth,
    /// Client-side trick: the server answers this unknown type with a single
    /// error packet, which terminates a multi-packet response stream
    Dummy,
}

impl PacketKind {
    /// The wire protocol value
    pub fn as_i32(self) -> i32 {
        match self {
            PacketKind::Error => -1,
            PacketKind::Multi => 0,
            PacketKind::Command => 2,
            PacketKind::Auth => 3,
            PacketKind::Dummy => 200,
        }
    }
}

/// A single RCON packet
///
/// `kind` stays a raw i32 on the decode side: the server may answer with
/// types we never send, and correlation runs on request ids anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    /// A command packet carrying `body` verbatim
    pub fn command(id: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind: PacketKind::Command.as_i32(),
            body: body.into(),
        }
    }

    /// The authentication packet; always request id 0
    pub fn auth(password: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind: PacketKind::Auth.as_i32(),
            body: password.into(),
        }
    }

    /// An empty packet of the unknown type 200, used as a response terminator
    pub fn dummy(id: i32) -> Self {
        Self {
            id,
            kind: PacketKind::Dummy.as_i32(),
            body: String::new(),
        }
    }

    /// Serialize to a length-prefixed frame
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = body.len() + PACKET_METADATA_LEN;

        let mut frame = Vec::with_capacity(4 + length);
        frame.extend_from_slice(&(length as i32).to_le_bytes());
        frame.extend_from_slice(&self.id.to_le_bytes());
        frame.extend_from_slice(&self.kind.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0, 0]);
        frame
    }

    /// Parse a frame payload (everything after the length prefix)
    ///
    /// The body is the payload minus the id, type, and the two trailing
    /// nulls; interior null bytes are part of the body and are preserved.
    /// Minecraft has been seen emitting invalid UTF-8, so the body decodes
    /// lossily rather than failing the frame.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < PACKET_METADATA_LEN {
            return Err(RconError::Protocol(format!(
                "frame payload too short: {} bytes",
                payload.len()
            )));
        }

        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body = match String::from_utf8_lossy(&payload[8..payload.len() - 2]) {
            Cow::Borrowed(body) => body.to_owned(),
            Cow::Owned(body) => {
                debug!(id, "response body contained invalid UTF-8, decoded lossily");
                body
            }
        };

        Ok(Self { id, kind, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: &Packet) -> Packet {
        let frame = packet.encode();
        let declared = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(declared, frame.len() - 4);
        Packet::decode(&frame[4..]).unwrap()
    }

    #[test]
    fn command_frame_round_trips() {
        let packet = Packet::command(42, "say hello world");
        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn empty_body_round_trips() {
        let packet = Packet::dummy(1002);
        let decoded = round_trip(&packet);
        assert_eq!(decoded.body, "");
        assert_eq!(decoded.id, 1002);
        assert_eq!(decoded.kind, 200);
    }

    #[test]
    fn embedded_nulls_are_preserved() {
        let packet = Packet {
            id: 7,
            kind: PacketKind::Multi.as_i32(),
            body: "before\0after".into(),
        };
        assert_eq!(round_trip(&packet).body, "before\0after");
    }

    #[test]
    fn auth_frame_has_request_id_zero() {
        let frame = Packet::auth("hunter2").encode();

        // length = body (7) + metadata (10)
        assert_eq!(i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]), 17);
        // request id
        assert_eq!(i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]), 0);
        // type
        assert_eq!(i32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]), 3);
        // trailing nulls
        assert_eq!(&frame[frame.len() - 2..], &[0, 0]);
    }

    #[test]
    fn negative_ids_survive_the_codec() {
        let packet = Packet {
            id: -1,
            kind: PacketKind::Error.as_i32(),
            body: String::new(),
        };
        let decoded = round_trip(&packet);
        assert_eq!(decoded.id, -1);
        assert_eq!(decoded.kind, -1);
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        assert!(matches!(
            Packet::decode(&[0, 0, 0, 0, 2, 0]),
            Err(RconError::Protocol(_))
        ));
    }

    #[test]
    fn invalid_utf8_decodes_lossily() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&5i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&[0xff, 0xfe]);
        payload.extend_from_slice(&[0, 0]);

        let decoded = Packet::decode(&payload).unwrap();
        assert_eq!(decoded.body, "\u{fffd}\u{fffd}");
    }
}
