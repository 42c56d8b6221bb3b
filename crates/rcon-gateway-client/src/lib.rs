//! # rcon-gateway-client
//!
//! Minecraft RCON protocol client for the RCON gateway.
//!
//! This crate provides:
//! - Packet framing (length-prefixed little-endian frames)
//! - An authenticated TCP connection with reconnect and retry budget
//! - Multi-packet response reassembly via the dummy-terminator trick

pub mod connection;
pub mod packet;

pub use connection::{Connection, ConnectionConfig, RetryBudget};
pub use packet::{Packet, PacketKind};
