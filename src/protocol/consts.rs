//! Protocol constants
//!
//! Packet identifiers, enum discriminants and size bounds of the Hytale wire protocol.

/// Protocol hash sent in Connect, 64 ASCII hex characters
pub const PROTOCOL_HASH: &str = "6708f121966c1c443f4b0eb525b2f81d0a8dc61f5003a692a8fa157e5e02cea9";

/// Length of the protocol hash on the wire
pub const PROTOCOL_HASH_LEN: usize = 64;

/// Length of the raw client UUID on the wire
pub const UUID_LEN: usize = 16;

/// Default server port
pub const DEFAULT_PORT: u16 = 5520;

/// Hard ceiling for a frame length accepted by the protocol
pub const MAX_PACKET_SIZE: u32 = 1_677_721_600;

/// ALPN identifier negotiated during the QUIC handshake
pub const ALPN: &[u8] = b"hytale/1";

/// Size of the little-endian length prefix of a frame
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Size of the little-endian packet id of a frame
pub const FRAME_ID_SIZE: usize = 4;

/// Maximum number of bytes of a 32-bit varint
pub const MAX_VARINT_LEN: usize = 5;

/// Client identification request
pub const PACKET_CONNECT: u32 = 0;

/// Session termination
pub const PACKET_DISCONNECT: u32 = 1;

/// Latency probe
pub const PACKET_PING: u32 = 2;

/// Latency probe answer
pub const PACKET_PONG: u32 = 3;

/// Server status reply
pub const PACKET_STATUS: u32 = 10;

/// Authentication token
pub const PACKET_AUTH_TOKEN: u32 = 12;

/// Connection accepted by the server
pub const PACKET_CONNECT_ACCEPT: u32 = 14;

/// Human readable name of a packet id
pub fn packet_name(id: u32) -> &'static str {
    match id {
        PACKET_CONNECT => "connect",
        PACKET_DISCONNECT => "disconnect",
        PACKET_PING => "ping",
        PACKET_PONG => "pong",
        PACKET_STATUS => "status",
        PACKET_AUTH_TOKEN => "auth_token",
        PACKET_CONNECT_ACCEPT => "connect_accept",
        _ => "unknown",
    }
}

/// Kind of client announced in Connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClientType {
    #[default]
    Game = 0,
    Editor = 1,
}

impl ClientType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Reason codes used when closing a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectType {
    Normal = 0,
    Crash = 1,
}

impl DisconnectType {
    pub fn code(self) -> u32 {
        self as u32
    }
}
