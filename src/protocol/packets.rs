use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::exceptions::ProtocolError;
use crate::protocol::codec::{PacketReader, write_bytes, write_string, write_varint};
use crate::protocol::consts::*;

/// Fixed client UUID announced by the status client
pub const CLIENT_UUID: [u8; UUID_LEN] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
];

/// Locale sent in Connect when none is configured
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// One frame read from or written to a stream
///
/// `length` counts the packet id and the payload, so it is always `4 + payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet identifier, see `protocol::consts`
    pub id: u32,
    /// Byte count of the id and payload
    pub length: u32,
    /// Raw body after the id
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: u32, payload: Vec<u8>) -> Self {
        Self {
            id,
            length: (FRAME_ID_SIZE + payload.len()) as u32,
            payload,
        }
    }

    /// Frame bytes: length, id, payload
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_LENGTH_SIZE + self.length as usize);
        buf.extend_from_slice(&self.length.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn name(&self) -> &'static str {
        packet_name(self.id)
    }
}

/// Client identification, the first packet of every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// 64 hex characters identifying the protocol revision
    pub protocol_hash: String,
    /// Game or editor client
    pub client_type: ClientType,
    /// Client locale, for example "en-US"
    pub language: String,
    /// Authentication token, empty for anonymous status queries
    pub identity_token: String,
    /// Client UUID, sent as 16 raw bytes
    pub client_uuid: [u8; UUID_LEN],
    /// Name reported to the server
    pub username: String,
    /// Opaque referral blob, encoded as empty bytes when absent
    pub referral_data: Option<Vec<u8>>,
    /// Where the referral came from
    pub referral_source: String,
}

impl ConnectPacket {
    /// Game client Connect with the built-in protocol hash and default locale
    pub fn new(username: &str) -> Self {
        Self {
            protocol_hash: PROTOCOL_HASH.to_string(),
            client_type: ClientType::Game,
            language: DEFAULT_LANGUAGE.to_string(),
            identity_token: String::new(),
            client_uuid: CLIENT_UUID,
            username: username.to_string(),
            referral_data: None,
            referral_source: String::new(),
        }
    }

    /// Replaces the protocol hash after checking length and hex alphabet
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidFieldLength`] if the hash is not 64 bytes,
    /// [`ProtocolError::InvalidProtocolHash`] if it is not hex.
    pub fn with_protocol_hash(mut self, hash: &str) -> Result<Self, ProtocolError> {
        if hash.len() != PROTOCOL_HASH_LEN {
            return Err(ProtocolError::InvalidFieldLength {
                field: "protocol_hash",
                expected: PROTOCOL_HASH_LEN,
                actual: hash.len(),
            });
        }
        if hex::decode(hash).is_err() {
            return Err(ProtocolError::InvalidProtocolHash);
        }
        self.protocol_hash = hash.to_string();
        Ok(self)
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = client_type;
        self
    }
}

/// Serializes a Connect packet into a complete frame
///
/// The leading length field is backfilled with the number of bytes that follow it.
///
/// # Errors
///
/// [`ProtocolError::InvalidFieldLength`] if `protocol_hash` is not exactly 64 bytes.
pub fn serialize_connect_packet(packet: &ConnectPacket) -> Result<Vec<u8>, ProtocolError> {
    let hash = packet.protocol_hash.as_bytes();
    if hash.len() != PROTOCOL_HASH_LEN {
        return Err(ProtocolError::InvalidFieldLength {
            field: "protocol_hash",
            expected: PROTOCOL_HASH_LEN,
            actual: hash.len(),
        });
    }

    let referral = packet.referral_data.as_deref().unwrap_or_default();
    let capacity = FRAME_LENGTH_SIZE
        + FRAME_ID_SIZE
        + PROTOCOL_HASH_LEN
        + 1
        + UUID_LEN
        + 5 * MAX_VARINT_LEN
        + packet.language.len()
        + packet.identity_token.len()
        + packet.username.len()
        + referral.len()
        + packet.referral_source.len();

    let mut buf = Vec::with_capacity(capacity);
    buf.extend_from_slice(&[0u8; FRAME_LENGTH_SIZE]);
    buf.extend_from_slice(&PACKET_CONNECT.to_le_bytes());
    buf.extend_from_slice(hash);
    buf.push(packet.client_type.as_byte());
    write_string(&mut buf, &packet.language);
    write_string(&mut buf, &packet.identity_token);
    buf.extend_from_slice(&packet.client_uuid);
    write_string(&mut buf, &packet.username);
    write_bytes(&mut buf, referral);
    write_string(&mut buf, &packet.referral_source);

    let length = (buf.len() - FRAME_LENGTH_SIZE) as u32;
    buf[..FRAME_LENGTH_SIZE].copy_from_slice(&length.to_le_bytes());

    Ok(buf)
}

/// Status reply of a server
///
/// Payload layout, all integers little-endian:
///
/// ```text
/// player_count:i32 | max_players:i32 |
/// server_name:VarString | motd:VarString | protocol_hash:VarString | server_version:VarString |
/// [extra_count:VarInt | (key:VarString | value:VarBytes) * extra_count]
/// ```
///
/// The extra block is optional. Bytes after it are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPacket {
    pub player_count: i32,
    pub max_players: i32,
    pub server_name: String,
    pub motd: String,
    pub protocol_hash: String,
    pub server_version: String,
    pub extra: BTreeMap<String, Vec<u8>>,
}

impl StatusPacket {
    /// Encodes the payload in the layout read by [`decode_status_packet`]
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.player_count.to_le_bytes());
        buf.extend_from_slice(&self.max_players.to_le_bytes());
        write_string(&mut buf, &self.server_name);
        write_string(&mut buf, &self.motd);
        write_string(&mut buf, &self.protocol_hash);
        write_string(&mut buf, &self.server_version);
        if !self.extra.is_empty() {
            write_varint(&mut buf, self.extra.len() as u32);
            for (key, value) in &self.extra {
                write_string(&mut buf, key);
                write_bytes(&mut buf, value);
            }
        }
        buf
    }

    /// Builds the online result for `address`
    pub fn to_server_status(&self, address: &str, latency: Duration) -> ServerStatus {
        ServerStatus {
            address: address.to_string(),
            online: true,
            motd: Some(self.motd.clone()).filter(|m| !m.is_empty()),
            server_version: Some(self.server_version.clone()).filter(|v| !v.is_empty()),
            players: Players {
                online: self.player_count.max(0),
                max: self.max_players.max(0),
            },
            latency_ms: latency.as_millis() as i64,
            packet_type: packet_name(PACKET_STATUS).to_string(),
            error_message: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Decodes a Status payload
///
/// # Errors
///
/// [`ProtocolError::TruncatedData`] or [`ProtocolError::MalformedVarint`] if a
/// mandatory field is cut short, [`ProtocolError::InvalidUtf8`] for bad strings.
pub fn decode_status_packet(payload: &[u8]) -> Result<StatusPacket, ProtocolError> {
    let mut reader = PacketReader::new(payload);

    let player_count = reader.read_i32_le()?;
    let max_players = reader.read_i32_le()?;
    let server_name = reader.read_string()?;
    let motd = reader.read_string()?;
    let protocol_hash = reader.read_string()?;
    let server_version = reader.read_string()?;

    let mut extra = BTreeMap::new();
    if !reader.is_empty() {
        let count = reader.read_varint()?;
        for _ in 0..count {
            let key = reader.read_string()?;
            let value = reader.read_bytes()?.to_vec();
            extra.insert(key, value);
        }
    }

    Ok(StatusPacket {
        player_count,
        max_players,
        server_name,
        motd,
        protocol_hash,
        server_version,
        extra,
    })
}

/// Player counts of a status result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub online: i32,
    pub max: i32,
}

/// Result of one status query, handed to the caller and the cache
///
/// Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    address: String,
    online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    motd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_version: Option<String>,
    players: Players,
    latency_ms: i64,
    packet_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    timestamp: i64,
}

impl ServerStatus {
    /// Offline result carrying the failure cause
    ///
    /// `packet_type` names the packet received, or `"none"` when nothing arrived.
    pub fn offline(address: &str, error: impl ToString, latency: Duration, packet_type: &str) -> Self {
        Self {
            address: address.to_string(),
            online: false,
            motd: None,
            server_version: None,
            players: Players::default(),
            latency_ms: latency.as_millis() as i64,
            packet_type: packet_type.to_string(),
            error_message: Some(error.to_string()),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn online(&self) -> bool {
        self.online
    }

    pub fn motd(&self) -> Option<&str> {
        self.motd.as_deref()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn players(&self) -> Players {
        self.players
    }

    pub fn latency_ms(&self) -> i64 {
        self.latency_ms
    }

    pub fn packet_type(&self) -> &str {
        &self.packet_type
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
