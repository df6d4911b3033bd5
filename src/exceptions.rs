use thiserror::Error;

/// Root error for the status client
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

/// Errors of the binary codec and packet model
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("varint is longer than 5 bytes")]
    MalformedVarint,

    #[error("truncated data: needed {needed} bytes, {available} available")]
    TruncatedData { needed: usize, available: usize },

    #[error("invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidFieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("protocol hash must be ASCII hex")]
    InvalidProtocolHash,

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Errors of the QUIC session and the framing on top of its streams
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to establish QUIC connection to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("failed to open stream: {0}")]
    StreamOpenFailed(String),

    #[error("failed to accept stream: {0}")]
    StreamAcceptFailed(String),

    #[error("stream closed before {expected} bytes arrived")]
    ShortRead { expected: usize },

    #[error("packet too large: {length} bytes (max {max})")]
    PacketTooLarge { length: u32, max: u32 },

    #[error("invalid packet length: {0}")]
    InvalidPacketLength(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cause of a failed send or receive step
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure of one status query attempt
///
/// The Display text of each variant ends up in `ServerStatus::error_message`.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] StepError),

    #[error("failed to send connect packet: {0}")]
    SendFailed(#[source] StepError),

    #[error("failed to receive response: {0}")]
    ReceiveFailed(#[source] StepError),

    #[error("unexpected packet ID: {0}")]
    UnexpectedPacketId(u32),

    #[error("failed to decode status packet: {0}")]
    DecodeFailed(#[source] ProtocolError),
}

/// Errors of configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Result alias for the crate
pub type Result<T> = std::result::Result<T, StatusError>;
