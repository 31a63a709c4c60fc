mod codec;
mod command;
mod handshake;

pub use codec::{ReplyCodec, ReplyMarker};
pub use command::{Command, FailPayload};
pub use handshake::Hi;

use faktory_core::JobError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown reply marker: 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("Server returned an error: {0}")]
    Server(String),

    #[error("Malformed reply frame: {0}")]
    MalformedFrame(String),

    #[error("Reply line exceeds {0} bytes without a terminator")]
    LineTooLong(usize),

    #[error("Bulk reply too large: {0} bytes")]
    ReplyTooLarge(usize),

    #[error("Reply is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Command payload must not contain CR or LF: {0}")]
    InvalidPayload(String),

    #[error("Invalid server greeting: {0}")]
    InvalidGreeting(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// The only protocol version this client speaks
pub const PROTOCOL_VERSION: u32 = 2;

/// Longest reply line accepted before its CRLF
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Largest bulk payload accepted
pub const MAX_REPLY_SIZE: usize = 16 * 1024 * 1024;
