//! Blocking client for the Faktory job server protocol.
//!
//! A [`Connection`] owns one socket and performs the `HI`/`HELLO`
//! handshake lazily on first use. [`Producer`] pushes jobs over it and
//! [`Consumer`] runs the worker side: fetch, ack, fail and heartbeat.
//!
//! ```no_run
//! use faktory_client::{Connection, ConnectionConfig, Producer};
//! use faktory_core::Job;
//!
//! let mut connection = Connection::new(ConnectionConfig::new("127.0.0.1", 7419));
//! let mut producer = Producer::new(&mut connection);
//! producer.push(&Job::new("job-1", "send_email", vec![]))?;
//! # Ok::<(), faktory_client::ClientError>(())
//! ```

mod config;
mod connection;
mod consumer;
mod producer;
mod transport;

#[cfg(test)]
mod testing;

pub use config::{ConnectionConfig, DEFAULT_PORT};
pub use connection::Connection;
pub use consumer::Consumer;
pub use producer::Producer;
pub use transport::{Connector, TcpConnector};

use faktory_core::JobError;
use faktory_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("Unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: &'static str, reply: String },

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("{0}")]
    InvalidGreeting(String),

    #[error("Unsupported server version {actual} (expected {expected})")]
    UnsupportedVersion { expected: u32, actual: u32 },

    #[error("Server rejected HELLO: {0}")]
    Rejected(String),
}

/// Coarse classification of a [`ClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket failure, premature close or broken framing
    Transport,
    /// Greeting or version negotiation failed
    Handshake,
    /// The server answered with an error reply
    Server,
    /// The client was set up without what the operation needs
    Configuration,
    /// A reply could not be understood
    ProtocolViolation,
    /// A job could not be built or parsed
    Job,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) | ClientError::ConnectionClosed => ErrorKind::Transport,
            ClientError::Handshake(_) => ErrorKind::Handshake,
            ClientError::Server(_) => ErrorKind::Server,
            ClientError::Configuration(_) => ErrorKind::Configuration,
            ClientError::UnexpectedReply { .. } => ErrorKind::ProtocolViolation,
            ClientError::Job(_) => ErrorKind::Job,
            ClientError::Protocol(error) => match error {
                ProtocolError::UnknownMarker(_) | ProtocolError::SerializationError(_) => {
                    ErrorKind::ProtocolViolation
                }
                ProtocolError::Server(_) => ErrorKind::Server,
                ProtocolError::InvalidGreeting(_) => ErrorKind::Handshake,
                ProtocolError::Job(_) => ErrorKind::Job,
                ProtocolError::InvalidPayload(_) => ErrorKind::Configuration,
                ProtocolError::MalformedFrame(_)
                | ProtocolError::LineTooLong(_)
                | ProtocolError::ReplyTooLarge(_)
                | ProtocolError::InvalidUtf8(_)
                | ProtocolError::IoError(_) => ErrorKind::Transport,
            },
        }
    }

    /// Whether the server closed the socket under us
    pub fn is_connection_closed(&self) -> bool {
        match self {
            ClientError::ConnectionClosed => true,
            ClientError::Transport(error) => matches!(
                error.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Server(message) => ClientError::Server(message),
            ProtocolError::IoError(error) => ClientError::Transport(error),
            ProtocolError::Job(error) => ClientError::Job(error),
            other => ClientError::Protocol(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
