use crate::{ProtocolError, Result, PROTOCOL_VERSION};
use serde::Deserialize;

/// Greeting sent by the server when a connection opens: `HI{"v":2}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hi {
    /// Protocol version spoken by the server
    pub v: u32,
}

impl Hi {
    pub const PREFIX: &'static str = "HI";

    /// Parse the decoded greeting reply
    pub fn parse(reply: &str) -> Result<Self> {
        let json = reply.strip_prefix(Self::PREFIX).ok_or_else(|| {
            ProtocolError::InvalidGreeting(format!("expected HI, got {:?}", reply))
        })?;

        serde_json::from_str(json)
            .map_err(|e| ProtocolError::InvalidGreeting(format!("{} in {:?}", e, json)))
    }

    pub fn is_supported(&self) -> bool {
        self.v == PROTOCOL_VERSION
    }
}
