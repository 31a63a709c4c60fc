use crate::{Result, PROTOCOL_VERSION};
use faktory_core::{Job, DEFAULT_QUEUE};
use serde::Serialize;
use serde_json::{Map, Value};

/// Requests a client can send to the server
#[derive(Debug, Clone)]
pub enum Command<'a> {
    /// Complete the handshake with the given worker options
    Hello(&'a Map<String, Value>),

    /// Gracefully close the session
    End,

    /// Enqueue a job
    Push(&'a Job),

    /// Fetch one job from the named queues, in order
    Fetch(Vec<&'a str>),

    /// Report a fetched job as done
    Ack { jid: &'a str },

    /// Report a fetched job as failed
    Fail(FailPayload<'a>),

    /// Worker heartbeat
    Beat { wid: &'a str },

    /// Any other verb with an already-serialized payload
    Raw { verb: &'a str, payload: &'a str },
}

/// Body of a FAIL command
#[derive(Debug, Clone, Serialize)]
pub struct FailPayload<'a> {
    pub jid: &'a str,
    #[serde(rename = "errType")]
    pub err_type: &'a str,
    pub message: &'a str,
    pub backtrace: &'a [String],
}

#[derive(Serialize)]
struct AckPayload<'a> {
    jid: &'a str,
}

#[derive(Serialize)]
struct BeatPayload<'a> {
    wid: &'a str,
}

impl<'a> Command<'a> {
    pub fn verb(&self) -> &'a str {
        match self {
            Command::Hello(_) => "HELLO",
            Command::End => "END",
            Command::Push(_) => "PUSH",
            Command::Fetch(_) => "FETCH",
            Command::Ack { .. } => "ACK",
            Command::Fail(_) => "FAIL",
            Command::Beat { .. } => "BEAT",
            Command::Raw { verb, .. } => *verb,
        }
    }

    /// Serialize the command body, without the verb
    pub fn payload(&self) -> Result<String> {
        let payload = match self {
            Command::Hello(options) => {
                let mut hello = (*options).clone();
                hello.insert("v".to_string(), Value::from(PROTOCOL_VERSION));
                serde_json::to_string(&hello)?
            }
            Command::End => String::new(),
            Command::Push(job) => job.to_json()?,
            Command::Fetch(queues) => {
                let queues: Vec<&str> = queues
                    .iter()
                    .map(|queue| queue.trim())
                    .filter(|queue| !queue.is_empty())
                    .collect();
                if queues.is_empty() {
                    DEFAULT_QUEUE.to_string()
                } else {
                    queues.join(" ")
                }
            }
            Command::Ack { jid } => serde_json::to_string(&AckPayload { jid })?,
            Command::Fail(fail) => serde_json::to_string(fail)?,
            Command::Beat { wid } => serde_json::to_string(&BeatPayload { wid })?,
            Command::Raw { payload, .. } => payload.to_string(),
        };

        Ok(payload)
    }
}
