use crate::{ClientError, Connection, Connector, Result, TcpConnector};
use faktory_core::{BeatResponse, ConsumerState, Job};
use faktory_protocol::{Command, FailPayload, ProtocolError};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
struct BeatReply {
    #[serde(default)]
    state: Option<String>,
}

/// Worker side of the protocol: fetch, ack, fail and heartbeat.
///
/// Tracks the lifecycle state the server commands through heartbeats.
/// The state is advisory; it is up to the caller to stop fetching once
/// quiet and to call [`end`](Consumer::end) once terminated.
pub struct Consumer<'c, C: Connector = TcpConnector> {
    connection: &'c mut Connection<C>,
    wid: String,
    state: ConsumerState,
}

impl<'c, C: Connector> Consumer<'c, C> {
    /// Fails before any I/O unless the connection carries worker options with a `wid`
    pub fn new(connection: &'c mut Connection<C>) -> Result<Self> {
        if connection.worker_options().is_empty() {
            return Err(ClientError::Configuration(
                "consumer connections must include worker options".to_string(),
            ));
        }

        let wid = match connection.config().wid() {
            Some(wid) if !wid.is_empty() => wid.to_string(),
            _ => {
                return Err(ClientError::Configuration(
                    "consumer worker ID (wid) is required".to_string(),
                ))
            }
        };

        Ok(Consumer {
            connection,
            wid,
            state: ConsumerState::Running,
        })
    }

    pub fn wid(&self) -> &str {
        &self.wid
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Fetch the next job from the given queues, or from `default` if none.
    /// Returns `None` when no job is waiting.
    pub fn fetch<I, S>(&mut self, queues: I) -> Result<Option<Job>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.state.can_fetch() {
            warn!(state = self.state.as_str(), "Fetching after the server asked this worker to stop");
        }

        let queues: Vec<S> = queues.into_iter().collect();
        let names: Vec<&str> = queues.iter().map(|queue| queue.as_ref()).collect();

        let reply = self.connection.send_command(Command::Fetch(names))?;
        if reply.is_empty() {
            return Ok(None);
        }

        let job = Job::from_json(&reply)?;
        debug!(jid = job.id(), jobtype = job.job_type(), "Fetched job");
        Ok(Some(job))
    }

    /// Report a job as successfully processed
    pub fn ack(&mut self, job: &Job) -> Result<()> {
        self.connection.send_command(Command::Ack { jid: job.id() })?;
        Ok(())
    }

    /// Report a job as failed so the server can retry it
    pub fn fail(
        &mut self,
        job: &Job,
        err_type: &str,
        message: &str,
        backtrace: &[String],
    ) -> Result<()> {
        self.connection.send_command(Command::Fail(FailPayload {
            jid: job.id(),
            err_type,
            message,
            backtrace,
        }))?;
        Ok(())
    }

    /// Report a job as failed with an error value. The error's type name
    /// becomes the error type and its source chain the backtrace.
    pub fn fail_with<E>(&mut self, job: &Job, error: &E) -> Result<()>
    where
        E: std::error::Error,
    {
        let err_type = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error");

        let mut backtrace = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            backtrace.push(cause.to_string());
            source = cause.source();
        }

        self.fail(job, err_type, &error.to_string(), &backtrace)
    }

    /// Send a heartbeat and apply any state change the server requests
    pub fn beat(&mut self) -> Result<BeatResponse> {
        let reply = self
            .connection
            .send_command(Command::Beat { wid: &self.wid })?;
        let response = parse_beat(reply)?;

        let next = self.state.apply(response);
        if next != self.state {
            info!(
                from = self.state.as_str(),
                to = next.as_str(),
                "Server changed worker state"
            );
        }
        self.state = next;

        Ok(response)
    }

    /// Gracefully end the session
    pub fn end(&mut self) -> Result<()> {
        self.connection.end()
    }
}

fn parse_beat(reply: String) -> Result<BeatResponse> {
    if reply.starts_with("OK") {
        return Ok(BeatResponse::Continue);
    }

    let beat: BeatReply = serde_json::from_str(&reply)
        .map_err(|e| ClientError::Protocol(ProtocolError::SerializationError(e)))?;

    match beat.state.as_deref() {
        None | Some("") => Ok(BeatResponse::Continue),
        Some(state) => BeatResponse::from_state(state).ok_or(ClientError::UnexpectedReply {
            command: "BEAT",
            reply,
        }),
    }
}
