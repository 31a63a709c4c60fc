/// Outcome of a heartbeat, as directed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatResponse {
    /// Liveness acknowledged, nothing to change
    Continue,
    /// Stop fetching new work
    Quiet,
    /// Stop everything and close the connection
    Terminate,
}

impl BeatResponse {
    pub const QUIET: &'static str = "quiet";
    pub const TERMINATE: &'static str = "terminate";

    /// Parse the `state` value of a BEAT reply
    pub fn from_state(state: &str) -> Option<Self> {
        match state {
            Self::QUIET => Some(BeatResponse::Quiet),
            Self::TERMINATE => Some(BeatResponse::Terminate),
            _ => None,
        }
    }
}

/// Lifecycle of a consumer as commanded through heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsumerState {
    /// Fetch, ack and fail freely
    #[default]
    Running,
    /// No new fetches; keep beating and finish in-flight jobs
    Quiet,
    /// Stop all work and end the connection
    Terminated,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Running => "running",
            ConsumerState::Quiet => "quiet",
            ConsumerState::Terminated => "terminated",
        }
    }

    /// Next state after a heartbeat. Terminated is absorbing and
    /// quiet never goes back to running.
    pub fn apply(self, response: BeatResponse) -> Self {
        match (self, response) {
            (ConsumerState::Terminated, _) => ConsumerState::Terminated,
            (_, BeatResponse::Terminate) => ConsumerState::Terminated,
            (_, BeatResponse::Quiet) => ConsumerState::Quiet,
            (state, BeatResponse::Continue) => state,
        }
    }

    pub fn can_fetch(&self) -> bool {
        matches!(self, ConsumerState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsumerState::Terminated)
    }
}
