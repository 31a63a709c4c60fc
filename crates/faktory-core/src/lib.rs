mod job;
mod priority;
mod state;
mod error;

pub use job::{Job, JobBuilder, JobId, JobOptions};
pub use priority::Priority;
pub use state::{BeatResponse, ConsumerState};
pub use error::{JobError, Result};

/// Queue used when a job or a fetch names none
pub const DEFAULT_QUEUE: &str = "default";

/// Keys owned by the job itself; options can never override them
pub const RESERVED_KEYS: [&str; 3] = ["jid", "jobtype", "args"];

/// Server default for `reserve_for`, in seconds
pub const DEFAULT_RESERVE_FOR: u64 = 1800;

/// Smallest `reserve_for` the server accepts, in seconds
pub const MIN_RESERVE_FOR: u64 = 60;

/// Server default for `retry`
pub const DEFAULT_RETRY: i64 = 25;
