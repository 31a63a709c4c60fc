use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Missing required job field: {0}")]
    MissingField(&'static str),

    #[error("Job field {field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Invalid priority value: {0} (expected 1-9)")]
    InvalidPriority(u8),

    #[error("Invalid reserve_for value: {0} seconds (minimum is 60)")]
    InvalidReservation(u64),

    #[error("Option key is reserved for the job itself: {0}")]
    ReservedKey(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
