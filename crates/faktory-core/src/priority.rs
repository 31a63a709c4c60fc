use crate::JobError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Job priority as understood by the server.
/// Higher values are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 9;

    /// Server default when a job carries no priority
    pub const DEFAULT: u8 = 5;

    /// Create a priority, rejecting values outside 1-9
    pub fn new(value: u8) -> Result<Self, JobError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Priority(value))
        } else {
            Err(JobError::InvalidPriority(value))
        }
    }

    pub fn high() -> Self {
        Priority(Self::MAX)
    }

    pub fn normal() -> Self {
        Priority(Self::DEFAULT)
    }

    pub fn low() -> Self {
        Priority(Self::MIN)
    }

    /// Get the raw priority value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Get the tier name
    pub fn tier(&self) -> &'static str {
        match self.0 {
            7..=9 => "high",
            4..=6 => "normal",
            _ => "low",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::normal()
    }
}

impl TryFrom<u8> for Priority {
    type Error = JobError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
