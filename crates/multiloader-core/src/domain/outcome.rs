//! Outcome of running one sub-experiment.

use serde::{Deserialize, Serialize};

/// Result of all attempts made for a sub-experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Whether any attempt exited successfully.
    pub succeeded: bool,
    /// Number of engine invocations made (1 = no retry used).
    pub attempts: u32,
    /// Error of the last failed attempt, if any.
    pub last_error: Option<String>,
}

impl RunOutcome {
    pub fn success(attempts: u32) -> Self {
        Self {
            succeeded: true,
            attempts,
            last_error: None,
        }
    }

    pub fn failure(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            attempts,
            last_error: Some(error.into()),
        }
    }
}
