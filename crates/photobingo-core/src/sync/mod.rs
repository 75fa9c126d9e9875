//! Participant data loading: batching, bounded concurrency, retries and
//! background neighbor preloading.

mod backoff;
mod loader;

pub use backoff::Backoff;
pub use loader::SyncLoader;

use thiserror::Error;

use crate::api::{ApiError, FailureClass};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Permission denied loading {target}: {source}")]
    PermissionDenied {
        target: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to load {target} after {attempts} attempt(s): {source}")]
    Transient {
        target: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("Malformed data for {target}: {source}")]
    Malformed {
        target: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to load {target}: {source}")]
    Failed {
        target: String,
        #[source]
        source: ApiError,
    },

    #[error("All {attempted} participant loads failed")]
    AllFailed {
        attempted: usize,
        failures: Vec<(String, SyncError)>,
    },

    #[error("Loader has been shut down")]
    Closed,
}

impl SyncError {
    /// Map a remote failure onto the loader's error taxonomy. Not-found is
    /// reported as `Failed` here; callers that treat it as empty data check
    /// for it before classifying.
    pub(crate) fn classify(target: &str, source: ApiError) -> Self {
        let target = target.to_string();
        match source.class() {
            FailureClass::Denied => SyncError::PermissionDenied { target, source },
            FailureClass::Transient => SyncError::Transient {
                target,
                attempts: 1,
                source,
            },
            FailureClass::Malformed => SyncError::Malformed { target, source },
            FailureClass::NotFound | FailureClass::Other => SyncError::Failed { target, source },
        }
    }

    /// Whether replaying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transient { .. } => true,
            SyncError::AllFailed { failures, .. } => {
                failures.iter().any(|(_, e)| e.is_retryable())
            }
            _ => false,
        }
    }
}

/// Scheduling hint attached to a batch. Only affects logging order today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchPriority {
    Low,
    Normal,
    High,
}

/// Outcome of a `load_batch` call that loaded at least one participant.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, SyncError)>,
    pub batches: usize,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
