//! Board state machine: snapshot types, error records and the controller
//! that drives transitions.

mod board;
mod controller;

pub use board::BoardState;
pub use controller::StateController;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::SyncError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Whole board, all participants
    #[default]
    Card,
    /// A single participant's board
    Player,
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::Card => write!(f, "card"),
            View::Player => write!(f, "player"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Phase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ErrorKind {
    /// Bad input from the caller, e.g. an unknown participant
    Validation,
    NetworkTransient,
    PermissionDenied,
    /// The service answered with data of the wrong shape
    DataIntegrity,
    /// The board cannot be set up at all
    InitializationFatal,
    Unknown,
}

impl ErrorKind {
    pub fn can_retry(self) -> bool {
        self == ErrorKind::NetworkTransient
    }

    /// Which kind wins when several failures are summarised as one
    fn precedence(self) -> u8 {
        match self {
            ErrorKind::PermissionDenied => 5,
            ErrorKind::DataIntegrity => 4,
            ErrorKind::InitializationFatal => 3,
            ErrorKind::NetworkTransient => 2,
            ErrorKind::Validation => 1,
            ErrorKind::Unknown => 0,
        }
    }
}

impl From<&SyncError> for ErrorKind {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            SyncError::Transient { .. } => ErrorKind::NetworkTransient,
            SyncError::Malformed { .. } => ErrorKind::DataIntegrity,
            SyncError::AllFailed { .. } if err.is_retryable() => ErrorKind::NetworkTransient,
            SyncError::AllFailed { failures, .. } => failures
                .iter()
                .map(|(_, e)| ErrorKind::from(e))
                .max_by_key(|kind| kind.precedence())
                .unwrap_or(ErrorKind::Unknown),
            SyncError::Failed { .. } | SyncError::Closed => ErrorKind::Unknown,
        }
    }
}

/// A failed transition, replayable through `StateController::retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    Initialize {
        event_id: String,
        participant: Option<String>,
    },
    SwitchToParticipant(String),
    SwitchToCardView,
    Refresh,
}

/// The error record committed into `BoardState::last_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardError {
    pub kind: ErrorKind,
    pub message: String,
    pub can_retry: bool,
    pub retry_action: Option<PendingAction>,
    pub occurred_at: DateTime<Utc>,
}

impl BoardError {
    /// The retry action is kept only for retryable kinds.
    pub fn new(kind: ErrorKind, message: impl Into<String>, action: Option<PendingAction>) -> Self {
        let retry_action = action.filter(|_| kind.can_retry());
        Self {
            kind,
            message: message.into(),
            can_retry: retry_action.is_some(),
            retry_action,
            occurred_at: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, None)
    }
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
