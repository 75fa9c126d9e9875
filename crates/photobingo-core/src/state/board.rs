use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BoardError, Phase, View};
use crate::models::{ChallengeSquare, Participant, PhotoRecord};
use crate::stats::{CompletionStats, ParticipantProgress};

/// Immutable snapshot of the board. The controller never mutates a
/// committed snapshot; every transition builds and commits a new one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardState {
    pub phase: Phase,
    pub event_id: Option<String>,
    pub view: View,
    pub selected_participant: Option<String>,
    pub participants: Vec<Participant>,
    pub squares: Vec<ChallengeSquare>,
    pub photos: PhotoRecord,
    pub stats: Option<Arc<CompletionStats>>,
    pub participant_progress: Option<Arc<ParticipantProgress>>,
    pub last_error: Option<BoardError>,
    pub loading: bool,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl BoardState {
    pub fn is_initialized(&self) -> bool {
        self.event_id.is_some()
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.participant_index(name).is_some()
    }

    /// Position of `name` in roster order
    pub fn participant_index(&self, name: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.name == name)
    }

    pub fn participant_names(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.name.clone()).collect()
    }

    pub fn total_completions(&self) -> usize {
        self.stats.as_ref().map_or(0, |s| s.total_completions)
    }

    /// Copy of this state flagged as loading. Initialization also moves the
    /// phase to `Loading`; other transitions keep showing the current board.
    pub(crate) fn loading(&self, phase: Option<Phase>) -> Self {
        Self {
            phase: phase.unwrap_or(self.phase),
            loading: true,
            ..self.clone()
        }
    }

    /// Copy of this state carrying `error`. View and selection are untouched.
    pub(crate) fn with_error(&self, error: BoardError) -> Self {
        Self {
            phase: Phase::Error,
            last_error: Some(error),
            loading: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::roster;

    fn ready() -> BoardState {
        BoardState {
            phase: Phase::Ready,
            event_id: Some("picnic".into()),
            view: View::Player,
            selected_participant: Some("Ben".into()),
            participants: roster(&["Ana", "Ben", "Cy"]),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_uninitialized_card_view() {
        let state = BoardState::default();
        assert_eq!(state.phase, Phase::Uninitialized);
        assert_eq!(state.view, View::Card);
        assert!(!state.is_initialized());
        assert_eq!(state.total_completions(), 0);
    }

    #[test]
    fn test_roster_lookups() {
        let state = ready();
        assert_eq!(state.participant_index("Cy"), Some(2));
        assert!(state.has_participant("Ana"));
        assert!(!state.has_participant("ana"));
        assert_eq!(state.participant_names(), vec!["Ana", "Ben", "Cy"]);
    }

    #[test]
    fn test_error_keeps_view_and_selection() {
        let state = ready().with_error(BoardError::validation("nope"));
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.view, View::Player);
        assert_eq!(state.selected_participant.as_deref(), Some("Ben"));
        assert!(!state.loading);
    }

    #[test]
    fn test_loading_copy() {
        let state = ready();
        let busy = state.loading(None);
        assert!(busy.loading);
        assert_eq!(busy.phase, Phase::Ready);
        assert_eq!(state.loading(Some(Phase::Loading)).phase, Phase::Loading);
    }
}
