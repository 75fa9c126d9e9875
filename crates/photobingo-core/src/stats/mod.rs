//! Completion statistics.
//!
//! `compute` holds the pure calculations; `StatsEngine` wraps them with a
//! TTL cache keyed by a structural fingerprint of the inputs.

pub mod compute;
pub mod engine;
pub mod fingerprint;

use serde::{Deserialize, Serialize};

pub use compute::{compute_participant_progress, compute_stats};
pub use engine::StatsEngine;
pub use fingerprint::Fingerprint;

/// How hard a square is, judged by its completion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyTier {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 80.0 {
            DifficultyTier::Easy
        } else if rate >= 50.0 {
            DifficultyTier::Medium
        } else if rate >= 20.0 {
            DifficultyTier::Hard
        } else {
            DifficultyTier::VeryHard
        }
    }
}

impl std::fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DifficultyTier::Easy => write!(f, "Easy"),
            DifficultyTier::Medium => write!(f, "Medium"),
            DifficultyTier::Hard => write!(f, "Hard"),
            DifficultyTier::VeryHard => write!(f, "Very Hard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum PopularityTier {
    VeryPopular,
    Popular,
    Moderate,
    Unpopular,
}

impl PopularityTier {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 75.0 {
            PopularityTier::VeryPopular
        } else if rate >= 50.0 {
            PopularityTier::Popular
        } else if rate >= 25.0 {
            PopularityTier::Moderate
        } else {
            PopularityTier::Unpopular
        }
    }
}

impl std::fmt::Display for PopularityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PopularityTier::VeryPopular => write!(f, "Very Popular"),
            PopularityTier::Popular => write!(f, "Popular"),
            PopularityTier::Moderate => write!(f, "Moderate"),
            PopularityTier::Unpopular => write!(f, "Unpopular"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SquareStat {
    pub square_index: usize,
    pub challenge_text: String,
    pub completed_by: Vec<String>,
    pub outstanding: Vec<String>,
    /// Percentage of participants who completed the square (0..=100)
    pub completion_rate: f64,
    pub difficulty_tier: DifficultyTier,
    pub popularity_tier: PopularityTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ParticipantStat {
    pub participant_name: String,
    pub completion_count: usize,
    /// Percentage of squares completed (0..=100)
    pub completion_rate: f64,
    /// 1-based position after sorting by completion rate, best first
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CompletionStats {
    pub square_stats: Vec<SquareStat>,
    /// Sorted by rank
    pub participant_stats: Vec<ParticipantStat>,
    pub overall_completion: f64,
    pub total_completions: usize,
    pub average_participant_progress: f64,
}

impl CompletionStats {
    pub fn participant(&self, name: &str) -> Option<&ParticipantStat> {
        self.participant_stats
            .iter()
            .find(|stat| stat.participant_name == name)
    }
}

/// A single participant's board, as shown in the player view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ParticipantProgress {
    pub participant_name: String,
    /// Square indices the participant has completed, ascending
    pub completed_squares: Vec<usize>,
    pub completion_count: usize,
    pub total_squares: usize,
    pub completion_rate: f64,
}

impl ParticipantProgress {
    pub fn is_completed(&self, square_index: usize) -> bool {
        self.completed_squares.binary_search(&square_index).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_tier_boundaries() {
        assert_eq!(DifficultyTier::from_rate(100.0), DifficultyTier::Easy);
        assert_eq!(DifficultyTier::from_rate(80.0), DifficultyTier::Easy);
        assert_eq!(DifficultyTier::from_rate(79.9), DifficultyTier::Medium);
        assert_eq!(DifficultyTier::from_rate(50.0), DifficultyTier::Medium);
        assert_eq!(DifficultyTier::from_rate(20.0), DifficultyTier::Hard);
        assert_eq!(DifficultyTier::from_rate(19.9), DifficultyTier::VeryHard);
        assert_eq!(DifficultyTier::from_rate(0.0), DifficultyTier::VeryHard);
    }

    #[test]
    fn test_popularity_tier_boundaries() {
        assert_eq!(PopularityTier::from_rate(75.0), PopularityTier::VeryPopular);
        assert_eq!(PopularityTier::from_rate(74.9), PopularityTier::Popular);
        assert_eq!(PopularityTier::from_rate(50.0), PopularityTier::Popular);
        assert_eq!(PopularityTier::from_rate(25.0), PopularityTier::Moderate);
        assert_eq!(PopularityTier::from_rate(24.9), PopularityTier::Unpopular);
    }
}
