use super::{
    CompletionStats, DifficultyTier, ParticipantProgress, ParticipantStat, PopularityTier,
    SquareStat,
};
use crate::models::{ChallengeSquare, Participant, PhotoRecord};

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn has_completed(photos: &PhotoRecord, participant: &str, challenge: &str) -> bool {
    photos
        .get(participant)
        .is_some_and(|p| p.is_completed(challenge))
}

/// Derive square, participant and aggregate statistics.
///
/// Participants without a photo record count as having completed nothing.
/// Ties in completion rate keep roster order.
pub fn compute_stats(
    participants: &[Participant],
    photos: &PhotoRecord,
    squares: &[ChallengeSquare],
) -> CompletionStats {
    let total_participants = participants.len();
    let total_squares = squares.len();

    let square_stats: Vec<SquareStat> = squares
        .iter()
        .map(|square| {
            let (completed_by, outstanding): (Vec<&Participant>, Vec<&Participant>) = participants
                .iter()
                .partition(|p| has_completed(photos, &p.name, &square.text));
            let completion_rate = percentage(completed_by.len(), total_participants);

            SquareStat {
                square_index: square.index,
                challenge_text: square.text.clone(),
                completed_by: completed_by.iter().map(|p| p.name.clone()).collect(),
                outstanding: outstanding.iter().map(|p| p.name.clone()).collect(),
                completion_rate,
                difficulty_tier: DifficultyTier::from_rate(completion_rate),
                popularity_tier: PopularityTier::from_rate(completion_rate),
            }
        })
        .collect();

    let mut participant_stats: Vec<ParticipantStat> = participants
        .iter()
        .map(|p| {
            let completion_count = squares
                .iter()
                .filter(|square| has_completed(photos, &p.name, &square.text))
                .count();
            ParticipantStat {
                participant_name: p.name.clone(),
                completion_count,
                completion_rate: percentage(completion_count, total_squares),
                rank: 0,
            }
        })
        .collect();

    // sort_by is stable, so equal rates keep roster order
    participant_stats.sort_by(|a, b| b.completion_rate.total_cmp(&a.completion_rate));
    for (i, stat) in participant_stats.iter_mut().enumerate() {
        stat.rank = i + 1;
    }

    let total_completions: usize = square_stats.iter().map(|s| s.completed_by.len()).sum();
    let overall_completion = percentage(total_completions, total_participants * total_squares);
    let average_participant_progress = if participant_stats.is_empty() {
        0.0
    } else {
        participant_stats.iter().map(|s| s.completion_rate).sum::<f64>()
            / participant_stats.len() as f64
    };

    CompletionStats {
        square_stats,
        participant_stats,
        overall_completion,
        total_completions,
        average_participant_progress,
    }
}

/// The single-participant restriction of `compute_stats`.
pub fn compute_participant_progress(
    name: &str,
    photos: &PhotoRecord,
    squares: &[ChallengeSquare],
) -> ParticipantProgress {
    let mut completed_squares: Vec<usize> = squares
        .iter()
        .filter(|square| has_completed(photos, name, &square.text))
        .map(|square| square.index)
        .collect();
    completed_squares.sort_unstable();

    let completion_count = completed_squares.len();
    ParticipantProgress {
        participant_name: name.to_string(),
        completion_rate: percentage(completion_count, squares.len()),
        completed_squares,
        completion_count,
        total_squares: squares.len(),
    }
}
