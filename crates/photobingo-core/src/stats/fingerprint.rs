//! Structural cache keys for statistics inputs.
//!
//! The fingerprint is computed over the data the statistics depend on, not
//! over a serialized form: roster order (it decides rank tie-breaks), square
//! order, and for each participant the sorted set of completed challenges.
//! Asset references themselves are ignored, so swapping one photo for another
//! does not invalidate cached statistics.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::models::{ChallengeSquare, Participant, ParticipantPhotos, PhotoRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

/// Distinguishes full-board keys from single-participant keys
#[derive(Hash)]
enum Scope<'a> {
    Board,
    Participant(&'a str),
}

fn hash_squares<H: Hasher>(squares: &[ChallengeSquare], state: &mut H) {
    squares.len().hash(state);
    for square in squares {
        square.index.hash(state);
        square.text.hash(state);
    }
}

fn hash_completed<H: Hasher>(photos: Option<&ParticipantPhotos>, state: &mut H) {
    // `completed` iterates in sorted order, independent of insertion order
    let completed: Vec<&str> = photos.map(|p| p.completed().collect()).unwrap_or_default();
    completed.hash(state);
}

impl Fingerprint {
    pub fn of_board(
        participants: &[Participant],
        photos: &PhotoRecord,
        squares: &[ChallengeSquare],
    ) -> Self {
        let mut state = DefaultHasher::new();
        Scope::Board.hash(&mut state);
        participants.len().hash(&mut state);
        for participant in participants {
            participant.name.hash(&mut state);
            hash_completed(photos.get(&participant.name), &mut state);
        }
        hash_squares(squares, &mut state);
        Fingerprint(state.finish())
    }

    pub fn of_participant(name: &str, photos: &PhotoRecord, squares: &[ChallengeSquare]) -> Self {
        let mut state = DefaultHasher::new();
        Scope::Participant(name).hash(&mut state);
        hash_completed(photos.get(name), &mut state);
        hash_squares(squares, &mut state);
        Fingerprint(state.finish())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
