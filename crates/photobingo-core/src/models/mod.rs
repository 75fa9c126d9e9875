//! Data models for photo bingo entities.
//!
//! - `Participant`: a named contributor, identified by name
//! - `ChallengeSquare`: one of the 25 fixed prompts on the board
//! - `ParticipantPhotos`, `PhotoRecord`: per-participant completion maps

pub mod challenge;
pub mod participant;
pub mod photo;

pub use challenge::{default_squares, squares_from_texts, ChallengeSquare, Position, BOARD_SIZE, SQUARE_COUNT};
pub use participant::Participant;
pub use photo::{ParticipantPhotos, PhotoRecord};
