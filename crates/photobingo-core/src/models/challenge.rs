use serde::{Deserialize, Serialize};

/// Squares per board row/column
pub const BOARD_SIZE: usize = 5;

/// Squares on a full board
pub const SQUARE_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// Built-in challenge list, used when the data service has none for an event.
const DEFAULT_CHALLENGES: [&str; SQUARE_COUNT] = [
    "A stranger's smile",
    "Something older than you",
    "Your reflection somewhere unexpected",
    "A local landmark",
    "Street art",
    "A four-legged friend",
    "Something blue",
    "The view from up high",
    "A team selfie",
    "Your lunch",
    "A handwritten sign",
    "Something that made you laugh",
    "Free space: any photo",
    "A sunset or sunrise",
    "Public transport",
    "A bridge",
    "Something growing",
    "A shadow portrait",
    "A door you would love to own",
    "Local food or drink",
    "A perfect circle",
    "Something tiny",
    "Someone helping out",
    "Your favorite spot today",
    "The group, all together",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

/// One fixed prompt on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ChallengeSquare {
    pub index: usize,
    pub text: String,
    pub position: Position,
}

impl ChallengeSquare {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            position: Position {
                row: index / BOARD_SIZE,
                col: index % BOARD_SIZE,
            },
        }
    }
}

/// Build squares from challenge texts, indexing them in order.
pub fn squares_from_texts<I, S>(texts: I) -> Vec<ChallengeSquare>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| ChallengeSquare::new(index, text))
        .collect()
}

pub fn default_squares() -> Vec<ChallengeSquare> {
    squares_from_texts(DEFAULT_CHALLENGES)
}
