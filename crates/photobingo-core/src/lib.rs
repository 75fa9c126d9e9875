//! Core library for photobingo.
//!
//! Tracks collaborative completion of a fixed 25-square photo challenge board
//! across the participants of an event. The engine is split into:
//!
//! - `api`: the `DataSource` trait the engine reads from, and an HTTP client
//! - `models`: participants, challenge squares and photo records
//! - `sync`: batched, retrying, concurrency-limited participant loading
//! - `stats`: completion statistics with a fingerprint-keyed result cache
//! - `cache`: bounded asset cache with score-based eviction
//! - `events`: typed publish/subscribe notifications
//! - `state`: the `StateController` state machine tying it all together

pub mod api;
pub mod cache;
pub mod config;
pub mod events;
pub mod models;
pub mod state;
pub mod stats;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, DataSource};
pub use cache::{AssetCache, AssetCacheStats};
pub use config::EngineConfig;
pub use events::{BoardEvent, EventBus, EventKind, ProgressDelta, Subscription};
pub use models::{ChallengeSquare, Participant, ParticipantPhotos, PhotoRecord};
pub use state::{BoardError, BoardState, ErrorKind, PendingAction, Phase, StateController, View};
pub use stats::{CompletionStats, ParticipantProgress, StatsEngine};
pub use sync::{BatchReport, SyncError, SyncLoader};
