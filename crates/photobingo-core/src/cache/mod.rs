//! Bounded in-memory caching.
//!
//! - `CacheEntry`: bookkeeping shared by the stats and asset caches
//! - `AssetCache`: photo assets and memoized render artifacts, bounded by
//!   entry count and byte budget, evicted by access score
//!
//! Nothing here is persisted; caches live for one session.

pub mod assets;
pub mod dimensions;
pub mod entry;

pub use assets::{Asset, AssetCache, AssetCacheStats, AssetPayload};
pub use dimensions::image_dimensions;
pub use entry::CacheEntry;
