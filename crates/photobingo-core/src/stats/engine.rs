use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{compute_participant_progress, compute_stats, CompletionStats, Fingerprint, ParticipantProgress};
use crate::cache::CacheEntry;
use crate::config::EngineConfig;
use crate::models::{ChallengeSquare, Participant, PhotoRecord};

/// Expiring results keyed by fingerprint. Expiry is checked lazily on lookup;
/// when full, the oldest entry makes room for the new one.
struct ResultCache<V> {
    entries: Mutex<HashMap<Fingerprint, CacheEntry<Fingerprint, Arc<V>>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V> ResultCache<V> {
    fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn get(&self, key: Fingerprint) -> Option<Arc<V>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entries.get(&key)?.is_expired(self.ttl);
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get_mut(&key).map(|entry| Arc::clone(entry.touch()))
    }

    fn insert(&self, key: Fingerprint, value: Arc<V>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
        while entries.len() >= self.max_entries {
            let oldest = entries
                .values()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key);
            match oldest {
                Some(k) => entries.remove(&k),
                None => break,
            };
        }
        entries.insert(key, CacheEntry::new(key, value, 1));
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Computes completion statistics, memoizing results for identical inputs.
pub struct StatsEngine {
    board: ResultCache<CompletionStats>,
    progress: ResultCache<ParticipantProgress>,
    computations: AtomicU64,
}

impl StatsEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            board: ResultCache::new(config.stats_ttl(), config.stats_max_entries),
            progress: ResultCache::new(config.stats_ttl(), config.stats_max_entries),
            computations: AtomicU64::new(0),
        }
    }

    /// Full-board statistics, served from cache while the inputs are
    /// structurally unchanged and the entry is younger than the TTL.
    pub fn compute_stats(
        &self,
        participants: &[Participant],
        photos: &PhotoRecord,
        squares: &[ChallengeSquare],
    ) -> Arc<CompletionStats> {
        let key = Fingerprint::of_board(participants, photos, squares);
        if let Some(stats) = self.board.get(key) {
            debug!(fingerprint = %key, "Stats cache hit");
            return stats;
        }

        self.computations.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::new(compute_stats(participants, photos, squares));
        self.board.insert(key, Arc::clone(&stats));
        debug!(
            fingerprint = %key,
            total_completions = stats.total_completions,
            "Stats computed"
        );
        stats
    }

    pub fn participant_progress(
        &self,
        name: &str,
        photos: &PhotoRecord,
        squares: &[ChallengeSquare],
    ) -> Arc<ParticipantProgress> {
        let key = Fingerprint::of_participant(name, photos, squares);
        if let Some(progress) = self.progress.get(key) {
            return progress;
        }

        self.computations.fetch_add(1, Ordering::Relaxed);
        let progress = Arc::new(compute_participant_progress(name, photos, squares));
        self.progress.insert(key, Arc::clone(&progress));
        progress
    }

    /// Number of full computations performed (cache misses)
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn cached_entries(&self) -> usize {
        self.board.len() + self.progress.len()
    }

    pub fn clear(&self) {
        self.board.clear();
        self.progress.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::squares_from_texts;
    use crate::testing::{photos_for, roster};

    fn engine() -> StatsEngine {
        StatsEngine::new(&EngineConfig {
            stats_ttl_secs: 30,
            stats_max_entries: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_identical_inputs_are_computed_once() {
        let engine = engine();
        let squares = squares_from_texts(["s0", "s1"]);
        let participants = roster(&["A", "B"]);
        let photos = photos_for(&[("A", &["s0"])]);

        let first = engine.compute_stats(&participants, &photos, &squares);
        let second = engine.compute_stats(&participants, &photos.clone(), &squares.clone());

        assert_eq!(engine.computations(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_changed_inputs_are_recomputed() {
        let engine = engine();
        let squares = squares_from_texts(["s0", "s1"]);
        let participants = roster(&["A"]);

        engine.compute_stats(&participants, &photos_for(&[("A", &["s0"])]), &squares);
        let updated = engine.compute_stats(&participants, &photos_for(&[("A", &["s0", "s1"])]), &squares);

        assert_eq!(engine.computations(), 2);
        assert_eq!(updated.total_completions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_results_are_recomputed_lazily() {
        let engine = engine();
        let squares = squares_from_texts(["s0"]);
        let participants = roster(&["A"]);
        let photos = photos_for(&[("A", &["s0"])]);

        engine.compute_stats(&participants, &photos, &squares);
        tokio::time::advance(Duration::from_secs(20)).await;
        engine.compute_stats(&participants, &photos, &squares);
        assert_eq!(engine.computations(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        engine.compute_stats(&participants, &photos, &squares);
        assert_eq!(engine.computations(), 2);
    }

    #[test]
    fn test_cache_is_bounded() {
        let engine = engine();
        let squares = squares_from_texts(["s0", "s1", "s2", "s3", "s4"]);
        let texts = ["s0", "s1", "s2", "s3", "s4"];
        let people = roster(&["A"]);
        for n in 0..5 {
            engine.compute_stats(&people, &photos_for(&[("A", &texts[..n])]), &squares);
        }
        assert_eq!(engine.computations(), 5);
        assert!(engine.cached_entries() <= 3);
    }

    #[test]
    fn test_participant_progress_is_cached() {
        let engine = engine();
        let squares = squares_from_texts(["s0", "s1"]);
        let photos = photos_for(&[("A", &["s1"]), ("B", &["s0"])]);

        let a = engine.participant_progress("A", &photos, &squares);
        engine.participant_progress("A", &photos, &squares);
        let b = engine.participant_progress("B", &photos, &squares);

        assert_eq!(engine.computations(), 2);
        assert_eq!(a.completed_squares, vec![1]);
        assert_eq!(b.completed_squares, vec![0]);
    }

    #[test]
    fn test_clear_forces_recomputation() {
        let engine = engine();
        let squares = squares_from_texts(["s0"]);
        let participants = roster(&["A"]);
        let photos = PhotoRecord::new();

        engine.compute_stats(&participants, &photos, &squares);
        engine.clear();
        assert_eq!(engine.cached_entries(), 0);
        engine.compute_stats(&participants, &photos, &squares);
        assert_eq!(engine.computations(), 2);
    }
}
