use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Backoff, BatchPriority, BatchReport, SyncError};
use crate::api::{DataSource, FailureClass};
use crate::cache::{Asset, AssetCache};
use crate::config::EngineConfig;
use crate::models::{
    default_squares, squares_from_texts, ChallengeSquare, Participant, ParticipantPhotos,
    PhotoRecord, SQUARE_COUNT,
};

/// Fetches participant data from a `DataSource` and keeps what it loaded.
///
/// Every remote call holds a permit from a loader-wide semaphore, so the
/// number of in-flight requests never exceeds `concurrency_limit` no matter
/// how many batches, retries and preloads run at once.
///
/// The store has an epoch that `bind_event` and `reset` bump. A fetch that
/// started under an older epoch is returned to its caller but never stored.
pub struct SyncLoader {
    source: Arc<dyn DataSource>,
    assets: Arc<AssetCache>,
    permits: Semaphore,
    event_id: Mutex<String>,
    photos: Mutex<PhotoRecord>,
    epoch: AtomicU64,
    backoff: Backoff,
    max_attempts: u32,
    batch_size: usize,
    concurrency_limit: usize,
    batch_pause: Duration,
}

impl SyncLoader {
    pub fn new(source: Arc<dyn DataSource>, assets: Arc<AssetCache>, config: &EngineConfig) -> Self {
        let concurrency_limit = config.concurrency_limit.max(1);
        Self {
            source,
            assets,
            permits: Semaphore::new(concurrency_limit),
            event_id: Mutex::new(String::new()),
            photos: Mutex::new(PhotoRecord::new()),
            epoch: AtomicU64::new(0),
            backoff: Backoff::from_config(config),
            max_attempts: config.max_attempts.max(1),
            batch_size: config.batch_size.max(1),
            concurrency_limit,
            batch_pause: config.batch_pause(),
        }
    }

    // =========================================================================
    // Event binding and photo store
    // =========================================================================

    /// Point the loader at an event. Switching to a different event drops
    /// everything loaded for the previous one.
    pub fn bind_event(&self, event_id: &str) {
        let mut current = self.event_id.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != event_id {
            *current = event_id.to_string();
            self.reset();
        }
    }

    pub fn event_id(&self) -> String {
        self.event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self) -> MutexGuard<'_, PhotoRecord> {
        self.photos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of everything loaded so far
    pub fn photos_snapshot(&self) -> PhotoRecord {
        self.store().clone()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.store().contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.store().len()
    }

    pub fn reset(&self) {
        let mut store = self.store();
        store.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Close the semaphore. Waiting and future loads fail with `Closed`.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, SyncError> {
        self.permits.acquire().await.map_err(|_| SyncError::Closed)
    }

    // =========================================================================
    // Single participant
    // =========================================================================

    /// Fetch one participant's photos and store them.
    ///
    /// A participant with no record yet and a payload that cannot be parsed
    /// both come back as an empty map; the latter is logged.
    pub async fn load_one(&self, name: &str) -> Result<ParticipantPhotos, SyncError> {
        let (event_id, epoch) = {
            let current = self.event_id.lock().unwrap_or_else(PoisonError::into_inner);
            (current.clone(), self.epoch.load(Ordering::SeqCst))
        };
        let result = {
            let _permit = self.permit().await?;
            self.source.fetch_photos(&event_id, name).await
        };

        let photos = match result {
            Ok(photos) => photos,
            Err(e) => match e.class() {
                FailureClass::NotFound => {
                    debug!(participant = %name, "No photos recorded yet");
                    ParticipantPhotos::new()
                }
                FailureClass::Malformed => {
                    warn!(participant = %name, error = %e, "Discarding malformed photo data");
                    ParticipantPhotos::new()
                }
                _ => return Err(SyncError::classify(name, e)),
            },
        };

        let mut store = self.store();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(participant = %name, event = %event_id, "Store reset during fetch, dropping result");
            return Ok(photos);
        }
        debug!(participant = %name, completed = photos.completed().count(), "Photos loaded");
        store.insert(name.to_string(), photos.clone());
        Ok(photos)
    }

    /// `load_one`, retrying transient failures with exponential backoff.
    pub async fn load_one_with_retry(
        &self,
        name: &str,
        max_attempts: u32,
    ) -> Result<ParticipantPhotos, SyncError> {
        self.with_retry(name, max_attempts, move || self.load_one(name))
            .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        target: &str,
        max_attempts: u32,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(SyncError::Transient { source, .. }) if attempt < max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        resource = %target,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(SyncError::Transient { target, source, .. }) => {
                    return Err(SyncError::Transient {
                        target,
                        attempts: attempt,
                        source,
                    });
                }
                other => return other,
            }
        }
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Load `names` in consecutive batches of `batch_size`.
    ///
    /// Members of a batch run concurrently, at most `concurrency_limit` at a
    /// time (and never more than the loader-wide limit). One member failing
    /// does not cancel the others. Fails only when nothing loaded.
    pub async fn load_batch(
        &self,
        names: &[String],
        batch_size: usize,
        concurrency_limit: usize,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport::default();
        if names.is_empty() {
            return Ok(report);
        }

        let batch_size = batch_size.max(1);
        let concurrency_limit = concurrency_limit.max(1);
        let max_attempts = self.max_attempts;

        for (i, batch) in names.chunks(batch_size).enumerate() {
            if i > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }

            let priority = if i == 0 {
                BatchPriority::High
            } else {
                BatchPriority::Normal
            };
            debug!(batch = i + 1, size = batch.len(), ?priority, "Loading batch");

            let results: Vec<(String, Result<ParticipantPhotos, SyncError>)> =
                stream::iter(batch.iter().cloned())
                    .map(|name| {
                        async move {
                            let result = self.load_one_with_retry(&name, max_attempts).await;
                            (name, result)
                        }
                        .boxed()
                    })
                    .buffer_unordered(concurrency_limit)
                    .collect()
                    .await;

            for (name, result) in results {
                match result {
                    Ok(_) => report.loaded.push(name),
                    Err(SyncError::Closed) => return Err(SyncError::Closed),
                    Err(e) => {
                        warn!(participant = %name, error = %e, "Participant load failed");
                        report.failed.push((name, e));
                    }
                }
            }
            report.batches += 1;
        }

        if report.loaded.is_empty() {
            return Err(SyncError::AllFailed {
                attempted: names.len(),
                failures: report.failed,
            });
        }
        if !report.is_complete() {
            warn!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                "Batch load partially failed"
            );
        } else {
            info!(loaded = report.loaded.len(), batches = report.batches, "Batch load complete");
        }
        Ok(report)
    }

    /// Load up to `distance` participants on either side of `current_index`
    /// in the background, nearest first. Already loaded participants are
    /// skipped; failures are only logged. The task yields how many loaded.
    pub fn preload_neighbors(
        self: &Arc<Self>,
        ordered: &[String],
        current_index: usize,
        distance: usize,
    ) -> JoinHandle<usize> {
        let mut targets: Vec<(usize, String)> = ordered
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != current_index && i.abs_diff(current_index) <= distance)
            .filter(|(_, name)| !self.is_loaded(name))
            .map(|(i, name)| (i.abs_diff(current_index), name.clone()))
            .collect();
        targets.sort_by_key(|(d, _)| *d);

        let loader = Arc::clone(self);
        tokio::spawn(async move {
            if targets.is_empty() {
                return 0;
            }
            debug!(count = targets.len(), priority = ?BatchPriority::Low, "Preloading neighbors");

            let limit = loader.concurrency_limit;
            let outcomes: Vec<bool> = stream::iter(targets)
                .map(|(_, name)| {
                    let loader = Arc::clone(&loader);
                    async move {
                        match loader.load_one(&name).await {
                            Ok(_) => true,
                            Err(e) => {
                                debug!(participant = %name, error = %e, "Preload failed");
                                false
                            }
                        }
                    }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

            outcomes.into_iter().filter(|ok| *ok).count()
        })
    }

    // =========================================================================
    // Roster, challenges and assets
    // =========================================================================

    /// Fetch the event roster, retrying transient failures. Binds the loader
    /// to `event_id`.
    pub async fn load_participants(&self, event_id: &str) -> Result<Vec<Participant>, SyncError> {
        self.bind_event(event_id);
        let names = self
            .with_retry("participants", self.max_attempts, move || async move {
                let result = {
                    let _permit = self.permit().await?;
                    self.source.list_participants(event_id).await
                };
                match result {
                    Ok(names) => Ok(names),
                    Err(e) if e.class() == FailureClass::NotFound => Ok(Vec::new()),
                    Err(e) => Err(SyncError::classify("participants", e)),
                }
            })
            .await?;

        let participants = Participant::roster(names);
        info!(event = %event_id, count = participants.len(), "Roster loaded");
        Ok(participants)
    }

    /// The event's challenge board, or the built-in board when the service
    /// has none or cannot be reached. Never fails.
    pub async fn load_challenges(&self, event_id: &str) -> Vec<ChallengeSquare> {
        let result = match self.permit().await {
            Ok(_permit) => self.source.fetch_challenges(event_id).await,
            Err(_) => return default_squares(),
        };

        let texts: Vec<String> = match result {
            Ok(Some(texts)) => texts
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(event = %event_id, error = %e, "Challenge list unavailable, using built-in board");
                return default_squares();
            }
        };

        if texts.is_empty() {
            debug!(event = %event_id, "No custom challenges, using built-in board");
            return default_squares();
        }
        if texts.len() > SQUARE_COUNT {
            warn!(count = texts.len(), "Challenge list longer than the board, truncating");
        }
        squares_from_texts(texts.into_iter().take(SQUARE_COUNT))
    }

    /// Fetch a photo asset through the shared asset cache.
    pub async fn load_asset(&self, reference: &str) -> Result<Arc<Asset>, SyncError> {
        if let Some(asset) = self.assets.get(reference) {
            return Ok(asset);
        }

        let bytes = {
            let _permit = self.permit().await?;
            self.source.fetch_asset(reference).await
        }
        .map_err(|e| SyncError::classify(reference, e))?;

        debug!(reference = %reference, bytes = bytes.len(), "Asset fetched");
        Ok(self.assets.insert(reference, Asset::image(reference, bytes)))
    }

    pub fn asset_cache(&self) -> &Arc<AssetCache> {
        &self.assets
    }
}
