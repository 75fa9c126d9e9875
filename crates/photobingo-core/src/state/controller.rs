//! The board state machine.
//!
//! Every public operation follows the same discipline: bump the generation,
//! build a candidate `BoardState` off to the side, and commit it only if no
//! newer transition started in the meantime. A failed transition commits its
//! error on top of the state it started from, so view and selection never
//! change on failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{BoardError, BoardState, ErrorKind, PendingAction, Phase, View};
use crate::api::DataSource;
use crate::cache::AssetCache;
use crate::config::EngineConfig;
use crate::events::{BoardEvent, EventBus, ProgressDelta};
use crate::stats::{CompletionStats, ParticipantProgress, StatsEngine};
use crate::sync::{SyncError, SyncLoader};

#[derive(Debug, Error)]
enum TransitionError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Fatal(String),
}

impl TransitionError {
    fn into_board_error(self, action: PendingAction) -> BoardError {
        let kind = match &self {
            TransitionError::Sync(e) => ErrorKind::from(e),
            TransitionError::Validation(_) => ErrorKind::Validation,
            TransitionError::Fatal(_) => ErrorKind::InitializationFatal,
        };
        BoardError::new(kind, self.to_string(), Some(action))
    }
}

#[derive(Default)]
struct BackgroundTasks {
    preload: Option<JoinHandle<usize>>,
    auto_refresh: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn abort_all(&mut self) {
        if let Some(handle) = self.preload.take() {
            handle.abort();
        }
        if let Some(handle) = self.auto_refresh.take() {
            handle.abort();
        }
    }
}

pub struct StateController {
    config: EngineConfig,
    loader: Arc<SyncLoader>,
    stats: StatsEngine,
    assets: Arc<AssetCache>,
    events: EventBus,
    state: Mutex<Arc<BoardState>>,
    /// Held across swap and notify so listeners see commits in order
    dispatch: Mutex<()>,
    generation: AtomicU64,
    destroyed: AtomicBool,
    tasks: Mutex<BackgroundTasks>,
}

impl StateController {
    pub fn new(source: Arc<dyn DataSource>, config: EngineConfig) -> Self {
        let assets = Arc::new(AssetCache::new(&config));
        let loader = Arc::new(SyncLoader::new(source, Arc::clone(&assets), &config));
        Self {
            stats: StatsEngine::new(&config),
            loader,
            assets,
            events: EventBus::new(),
            state: Mutex::new(Arc::new(BoardState::default())),
            dispatch: Mutex::new(()),
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            tasks: Mutex::new(BackgroundTasks::default()),
            config,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn get_state(&self) -> Arc<BoardState> {
        Arc::clone(&self.lock_state())
    }

    pub fn get_completion_stats(&self) -> Option<Arc<CompletionStats>> {
        self.get_state().stats.clone()
    }

    /// Progress of any roster member against the current photo data
    pub fn get_participant_progress(&self, name: &str) -> Option<Arc<ParticipantProgress>> {
        let state = self.get_state();
        if !state.has_participant(name) {
            return None;
        }
        Some(
            self.stats
                .participant_progress(name, &state.photos, &state.squares),
        )
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn asset_cache(&self) -> &Arc<AssetCache> {
        &self.assets
    }

    pub fn loader(&self) -> &Arc<SyncLoader> {
        &self.loader
    }

    pub fn stats_engine(&self) -> &StatsEngine {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, Arc<BoardState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, BackgroundTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Load the roster and challenge board for `event_id` and show either
    /// `initial_participant` (if on the roster) or the whole card.
    pub async fn initialize(
        &self,
        event_id: &str,
        initial_participant: Option<&str>,
    ) -> Arc<BoardState> {
        let Some(generation) = self.begin("initialize") else {
            return self.get_state();
        };
        if let Some(preload) = self.tasks().preload.take() {
            preload.abort();
        }
        let previous = self.get_state();
        self.commit(generation, previous.loading(Some(Phase::Loading)));

        let action = PendingAction::Initialize {
            event_id: event_id.to_string(),
            participant: initial_participant.map(str::to_string),
        };
        match self.build_initial(event_id, initial_participant).await {
            Ok(candidate) => {
                info!(
                    event = %event_id,
                    participants = candidate.participants.len(),
                    view = %candidate.view,
                    "Board initialized"
                );
                self.commit(generation, candidate)
                    .unwrap_or_else(|| self.get_state())
            }
            Err(e) => self.fail(generation, &previous, e.into_board_error(action)),
        }
    }

    pub async fn switch_to_participant(&self, name: &str) -> Arc<BoardState> {
        let Some(generation) = self.begin("switch_to_participant") else {
            return self.get_state();
        };
        let previous = self.get_state();
        let action = PendingAction::SwitchToParticipant(name.to_string());

        if let Err(e) = Self::check_target(&previous, Some(name)) {
            return self.fail(generation, &previous, e.into_board_error(action));
        }
        self.commit(generation, previous.loading(None));

        let candidate = BoardState {
            view: View::Player,
            selected_participant: Some(name.to_string()),
            ..(*previous).clone()
        };
        match self
            .load_and_commit(generation, &previous, candidate, false, action)
            .await
        {
            Ok(state) => {
                info!(participant = %name, "Switched to participant");
                self.preload_around(&state, name);
                state
            }
            Err(state) => state,
        }
    }

    pub async fn switch_to_card_view(&self) -> Arc<BoardState> {
        let Some(generation) = self.begin("switch_to_card_view") else {
            return self.get_state();
        };
        let previous = self.get_state();
        let action = PendingAction::SwitchToCardView;

        if let Err(e) = Self::check_target(&previous, None) {
            return self.fail(generation, &previous, e.into_board_error(action));
        }
        self.commit(generation, previous.loading(None));

        let candidate = BoardState {
            view: View::Card,
            selected_participant: None,
            ..(*previous).clone()
        };
        match self
            .load_and_commit(generation, &previous, candidate, false, action)
            .await
        {
            Ok(state) => {
                info!("Switched to card view");
                state
            }
            Err(state) => state,
        }
    }

    /// Reload the current view's data and recompute statistics. Emits
    /// `ProgressUpdate` when the total number of completions changed.
    pub async fn refresh(&self) -> Arc<BoardState> {
        let Some(generation) = self.begin("refresh") else {
            return self.get_state();
        };
        let previous = self.get_state();
        let action = PendingAction::Refresh;

        if let Err(e) = Self::check_target(&previous, None) {
            return self.fail(generation, &previous, e.into_board_error(action));
        }
        self.commit(generation, previous.loading(None));

        let candidate = (*previous).clone();
        match self
            .load_and_commit(generation, &previous, candidate, true, action)
            .await
        {
            Ok(state) => {
                let progress = ProgressDelta {
                    previous_total: previous.total_completions(),
                    current_total: state.total_completions(),
                    overall_completion: state.stats.as_ref().map_or(0.0, |s| s.overall_completion),
                };
                if progress.delta() != 0 {
                    info!(delta = progress.delta(), total = progress.current_total, "Progress changed");
                    self.events.publish(&BoardEvent::ProgressUpdate(progress));
                }
                state
            }
            Err(state) => state,
        }
    }

    /// Replay the transition that produced the current error, if it can be
    /// retried.
    pub async fn retry(&self) -> Arc<BoardState> {
        let current = self.get_state();
        let Some(action) = current
            .last_error
            .as_ref()
            .and_then(|e| e.retry_action.clone())
        else {
            debug!("Nothing to retry");
            return current;
        };

        info!(?action, "Retrying failed transition");
        match action {
            PendingAction::Initialize {
                event_id,
                participant,
            } => self.initialize(&event_id, participant.as_deref()).await,
            PendingAction::SwitchToParticipant(name) => self.switch_to_participant(&name).await,
            PendingAction::SwitchToCardView => self.switch_to_card_view().await,
            PendingAction::Refresh => self.refresh().await,
        }
    }

    /// Tear everything down. Later operations are ignored.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Invalidate whatever is still in flight
        self.generation.fetch_add(1, Ordering::SeqCst);

        self.tasks().abort_all();
        self.loader.shutdown();
        self.loader.reset();
        self.stats.clear();
        self.assets.clear();
        self.events.clear();
        *self.lock_state() = Arc::new(BoardState::default());
        info!("Board destroyed");
    }

    /// Refresh every `interval` until destroyed. Replaces any running timer.
    pub fn start_auto_refresh(self: &Arc<Self>, interval: Duration) {
        if self.is_destroyed() {
            warn!("Controller destroyed, not starting auto refresh");
            return;
        }
        if interval.is_zero() {
            warn!("Auto refresh interval must be positive");
            return;
        }

        let controller = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if controller.is_destroyed() {
                    break;
                }
                debug!("Auto refresh");
                controller.refresh().await;
            }
        });

        if let Some(previous) = self.tasks().auto_refresh.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "Auto refresh started");
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.tasks().auto_refresh.take() {
            handle.abort();
        }
    }

    /// Wait for the latest neighbor preload; returns how many it loaded.
    pub async fn wait_for_preload(&self) -> usize {
        let handle = self.tasks().preload.take();
        match handle {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }

    // =========================================================================
    // Transition plumbing
    // =========================================================================

    fn begin(&self, operation: &'static str) -> Option<u64> {
        if self.is_destroyed() {
            warn!(operation, "Controller destroyed, ignoring");
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(operation, generation, "Transition started");
        Some(generation)
    }

    /// Replace the current state unless a newer transition has started.
    fn commit(&self, generation: u64, next: BoardState) -> Option<Arc<BoardState>> {
        let next = Arc::new(next);
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = {
            let mut current = self.lock_state();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Discarding superseded transition");
                return None;
            }
            std::mem::replace(&mut *current, Arc::clone(&next))
        };
        self.notify(&previous, &next);
        Some(next)
    }

    fn notify(&self, previous: &BoardState, next: &Arc<BoardState>) {
        self.events.publish(&BoardEvent::StateChange(Arc::clone(next)));
        if previous.view != next.view {
            self.events.publish(&BoardEvent::ViewChange {
                previous: previous.view,
                current: next.view,
            });
        }
        if previous.selected_participant != next.selected_participant {
            self.events.publish(&BoardEvent::ParticipantChange {
                previous: previous.selected_participant.clone(),
                current: next.selected_participant.clone(),
            });
        }
    }

    fn fail(&self, generation: u64, previous: &BoardState, error: BoardError) -> Arc<BoardState> {
        warn!(kind = ?error.kind, can_retry = error.can_retry, error = %error.message, "Transition failed");
        self.commit(generation, previous.with_error(error))
            .unwrap_or_else(|| self.get_state())
    }

    fn check_target(state: &BoardState, participant: Option<&str>) -> Result<(), TransitionError> {
        if !state.is_initialized() {
            return Err(TransitionError::Validation(
                "Board is not initialized".to_string(),
            ));
        }
        match participant {
            Some(name) if !state.has_participant(name) => Err(TransitionError::Validation(
                format!("Unknown participant: {name}"),
            )),
            _ => Ok(()),
        }
    }

    /// Ok with the committed state, or Err with whatever is current after
    /// the failure was recorded or the result was discarded.
    async fn load_and_commit(
        &self,
        generation: u64,
        previous: &BoardState,
        mut candidate: BoardState,
        force: bool,
        action: PendingAction,
    ) -> Result<Arc<BoardState>, Arc<BoardState>> {
        match self.load_view_data(&mut candidate, force).await {
            Ok(()) => self
                .commit(generation, self.finish(candidate))
                .ok_or_else(|| self.get_state()),
            Err(e) => Err(self.fail(generation, previous, e.into_board_error(action))),
        }
    }

    async fn build_initial(
        &self,
        event_id: &str,
        initial_participant: Option<&str>,
    ) -> Result<BoardState, TransitionError> {
        self.loader.reset();
        let participants = self.loader.load_participants(event_id).await?;
        if participants.is_empty() {
            return Err(TransitionError::Fatal(format!(
                "Event {event_id} has no participants"
            )));
        }
        let squares = self.loader.load_challenges(event_id).await;

        let selected = match initial_participant {
            Some(name) if participants.iter().any(|p| p.name == name) => Some(name.to_string()),
            Some(name) => {
                warn!(participant = %name, "Initial participant not on roster, showing card view");
                None
            }
            None => None,
        };

        let mut candidate = BoardState {
            phase: Phase::Loading,
            event_id: Some(event_id.to_string()),
            view: if selected.is_some() { View::Player } else { View::Card },
            selected_participant: selected,
            participants,
            squares,
            ..Default::default()
        };
        self.load_view_data(&mut candidate, false).await?;
        Ok(self.finish(candidate))
    }

    /// Fetch what the candidate's view shows: the selected participant in
    /// player view, everyone in card view. Without `force`, participants
    /// already loaded are skipped.
    async fn load_view_data(
        &self,
        candidate: &mut BoardState,
        force: bool,
    ) -> Result<(), TransitionError> {
        match (candidate.view, candidate.selected_participant.as_deref()) {
            (View::Player, Some(name)) => {
                if force || !self.loader.is_loaded(name) {
                    self.loader
                        .load_one_with_retry(name, self.loader.max_attempts())
                        .await?;
                }
            }
            _ => {
                let names: Vec<String> = candidate
                    .participants
                    .iter()
                    .filter(|p| force || !self.loader.is_loaded(&p.name))
                    .map(|p| p.name.clone())
                    .collect();
                if !names.is_empty() {
                    let report = self
                        .loader
                        .load_batch(&names, self.loader.batch_size(), self.loader.concurrency_limit())
                        .await?;
                    if !report.is_complete() {
                        warn!(
                            failed = report.failed.len(),
                            "Showing board without some participants"
                        );
                    }
                }
            }
        }
        candidate.photos = self.loader.photos_snapshot();
        Ok(())
    }

    fn finish(&self, mut candidate: BoardState) -> BoardState {
        let stats = self.stats.compute_stats(
            &candidate.participants,
            &candidate.photos,
            &candidate.squares,
        );
        candidate.participant_progress = candidate
            .selected_participant
            .as_deref()
            .map(|name| {
                self.stats
                    .participant_progress(name, &candidate.photos, &candidate.squares)
            });
        candidate.stats = Some(stats);
        candidate.phase = Phase::Ready;
        candidate.loading = false;
        candidate.last_error = None;
        candidate.last_update_time = Some(Utc::now());
        candidate
    }

    fn preload_around(&self, state: &BoardState, name: &str) {
        let Some(index) = state.participant_index(name) else {
            return;
        };
        let handle = self.loader.preload_neighbors(
            &state.participant_names(),
            index,
            self.config.preload_distance,
        );
        if let Some(previous) = self.tasks().preload.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for StateController {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}
