//! Typed publish/subscribe notifications for board observers.
//!
//! Listeners are registered per `EventKind` and receive `BoardEvent`s
//! synchronously, in subscription order. A listener that returns an error or
//! panics is logged and skipped; the remaining listeners still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tracing::{error, warn};

use crate::state::{BoardState, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChange,
    ViewChange,
    ParticipantChange,
    ProgressUpdate,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::StateChange => write!(f, "stateChange"),
            EventKind::ViewChange => write!(f, "viewChange"),
            EventKind::ParticipantChange => write!(f, "participantChange"),
            EventKind::ProgressUpdate => write!(f, "progressUpdate"),
        }
    }
}

/// Change in total completions observed by a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressDelta {
    pub previous_total: usize,
    pub current_total: usize,
    pub overall_completion: f64,
}

impl ProgressDelta {
    pub fn delta(&self) -> i64 {
        self.current_total as i64 - self.previous_total as i64
    }
}

#[derive(Debug, Clone)]
pub enum BoardEvent {
    StateChange(Arc<BoardState>),
    ViewChange {
        previous: View,
        current: View,
    },
    ParticipantChange {
        previous: Option<String>,
        current: Option<String>,
    },
    ProgressUpdate(ProgressDelta),
}

impl BoardEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BoardEvent::StateChange(_) => EventKind::StateChange,
            BoardEvent::ViewChange { .. } => EventKind::ViewChange,
            BoardEvent::ParticipantChange { .. } => EventKind::ParticipantChange,
            BoardEvent::ProgressUpdate(_) => EventKind::ProgressUpdate,
        }
    }
}

type Listener = Arc<dyn Fn(&BoardEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(u64, Listener)>>,
}

/// Cheaply clonable handle to a shared listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

/// Returned by `EventBus::subscribe`. Dropping it keeps the listener
/// registered; call `unsubscribe` to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(listeners) = registry.listeners.get_mut(&self.kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        before != listeners.len()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&BoardEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Deliver an event to every listener of its kind. Returns how many
    /// listeners handled it without error.
    pub fn publish(&self, event: &BoardEvent) -> usize {
        let kind = event.kind();
        // Dispatch from a snapshot so listeners may (un)subscribe re-entrantly
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(event = %kind, error = %e, "Listener failed"),
                Err(_) => error!(event = %kind, "Listener panicked"),
            }
        }
        delivered
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Remove every listener. Outstanding `Subscription`s become no-ops.
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn progress(previous_total: usize, current_total: usize) -> BoardEvent {
        BoardEvent::ProgressUpdate(ProgressDelta {
            previous_total,
            current_total,
            overall_completion: 0.0,
        })
    }

    #[test]
    fn test_publish_reaches_only_matching_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let _sub = bus.subscribe(EventKind::ProgressUpdate, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let _other = bus.subscribe(EventKind::ViewChange, |_| anyhow::bail!("wrong kind"));

        assert_eq!(bus.publish(&progress(1, 2)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::ProgressUpdate, |_| Ok(()));
        assert_eq!(bus.listener_count(EventKind::ProgressUpdate), 1);

        assert!(sub.unsubscribe());
        assert_eq!(bus.listener_count(EventKind::ProgressUpdate), 0);
        assert_eq!(bus.publish(&progress(0, 1)), 0);
    }

    #[test]
    fn test_failing_listeners_do_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _a = bus.subscribe(EventKind::ProgressUpdate, |_| anyhow::bail!("observer broke"));
        let _b = bus.subscribe(EventKind::ProgressUpdate, |_| panic!("observer exploded"));
        let counter = Arc::clone(&seen);
        let _c = bus.subscribe(EventKind::ProgressUpdate, move |event| {
            if let BoardEvent::ProgressUpdate(delta) = event {
                assert_eq!(delta.delta(), 3);
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(&progress(2, 5)), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // The bus is still usable after a panic
        assert_eq!(bus.publish(&progress(5, 8)), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let _sub = bus.subscribe(EventKind::ProgressUpdate, move |_| {
            let _late = inner_bus.subscribe(EventKind::ProgressUpdate, |_| Ok(()));
            Ok(())
        });

        assert_eq!(bus.publish(&progress(0, 1)), 1);
        assert_eq!(bus.listener_count(EventKind::ProgressUpdate), 2);
    }

    #[test]
    fn test_clear_drops_all_listeners() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::StateChange, |_| Ok(()));
        let _other = bus.subscribe(EventKind::ViewChange, |_| Ok(()));

        bus.clear();
        assert_eq!(bus.listener_count(EventKind::StateChange), 0);
        assert_eq!(bus.listener_count(EventKind::ViewChange), 0);
        assert!(!sub.unsubscribe());
    }
}
