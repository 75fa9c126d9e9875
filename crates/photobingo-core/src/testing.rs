//! Shared test fixtures: roster/photo builders and a scripted `DataSource`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, DataSource};
use crate::models::{Participant, ParticipantPhotos, PhotoRecord};

pub fn roster(names: &[&str]) -> Vec<Participant> {
    names.iter().map(|name| Participant::new(*name)).collect()
}

pub fn completed(texts: &[&str]) -> ParticipantPhotos {
    texts
        .iter()
        .map(|text| (*text, Some(format!("photos/{}.jpg", text.replace(' ', "_")))))
        .collect()
}

pub fn photos_for(entries: &[(&str, &[&str])]) -> PhotoRecord {
    entries
        .iter()
        .map(|(name, texts)| (name.to_string(), completed(texts)))
        .collect()
}

/// Minimal PNG header with the given dimensions
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

/// Failure kinds a `MockSource` can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Transient,
    Forbidden,
    NotFound,
    Malformed,
    Status,
}

impl Fail {
    fn error(self, what: &str) -> ApiError {
        match self {
            Fail::Transient => ApiError::ServerError(format!("503 for {what}")),
            Fail::Forbidden => ApiError::Forbidden(what.to_string()),
            Fail::NotFound => ApiError::NotFound(what.to_string()),
            Fail::Malformed => ApiError::InvalidResponse(format!("bad payload for {what}")),
            Fail::Status => ApiError::UnexpectedStatus {
                status: 418,
                body: what.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    End(String),
}

#[derive(Default)]
struct Script {
    roster: Vec<String>,
    roster_failures: VecDeque<Fail>,
    photos: HashMap<String, ParticipantPhotos>,
    event_photos: HashMap<(String, String), ParticipantPhotos>,
    failures: HashMap<String, VecDeque<Fail>>,
    always: HashMap<String, Fail>,
    challenges: Option<Vec<String>>,
    challenge_failure: Option<Fail>,
    assets: HashMap<String, Vec<u8>>,
}

/// Scripted data source. Every photo fetch waits `delay` so tests can
/// observe concurrency; responses come from the script.
#[derive(Default)]
pub struct MockSource {
    script: Mutex<Script>,
    delay: Duration,
    log: Mutex<Vec<Call>>,
    photo_calls: Mutex<HashMap<String, usize>>,
    roster_calls: AtomicUsize,
    asset_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(names: &[&str]) -> Self {
        let source = Self::default();
        source.script.lock().unwrap().roster = names.iter().map(|n| n.to_string()).collect();
        source
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_photos(self, name: &str, texts: &[&str]) -> Self {
        self.set_photos(name, texts);
        self
    }

    /// Photos served for `name` only while `event_id` is requested
    pub fn with_event_photos(self, event_id: &str, name: &str, texts: &[&str]) -> Self {
        self.script
            .lock()
            .unwrap()
            .event_photos
            .insert((event_id.to_string(), name.to_string()), completed(texts));
        self
    }

    pub fn with_challenges(self, texts: &[&str]) -> Self {
        self.script.lock().unwrap().challenges = Some(texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_asset(self, reference: &str, bytes: Vec<u8>) -> Self {
        self.script
            .lock()
            .unwrap()
            .assets
            .insert(reference.to_string(), bytes);
        self
    }

    pub fn set_photos(&self, name: &str, texts: &[&str]) {
        self.script
            .lock()
            .unwrap()
            .photos
            .insert(name.to_string(), completed(texts));
    }

    /// Fail the next `times` photo fetches for `name` with `fail`.
    pub fn fail_times(&self, name: &str, times: usize, fail: Fail) {
        let mut script = self.script.lock().unwrap();
        let queue = script.failures.entry(name.to_string()).or_default();
        queue.extend(std::iter::repeat(fail).take(times));
    }

    pub fn fail_always(&self, name: &str, fail: Fail) {
        self.script
            .lock()
            .unwrap()
            .always
            .insert(name.to_string(), fail);
    }

    pub fn heal(&self, name: &str) {
        let mut script = self.script.lock().unwrap();
        script.always.remove(name);
        script.failures.remove(name);
    }

    pub fn fail_roster(&self, times: usize, fail: Fail) {
        let mut script = self.script.lock().unwrap();
        script.roster_failures.extend(std::iter::repeat(fail).take(times));
    }

    pub fn fail_challenges(&self, fail: Fail) {
        self.script.lock().unwrap().challenge_failure = Some(fail);
    }

    pub fn photo_calls(&self, name: &str) -> usize {
        self.photo_calls
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_photo_calls(&self) -> usize {
        self.photo_calls.lock().unwrap().values().sum()
    }

    pub fn roster_calls(&self) -> usize {
        self.roster_calls.load(Ordering::SeqCst)
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn list_participants(&self, event_id: &str) -> Result<Vec<String>, ApiError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if let Some(fail) = script.roster_failures.pop_front() {
            return Err(fail.error(event_id));
        }
        Ok(script.roster.clone())
    }

    async fn fetch_photos(
        &self,
        event_id: &str,
        participant: &str,
    ) -> Result<ParticipantPhotos, ApiError> {
        *self
            .photo_calls
            .lock()
            .unwrap()
            .entry(participant.to_string())
            .or_default() += 1;
        self.log.lock().unwrap().push(Call::Start(participant.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(Call::End(participant.to_string()));

        let mut script = self.script.lock().unwrap();
        if let Some(fail) = script.always.get(participant).copied() {
            return Err(fail.error(participant));
        }
        if let Some(fail) = script
            .failures
            .get_mut(participant)
            .and_then(|queue| queue.pop_front())
        {
            return Err(fail.error(participant));
        }
        script
            .event_photos
            .get(&(event_id.to_string(), participant.to_string()))
            .or_else(|| script.photos.get(participant))
            .cloned()
            .ok_or_else(|| Fail::NotFound.error(participant))
    }

    async fn fetch_challenges(&self, event_id: &str) -> Result<Option<Vec<String>>, ApiError> {
        let script = self.script.lock().unwrap();
        match script.challenge_failure {
            Some(fail) => Err(fail.error(event_id)),
            None => Ok(script.challenges.clone()),
        }
    }

    async fn fetch_asset(&self, reference: &str) -> Result<Vec<u8>, ApiError> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .assets
            .get(reference)
            .cloned()
            .ok_or_else(|| Fail::NotFound.error(reference))
    }
}
