use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One participant's photos: challenge text -> asset reference.
///
/// A missing key, a `null` value or a blank reference all mean the square is
/// not completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantPhotos {
    entries: BTreeMap<String, Option<String>>,
}

/// Every loaded participant's photos, keyed by participant name.
pub type PhotoRecord = BTreeMap<String, ParticipantPhotos>;

impl ParticipantPhotos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, challenge: impl Into<String>, asset: Option<String>) {
        self.entries.insert(challenge.into(), asset);
    }

    /// Asset reference for a challenge, if it was completed
    pub fn asset_for(&self, challenge: &str) -> Option<&str> {
        self.entries
            .get(challenge)
            .and_then(|asset| asset.as_deref())
            .filter(|asset| !asset.trim().is_empty())
    }

    pub fn is_completed(&self, challenge: &str) -> bool {
        self.asset_for(challenge).is_some()
    }

    /// Completed challenge texts in sorted order
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, asset)| asset.as_deref().is_some_and(|a| !a.trim().is_empty()))
            .map(|(challenge, _)| challenge.as_str())
    }

    /// All non-empty asset references
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.entries
            .values()
            .filter_map(|asset| asset.as_deref())
            .filter(|asset| !asset.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for ParticipantPhotos {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
