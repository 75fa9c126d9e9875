use async_trait::async_trait;

use super::ApiError;
use crate::models::ParticipantPhotos;

/// Read-only view of the remote data service.
///
/// Implementations report "no record" as `ApiError::NotFound` and permission
/// problems as `ApiError::Forbidden`/`Unauthorized`; the loader relies on
/// those variants to decide between empty data, failure and retry.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Participant names registered for an event
    async fn list_participants(&self, event_id: &str) -> Result<Vec<String>, ApiError>;

    /// One participant's challenge text -> asset reference map
    async fn fetch_photos(
        &self,
        event_id: &str,
        participant: &str,
    ) -> Result<ParticipantPhotos, ApiError>;

    /// Challenge texts for an event, or `None` when the service has no list
    async fn fetch_challenges(&self, event_id: &str) -> Result<Option<Vec<String>>, ApiError>;

    /// Raw bytes of a photo asset
    async fn fetch_asset(&self, reference: &str) -> Result<Vec<u8>, ApiError>;
}
