//! HTTP client for the photo bingo data service.
//!
//! `ApiClient` implements `DataSource` on top of `reqwest`. Each call is a
//! single request; retry and backoff are the loader's responsibility.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ApiError, DataSource};
use crate::config::EngineConfig;
use crate::models::ParticipantPhotos;

/// Participant listing as returned by the service: either a bare array or an
/// object wrapping one. Entries may be names or `{ "name": ... }` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParticipantsResponse {
    List(Vec<ParticipantEntry>),
    Wrapped { participants: Vec<ParticipantEntry> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParticipantEntry {
    Name(String),
    Object { name: String },
}

impl ParticipantsResponse {
    fn into_names(self) -> Vec<String> {
        let entries = match self {
            ParticipantsResponse::List(entries) => entries,
            ParticipantsResponse::Wrapped { participants } => participants,
        };
        entries
            .into_iter()
            .map(|entry| match entry {
                ParticipantEntry::Name(name) => name,
                ParticipantEntry::Object { name } => name,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChallengesResponse {
    List(Vec<String>),
    Wrapped { challenges: Vec<String> },
}

/// API client for the data service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &EngineConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!(
                "{}: cannot carry path segments",
                config.base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        // Parse from text so shape errors surface as InvalidResponse
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl DataSource for ApiClient {
    async fn list_participants(&self, event_id: &str) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["events", event_id, "participants"]);
        let response: ParticipantsResponse = self.get_json(url).await?;
        Ok(response.into_names())
    }

    async fn fetch_photos(
        &self,
        event_id: &str,
        participant: &str,
    ) -> Result<ParticipantPhotos, ApiError> {
        let url = self.endpoint(&["events", event_id, "participants", participant, "photos"]);
        self.get_json(url).await
    }

    async fn fetch_challenges(&self, event_id: &str) -> Result<Option<Vec<String>>, ApiError> {
        let url = self.endpoint(&["events", event_id, "challenges"]);
        match self.get_json::<ChallengesResponse>(url).await {
            Ok(ChallengesResponse::List(list)) | Ok(ChallengesResponse::Wrapped { challenges: list }) => {
                Ok(Some(list).filter(|l| !l.is_empty()))
            }
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_asset(&self, reference: &str) -> Result<Vec<u8>, ApiError> {
        let url = if reference.starts_with("http://") || reference.starts_with("https://") {
            Url::parse(reference).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", reference, e)))?
        } else {
            self.endpoint(&["assets", reference])
        };

        debug!(url = %url, "GET asset");
        let response = self.client.get(url).send().await?;
        let response = Self::check_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        let config = EngineConfig {
            base_url: base.to_string(),
            ..Default::default()
        };
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let api = client("https://bingo.example.com/api/");
        let url = api.endpoint(&["events", "spring 24", "participants", "Zoë/M", "photos"]);
        assert_eq!(
            url.as_str(),
            "https://bingo.example.com/api/events/spring%2024/participants/Zo%C3%AB%2FM/photos"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let config = EngineConfig {
            base_url: "mailto:someone@example.com".to_string(),
            ..Default::default()
        };
        assert!(ApiClient::new(&config).is_err());
    }

    #[test]
    fn test_parse_participant_payload_shapes() {
        let bare: ParticipantsResponse = serde_json::from_str(r#"["Ana", "Ben"]"#).unwrap();
        assert_eq!(bare.into_names(), vec!["Ana", "Ben"]);

        let wrapped: ParticipantsResponse =
            serde_json::from_str(r#"{"participants": [{"name": "Ana"}, "Ben"]}"#).unwrap();
        assert_eq!(wrapped.into_names(), vec!["Ana", "Ben"]);
    }

    #[test]
    fn test_malformed_photo_payload_is_invalid_response() {
        let err: ApiError = serde_json::from_str::<ParticipantPhotos>(r#"["not", "a", "map"]"#)
            .unwrap_err()
            .into();
        assert_eq!(err.class(), crate::api::FailureClass::Malformed);
    }
}
