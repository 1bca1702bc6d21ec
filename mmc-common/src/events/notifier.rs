//! Outbound event notifier
//!
//! Subscribes to the [`EventBus`] and POSTs each event as a JSON envelope to the
//! configured endpoint. Delivery is best-effort: failures are logged at warn
//! level and never reach the request that caused the event.

use super::{CatalogEvent, EventBus};
use crate::db::models::{CollectionSummary, Track};
use crate::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timeout for a single notifier POST
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON body POSTed to the notifier endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "humanReadable")]
    pub human_readable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionSummary>,
    /// Canonical manager URL of the entity; omitted on deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl EventEnvelope {
    pub fn from_event(event: &CatalogEvent, source: &str, media_manager: &str) -> Self {
        let url = if event.action.is_delete() {
            None
        } else if let Some(track) = &event.track {
            Some(format!("{}/tracks/{}", media_manager, track.id))
        } else {
            event
                .collection
                .as_ref()
                .map(|c| format!("{}/collections/{}", media_manager, c.slug))
        };

        Self {
            source: source.to_string(),
            event_type: event.action.as_str().to_string(),
            human_readable: event.human_readable.clone(),
            track: event.track.clone(),
            collection: event.collection.clone(),
            url,
        }
    }
}

/// Fire-and-forget HTTP notifier
pub struct Notifier {
    http_client: Client,
    /// `None` means events are only logged
    endpoint: Option<String>,
    source: String,
    media_manager: String,
}

impl Notifier {
    pub fn new(
        endpoint: Option<String>,
        source: impl Into<String>,
        media_manager: impl Into<String>,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            source: source.into(),
            media_manager: media_manager.into(),
        })
    }

    pub fn envelope(&self, event: &CatalogEvent) -> EventEnvelope {
        EventEnvelope::from_event(event, &self.source, &self.media_manager)
    }

    /// POST one envelope
    pub async fn send(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            debug!("No notifier endpoint, dropping {} event", envelope.event_type);
            return Ok(());
        };

        let response = self
            .http_client
            .post(endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("notifier request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "notifier responded with {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Forward events from the bus until it closes
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        info!(
            "Event notifier started (endpoint: {})",
            self.endpoint.as_deref().unwrap_or("<none>")
        );

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let envelope = self.envelope(&event);
                        if let Err(e) = self.send(&envelope).await {
                            warn!("Failed to deliver {} event: {}", envelope.event_type, e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event notifier lagged, {} events not delivered", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Event notifier stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Action;
    use std::collections::BTreeMap;

    fn track() -> Track {
        Track {
            fingerprint: "f1".to_string(),
            duration: 7,
            url: "http://example.org/t1".to_string(),
            id: 1,
            tags: BTreeMap::new(),
            weighting: 0.0,
            collections: vec![],
        }
    }

    #[test]
    fn test_envelope_url_for_track_update() {
        let event = CatalogEvent::for_track(Action::TrackUpdated, track());
        let envelope = EventEnvelope::from_event(&event, "mmc-api", "https://manager.example");

        assert_eq!(envelope.event_type, "trackUpdated");
        assert_eq!(envelope.url.as_deref(), Some("https://manager.example/tracks/1"));

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "trackUpdated");
        assert_eq!(json["track"]["trackid"], 1);
        assert!(json.get("collection").is_none());
    }

    #[test]
    fn test_envelope_url_omitted_on_delete() {
        let event = CatalogEvent::for_track(Action::TrackDeleted, track());
        let envelope = EventEnvelope::from_event(&event, "mmc-api", "https://manager.example");
        assert!(envelope.url.is_none());

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_envelope_for_collection() {
        let collection = CollectionSummary {
            slug: "first".to_string(),
            name: "C".to_string(),
            icon: String::new(),
        };
        let event = CatalogEvent::for_collection(Action::CollectionCreated, collection);
        let envelope = EventEnvelope::from_event(&event, "mmc-api", "https://manager.example");
        assert_eq!(
            envelope.url.as_deref(),
            Some("https://manager.example/collections/first")
        );
        assert_eq!(envelope.human_readable, "Collection \"C\" created");
    }

    #[tokio::test]
    async fn test_send_without_endpoint_is_noop() {
        let notifier = Notifier::new(None, "mmc-api", "https://manager.example").unwrap();
        let event = CatalogEvent::tracks_updated(2);
        assert!(notifier.send(&notifier.envelope(&event)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let notifier = Notifier::new(
            Some("http://127.0.0.1:9/events".to_string()),
            "mmc-api",
            "https://manager.example",
        )
        .unwrap();
        let event = CatalogEvent::tracks_updated(2);
        assert!(notifier.send(&notifier.envelope(&event)).await.is_err());
    }
}
