//! Catalog events and EventBus
//!
//! The Store publishes one [`CatalogEvent`] after every successful write. Events
//! are advisory: publishing never blocks a write and a bus with no subscribers
//! simply drops them. The [`notifier`] subscribes and forwards each event to an
//! external endpoint.

pub mod notifier;

pub use notifier::{EventEnvelope, Notifier};

use crate::db::models::{CollectionSummary, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Outcome of a write
///
/// Returned in the `Track-Action` response header and used as the event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    NoChange,
    TrackAdded,
    TrackUpdated,
    TrackDeleted,
    TracksUpdated,
    CollectionCreated,
    CollectionUpdated,
    CollectionDeleted,
    TrackWeightingUpdated,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NoChange => "noChange",
            Action::TrackAdded => "trackAdded",
            Action::TrackUpdated => "trackUpdated",
            Action::TrackDeleted => "trackDeleted",
            Action::TracksUpdated => "tracksUpdated",
            Action::CollectionCreated => "collectionCreated",
            Action::CollectionUpdated => "collectionUpdated",
            Action::CollectionDeleted => "collectionDeleted",
            Action::TrackWeightingUpdated => "trackWeightingUpdated",
        }
    }

    /// Deletes have no canonical URL to point at
    pub fn is_delete(&self) -> bool {
        matches!(self, Action::TrackDeleted | Action::CollectionDeleted)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful catalog mutation
#[derive(Debug, Clone)]
pub struct CatalogEvent {
    pub action: Action,
    pub human_readable: String,
    /// Track state after the write (before it, for deletes)
    pub track: Option<Track>,
    pub collection: Option<CollectionSummary>,
    pub timestamp: DateTime<Utc>,
}

impl CatalogEvent {
    /// Event about a single track
    pub fn for_track(action: Action, track: Track) -> Self {
        let label = track_label(&track);
        let human_readable = match action {
            Action::TrackAdded => format!("New track added: {}", label),
            Action::TrackDeleted => format!("Track deleted: {}", label),
            Action::TrackWeightingUpdated => {
                format!("Weighting for {} set to {}", label, track.weighting)
            }
            _ => format!("Track updated: {}", label),
        };
        Self {
            action,
            human_readable,
            track: Some(track),
            collection: None,
            timestamp: Utc::now(),
        }
    }

    /// Summary event for a bulk update
    pub fn tracks_updated(count: usize) -> Self {
        let noun = if count == 1 { "track" } else { "tracks" };
        Self {
            action: Action::TracksUpdated,
            human_readable: format!("{} {} updated", count, noun),
            track: None,
            collection: None,
            timestamp: Utc::now(),
        }
    }

    /// Event about a collection
    pub fn for_collection(action: Action, collection: CollectionSummary) -> Self {
        let verb = match action {
            Action::CollectionCreated => "created",
            Action::CollectionDeleted => "deleted",
            _ => "updated",
        };
        Self {
            action,
            human_readable: format!("Collection \"{}\" {}", collection.name, verb),
            track: None,
            collection: Some(collection),
            timestamp: Utc::now(),
        }
    }
}

/// Title when the track has one, `#id` otherwise
fn track_label(track: &Track) -> String {
    match track.tags.get("title") {
        Some(title) => format!("\"{}\"", title),
        None => format!("#{}", track.id),
    }
}

/// Broadcast bus for catalog events
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    ///
    /// # Examples
    ///
    /// ```
    /// use mmc_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let action = event.action;
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for {} event", action);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
