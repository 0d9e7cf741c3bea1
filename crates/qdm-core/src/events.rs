//! Flat-topic event bus for fanning out download progress and lifecycle
//! events to any number of subscribers (CLI `status --watch`, the
//! ingestion endpoint's `/sync`, future UIs).
//!
//! New module; no teacher counterpart. Built on `tokio::sync::broadcast`,
//! whose overflow-drops-oldest behavior is exactly right for progress
//! events (a missed intermediate progress tick is harmless — the next one
//! carries the current total) while lifecycle events are emitted
//! infrequently enough that a reasonably-sized channel practically never
//! drops them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel. Sized generously above any plausible
/// per-download worker count so a burst of chunk progress from many
/// concurrently active downloads doesn't starve lifecycle events out.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One event published on the bus, always scoped to a download id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A new download was registered (spec §9: `download:added`).
    Added { download_id: String },
    /// Progress tick: cumulative bytes downloaded and current speed.
    Progress {
        download_id: String,
        downloaded: u64,
        total_size: Option<u64>,
        speed_bps: f64,
    },
    /// The download's lifecycle status changed.
    StatusChanged {
        download_id: String,
        status: crate::model::DownloadStatus,
    },
    /// The download failed; carries the human-readable reason.
    Failed {
        download_id: String,
        reason: String,
    },
    /// The download finished and the final artifact is in place.
    Completed { download_id: String },
    /// The download was removed from the catalog (spec §9: `download:removed`).
    Removed { download_id: String },
    /// A media resource was observed by the ingestion endpoint (`media:added`).
    MediaAdded { media_id: String },
    /// A media resource's display name was updated (`media:updated`).
    MediaUpdated { media_id: String },
    /// The media list was emptied (`media:cleared`).
    MediaCleared,
    /// The caller requested a previously-observed media item be downloaded
    /// (`/vid`'s `media:download`, spec §4.7).
    MediaDownloadRequested { media_id: String },
    /// A queue was created, edited, or deleted (`queue:{created,updated,deleted}`).
    QueueChanged { queue_id: String, change: QueueChangeKind },
}

/// Which of the three `queue:*` topics a [`Event::QueueChanged`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeKind {
    Created,
    Updated,
    Deleted,
}

impl Event {
    /// The download id this event concerns, if any. Media and queue events
    /// carry no download id (they key off their own id space instead).
    pub fn download_id(&self) -> Option<&str> {
        match self {
            Event::Added { download_id } => Some(download_id),
            Event::Progress { download_id, .. } => Some(download_id),
            Event::StatusChanged { download_id, .. } => Some(download_id),
            Event::Failed { download_id, .. } => Some(download_id),
            Event::Completed { download_id } => Some(download_id),
            Event::Removed { download_id } => Some(download_id),
            Event::MediaAdded { .. }
            | Event::MediaUpdated { .. }
            | Event::MediaCleared
            | Event::MediaDownloadRequested { .. }
            | Event::QueueChanged { .. } => None,
        }
    }
}

/// Shared handle to the event bus. Cheap to clone; every clone publishes
/// to and subscribes from the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes an event. Never blocks; if there are no subscribers the
    /// event is simply dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Subscribes to the bus. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::Completed {
            download_id: "d1".into(),
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.download_id(), Some("d1"));
        assert!(matches!(received, Event::Completed { .. }));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(Event::StatusChanged {
            download_id: "d1".into(),
            status: crate::model::DownloadStatus::Downloading,
        });
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn media_and_queue_events_carry_no_download_id() {
        assert_eq!(Event::MediaAdded { media_id: "m1".into() }.download_id(), None);
        assert_eq!(Event::MediaCleared.download_id(), None);
        assert_eq!(
            Event::QueueChanged { queue_id: "q1".into(), change: QueueChangeKind::Created }.download_id(),
            None
        );
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::Completed {
            download_id: "d1".into(),
        });
    }
}
