use crate::compress::error::FALLBACK_MESSAGE;
use crate::compress::{CompressionStats, FileStatus, ProgressCallback, ProgressEvent};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Progress events as published to subscribers (UI, log sinks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    FileProgress {
        index: usize,
        progress: u8,
    },
    FileCompleted {
        index: usize,
        stats: CompressionStats,
        download_url: String,
    },
    FileFailed {
        index: usize,
        error: String,
    },
}

impl From<ProgressEvent> for Event {
    fn from(event: ProgressEvent) -> Self {
        match event.status {
            FileStatus::Pending | FileStatus::Processing => Event::FileProgress {
                index: event.index,
                progress: event.progress,
            },
            FileStatus::Completed => match (event.stats, event.download_url) {
                (Some(stats), Some(download_url)) => Event::FileCompleted {
                    index: event.index,
                    stats,
                    download_url,
                },
                // Only reachable through a hand-built event
                _ => Event::FileFailed {
                    index: event.index,
                    error: FALLBACK_MESSAGE.to_string(),
                },
            },
            FileStatus::Error => Event::FileFailed {
                index: event.index,
                error: event.error_message.unwrap_or_default(),
            },
        }
    }
}

/// Fan-out of progress events to any number of subscribers
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster
    ///
    /// # Arguments
    /// * `capacity` - The capacity of the broadcast channel (default: 100)
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Subscribe and receive every event serialized as one JSON document.
    ///
    /// Lagging subscribers skip the events they missed.
    pub fn json_stream(&self) -> impl Stream<Item = String> + Send + use<> {
        BroadcastStream::new(self.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        tracing::error!(target: "events", error = %e, "Failed to serialize event");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(target: "events", error = %e, "Broadcast stream error");
                    None
                }
            }
        })
    }

    /// Broadcast an event to all subscribers
    ///
    /// # Returns
    /// The number of receivers that received the event
    pub fn broadcast(&self, event: Event) -> usize {
        match self.sender.send(event.clone()) {
            Ok(count) => {
                tracing::trace!(target: "events", subscribers = count, event = ?event, "Broadcast event");
                count
            }
            Err(_) => {
                tracing::trace!(target: "events", "No active subscribers for event");
                0
            }
        }
    }

}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProgressCallback for EventBroadcaster {
    fn on_progress(&self, event: ProgressEvent) {
        self.broadcast(event.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_broadcasting() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        broadcaster.broadcast(Event::FileProgress {
            index: 2,
            progress: 40,
        });

        let event = receiver.recv().await.unwrap();
        match event {
            Event::FileProgress { index, progress } => {
                assert_eq!(index, 2);
                assert_eq!(progress, 40);
            }
            _ => panic!("Expected FileProgress event"),
        }
    }

    #[tokio::test]
    async fn test_progress_callback_maps_terminal_events() {
        let broadcaster = EventBroadcaster::default();
        let mut receiver = broadcaster.subscribe();

        broadcaster.on_progress(ProgressEvent::completed(
            0,
            CompressionStats::new(100, 40, 60.0, 0.5),
            "http://localhost:3000/download/1_a.pdf".into(),
        ));
        broadcaster.on_progress(ProgressEvent::failed(1, "Job processing failed on server"));

        match receiver.recv().await.unwrap() {
            Event::FileCompleted {
                index,
                stats,
                download_url,
            } => {
                assert_eq!(index, 0);
                assert_eq!(stats.reduction, "60.00");
                assert_eq!(download_url, "http://localhost:3000/download/1_a.pdf");
            }
            other => panic!("Expected FileCompleted, got {other:?}"),
        }
        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::FileFailed {
                index: 1,
                error: "Job processing failed on server".into()
            }
        );
    }

    #[tokio::test]
    async fn test_json_stream_serializes_tagged_events() {
        let broadcaster = EventBroadcaster::new(10);
        let stream = broadcaster.json_stream();
        tokio::pin!(stream);

        broadcaster.broadcast(Event::FileFailed {
            index: 3,
            error: "boom".into(),
        });

        let json = stream.next().await.unwrap();
        assert_eq!(json, r#"{"type":"FileFailed","data":{"index":3,"error":"boom"}}"#);
    }

    #[test]
    fn test_completed_event_without_result_is_reported_as_failure() {
        let mut event = ProgressEvent::completed(
            4,
            CompressionStats::new(10, 5, 50.0, 0.1),
            "http://localhost:3000/download/4_a.pdf".into(),
        );
        event.download_url = None;

        assert_eq!(
            Event::from(event),
            Event::FileFailed {
                index: 4,
                error: FALLBACK_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.broadcast(Event::FileProgress { index: 0, progress: 1 }), 0);
    }
}
