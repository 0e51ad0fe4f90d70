use crate::model::{ComparisonStatus, ConfigSlot, TrialRef, TrialStatus};
use serde::Serialize;
use tokio::sync::broadcast;

/// Live progress of a comparison, pushed to subscribers as it happens.
///
/// Subscribers that lag past the channel capacity miss events; the stored
/// comparison row stays authoritative and can always be polled.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ComparisonEvent {
    StatusChanged {
        comparison_id: i64,
        status: ComparisonStatus,
        message: String,
    },
    Progress {
        comparison_id: i64,
        progress: u32,
        total: u32,
    },
    TrialRecorded {
        comparison_id: i64,
        config: ConfigSlot,
        trial_ref: TrialRef,
        status: TrialStatus,
        error: Option<String>,
    },
    Finished {
        comparison_id: i64,
        status: ComparisonStatus,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ComparisonEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ComparisonEvent> {
        self.tx.subscribe()
    }

    /// Sends to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ComparisonEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(event = "calibra.events.no_subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(8);
        bus.publish(ComparisonEvent::Finished {
            comparison_id: 1,
            status: ComparisonStatus::Completed,
        });

        let mut rx = bus.subscribe();
        bus.publish(ComparisonEvent::Progress {
            comparison_id: 1,
            progress: 1,
            total: 2,
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(
            ev,
            ComparisonEvent::Progress {
                comparison_id: 1,
                progress: 1,
                total: 2
            }
        );
    }

    #[test]
    fn test_event_json_shape() {
        let ev = ComparisonEvent::StatusChanged {
            comparison_id: 3,
            status: ComparisonStatus::Running,
            message: "go".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "status_changed");
        assert_eq!(v["status"], "running");
    }
}
