pub(crate) mod events;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::broadcast::events::RoomEvent;

/// Per-exam fan-out of session transitions and proctoring events.
///
/// Publishing is fire-and-forget: a room without subscribers, a lagged
/// receiver or a closed channel never surfaces to the caller. State is the
/// source of truth; late joiners catch up through the pull query, not the
/// stream.
#[derive(Clone)]
pub(crate) struct ExamBroadcaster {
    rooms: Arc<DashMap<String, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl ExamBroadcaster {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { rooms: Arc::new(DashMap::new()), capacity }
    }

    pub(crate) fn publish(&self, exam_id: &str, event: RoomEvent) {
        let Some(sender) = self.rooms.get(exam_id).map(|entry| entry.clone()) else {
            tracing::debug!(exam_id, event = event.event_name(), "No room open, event dropped");
            return;
        };

        metrics::counter!("broadcast_events_total", "event" => event.event_name()).increment(1);

        match sender.send(event) {
            Ok(delivered) => {
                tracing::debug!(exam_id, delivered, "Broadcast event to exam room");
            }
            Err(_) => {
                // All receivers went away between lookup and send.
                tracing::debug!(exam_id, "Exam room has no subscribers, event dropped");
            }
        }
    }

    pub(crate) fn subscribe(&self, exam_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.rooms
            .entry(exam_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.rooms.iter().map(|entry| entry.receiver_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(attempt_id: &str) -> RoomEvent {
        RoomEvent::SessionStarted {
            attempt_id: attempt_id.into(),
            at: "1970-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let broadcaster = ExamBroadcaster::new(8);
        broadcaster.publish("exam-1", started("a1"));
        assert_eq!(broadcaster.room_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let broadcaster = ExamBroadcaster::new(8);
        let mut rx = broadcaster.subscribe("exam-1");

        broadcaster.publish("exam-1", started("a1"));
        broadcaster.publish("exam-1", started("a2"));

        assert_eq!(rx.recv().await.unwrap().attempt_id(), "a1");
        assert_eq!(rx.recv().await.unwrap().attempt_id(), "a2");
    }

    #[tokio::test]
    async fn rooms_are_isolated_by_exam() {
        let broadcaster = ExamBroadcaster::new(8);
        let mut one = broadcaster.subscribe("exam-1");
        let mut two = broadcaster.subscribe("exam-2");

        broadcaster.publish("exam-2", started("a9"));

        assert_eq!(two.recv().await.unwrap().attempt_id(), "a9");
        assert!(matches!(one.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn late_joiner_sees_nothing_published_before_subscribe() {
        let broadcaster = ExamBroadcaster::new(8);
        let _early = broadcaster.subscribe("exam-1");
        broadcaster.publish("exam-1", started("a1"));

        let mut late = broadcaster.subscribe("exam-1");
        assert!(matches!(late.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }
}
