//! Real-time event fan-out for WebSocket clients

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use patchscout_common::{EventSink, ScanEvent};

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts every scan event to all current subscribers.
///
/// Publishing never blocks; a subscriber that falls more than the channel
/// capacity behind sees `RecvError::Lagged` and skips ahead.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Arc<ScanEvent>>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ScanEvent>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn publish(&self, event: &ScanEvent) {
        if self.tx.send(Arc::new(event.clone())).is_err() {
            trace!(scan_id = event.scan_id(), "no websocket subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let hub = EventHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(&ScanEvent::ToolStarted {
            scan_id: 3,
            tool: "Nmap".into(),
        })
        .await;

        assert_eq!(a.recv().await.unwrap().scan_id(), 3);
        assert_eq!(b.recv().await.unwrap().scan_id(), 3);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_harmless() {
        let hub = EventHub::new(4);
        hub.publish(&ScanEvent::ScanCancelled {
            scan_id: 1,
            target: "example.com".into(),
        })
        .await;
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        for scan_id in 0..5 {
            hub.publish(&ScanEvent::ToolStarted {
                scan_id,
                tool: "Nuclei".into(),
            })
            .await;
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
