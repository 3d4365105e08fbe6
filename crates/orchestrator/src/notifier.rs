//! Event fan-out to injected sinks

use async_trait::async_trait;
use std::sync::Arc;

use patchscout_common::{EventSink, ScanEvent};

/// Publishes every event to each registered sink, in registration order.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for Notifier {
    async fn publish(&self, event: &ScanEvent) {
        for sink in &self.sinks {
            sink.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<i64>>);

    #[async_trait]
    impl EventSink for Recorder {
        async fn publish(&self, event: &ScanEvent) {
            self.0.lock().await.push(event.scan_id());
        }
    }

    #[tokio::test]
    async fn every_sink_sees_every_event() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let notifier = Notifier::new().with_sink(a.clone()).with_sink(b.clone());

        notifier
            .publish(&ScanEvent::ScanCancelled {
                scan_id: 3,
                target: "t".into(),
            })
            .await;
        assert_eq!(*a.0.lock().await, vec![3]);
        assert_eq!(*b.0.lock().await, vec![3]);
        assert_eq!(notifier.len(), 2);
    }
}
