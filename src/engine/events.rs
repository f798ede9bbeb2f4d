//! Domain event publication.
//!
//! Events go to an in-process subscriber list, each subscriber invoked in
//! turn inside its own panic boundary, and are optionally mirrored to an
//! external sink on a detached task. Publication never fails and never
//! blocks on the sink.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Opportunity,
    TradeExecuted,
    StrategyGenerated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Opportunity => "opportunity",
            EventKind::TradeExecuted => "trade_executed",
            EventKind::StrategyGenerated => "strategy_generated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Subscribers & sinks
// ---------------------------------------------------------------------------

/// In-process event consumer. Errors are logged by the bus.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<()>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// External pub/sub mirror (at-most-once).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<()>;
}

/// Writes every event as a structured log line.
pub struct LoggingSubscriber;

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &Event) -> Result<()> {
        info!(event = %event.kind, payload = %event.payload, "Event");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            sink,
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        let mut subs = self.subscribers.write().unwrap_or_else(|p| p.into_inner());
        subs.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Deliver to every subscriber, then mirror to the sink.
    /// Returns how many subscribers accepted the event.
    pub fn publish(&self, kind: EventKind, payload: serde_json::Value) -> usize {
        let event = Event {
            kind,
            payload,
            timestamp: Utc::now(),
        };

        let subscribers: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        let mut delivered = 0;
        for (idx, sub) in subscribers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| sub.on_event(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(event = %kind, subscriber = idx, error = %e, "Event subscriber failed"),
                Err(panic) => warn!(
                    event = %kind,
                    subscriber = idx,
                    panic = %panic_message(panic.as_ref()),
                    "Event subscriber panicked"
                ),
            }
        }

        if let Some(sink) = &self.sink {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let sink = Arc::clone(sink);
                    handle.spawn(async move {
                        if let Err(e) = sink.publish(&event).await {
                            warn!(event = %event.kind, error = %e, "Event sink publish failed");
                        }
                    });
                }
                Err(_) => debug!(event = %kind, "No runtime; event not mirrored"),
            }
        }

        delivered
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &Event) -> Result<()> {
            self.seen.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, event: &Event) -> Result<()> {
            self.seen.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    #[test]
    fn test_failing_subscribers_do_not_block_others() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());

        bus.subscribe(Arc::new(|_: &Event| -> Result<()> { anyhow::bail!("boom") }));
        bus.subscribe(Arc::new(|_: &Event| -> Result<()> { panic!("subscriber bug") }));
        bus.subscribe(recorder.clone());

        let delivered = bus.publish(EventKind::Opportunity, serde_json::json!({"id": "opp-1"}));
        assert_eq!(delivered, 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![EventKind::Opportunity]);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_sink_receives_mirrored_events() {
        let sink = Arc::new(RecordingSink::default());
        let bus = EventBus::new(Some(sink.clone() as Arc<dyn EventSink>));
        bus.publish(EventKind::TradeExecuted, serde_json::json!({}));

        for _ in 0..50 {
            if !sink.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*sink.seen.lock().unwrap(), vec![EventKind::TradeExecuted]);
    }

    #[test]
    fn test_publish_without_runtime_skips_sink() {
        let sink = Arc::new(RecordingSink::default());
        let bus = EventBus::new(Some(sink.clone() as Arc<dyn EventSink>));
        assert_eq!(bus.publish(EventKind::StrategyGenerated, serde_json::json!({})), 0);
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::TradeExecuted.to_string(), "trade_executed");
        assert_eq!(serde_json::to_string(&EventKind::StrategyGenerated).unwrap(), "\"strategy_generated\"");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
