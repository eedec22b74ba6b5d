//! Fan-out of domain events.
//!
//! Producers (the sleep-cycle state machine and the wake scheduler) hand every
//! event to the [`EventBus`], which forwards it to each registered consumer in
//! registration order. The transport is the main consumer; in debug mode the
//! console mirror [`EventLogConsumer`] is added as well.

use std::sync::Arc;

use crate::outpost::message::Event;

/// Receives every event logged on the bus.
pub trait EventConsumer: Send + Sync {
    fn consume(&self, event: &Event);
}

/// Ordered, immutable set of consumers.
#[derive(Clone, Default)]
pub struct EventBus {
    consumers: Vec<Arc<dyn EventConsumer>>,
}

impl EventBus {
    pub fn new(consumers: Vec<Arc<dyn EventConsumer>>) -> Self {
        Self { consumers }
    }

    /// Deliver `event` to all consumers. With no consumers this is a no-op.
    pub fn log_event(&self, event: Event) {
        for consumer in &self.consumers {
            consumer.consume(&event);
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

/// Mirrors events to the console.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventLogConsumer;

impl EventConsumer for EventLogConsumer {
    fn consume(&self, event: &Event) {
        log_debug!("{event}");
    }
}
