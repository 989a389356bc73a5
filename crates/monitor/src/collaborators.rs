use std::sync::Arc;

use delaywatch_core::activities::{MessageWriter, Notifier, TrafficSource};

/// The three external services a monitor calls during a cycle.
///
/// Cheaply cloneable; shared by every instance in a registry.
#[derive(Clone)]
pub struct Collaborators {
    pub traffic: Arc<dyn TrafficSource>,
    pub messages: Arc<dyn MessageWriter>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        traffic: Arc<dyn TrafficSource>,
        messages: Arc<dyn MessageWriter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            traffic,
            messages,
            notifier,
        }
    }
}
