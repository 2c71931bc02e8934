// ABOUTME: Fixed, compiled-in observer list attached to the event bus at startup
// ABOUTME: Unlike the original's dynamically loaded plugin scripts, subscribers here are Rust types

use crate::events::{Event, EventBus, Subscriber};
use std::sync::Arc;
use tracing::{debug, info};

/// Logs stream lifecycle and client-count transitions. Stands in for the
/// original's `clientspec`-style per-connection metadata recorder: it
/// observes the same events but only logs, it doesn't persist anything.
pub struct StreamLifecycleLogger;

impl Subscriber for StreamLifecycleLogger {
    fn handle(&self, event: &Event) {
        match event {
            Event::StartStreaming => info!("upstream stream started"),
            Event::FinishStreaming => info!("upstream stream finished"),
            Event::ClientNum(count) => debug!(clients = count, "downstream client count changed"),
            Event::Dead => info!("watched endpoint went down"),
            Event::Alive => info!("watched endpoint came up"),
            _ => {}
        }
    }
}

/// Installs the fixed set of built-in subscribers onto `events`.
///
/// There is no dynamic `.py`-file loading here: that's a scripting-language
/// feature with no idiomatic Rust equivalent, so the registry is just this
/// one function wiring up compiled-in [`Subscriber`] implementations.
pub fn install_defaults(events: &Arc<EventBus>) {
    events.subscribe_global(Arc::new(StreamLifecycleLogger));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_defaults_does_not_panic_on_dispatch() {
        let events = Arc::new(EventBus::new());
        install_defaults(&events);
        events.notify(Event::StartStreaming);
        events.notify(Event::ClientNum(3));
    }
}
