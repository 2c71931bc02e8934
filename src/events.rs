// ABOUTME: Named synchronous event dispatcher the core emits into and out-of-scope plugins observe
// ABOUTME: The core only ever emits; dispatch failures are caught and logged, never propagated

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

/// Every event the reflector and the liveness monitor emit.
///
/// Replaces the duck-typed `on_<event>`/callable dispatch of the original
/// implementation with a closed, typed enum; `name()` gives the string form
/// a name-routing adapter subscriber can match on.
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Terminate,
    Terminating,
    Processing,
    Processed,
    Connecting,
    Connected,
    Request,
    Response,
    InfoPacket,
    StartStreaming,
    FinishStreaming,
    ClientNum(usize),
    Checking,
    Checked,
    Change,
    Alive,
    Dead,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Terminate => "terminate",
            Event::Terminating => "terminating",
            Event::Processing => "processing",
            Event::Processed => "processed",
            Event::Connecting => "connecting",
            Event::Connected => "connected",
            Event::Request => "request",
            Event::Response => "response",
            Event::InfoPacket => "info_packet",
            Event::StartStreaming => "start_streaming",
            Event::FinishStreaming => "finish_streaming",
            Event::ClientNum(_) => "client_num",
            Event::Checking => "checking",
            Event::Checked => "checked",
            Event::Change => "change",
            Event::Alive => "alive",
            Event::Dead => "dead",
        }
    }
}

/// Something that wants to observe events emitted by the core.
///
/// Implementations must not assume ordering relative to other subscribers of
/// the same event beyond "registration order, then global subscribers last."
pub trait Subscriber: Send + Sync {
    fn handle(&self, event: &Event);
}

/// A `Subscriber` built from a plain closure, for cheap one-off subscriptions.
pub struct FnSubscriber<F>(pub F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        (self.0)(event)
    }
}

thread_local! {
    static DISPATCHING: RefCell<HashSet<&'static str>> = RefCell::new(HashSet::new());
}

/// Process-wide event registry: each event name maps to an ordered list of
/// subscribers, plus one additional list that receives every event.
#[derive(Default)]
pub struct EventBus {
    by_name: Mutex<HashMap<&'static str, Vec<Arc<dyn Subscriber>>>>,
    global: Mutex<Vec<Arc<dyn Subscriber>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self, event_name: &'static str, subscriber: Arc<dyn Subscriber>) {
        self.by_name
            .lock()
            .unwrap()
            .entry(event_name)
            .or_default()
            .push(subscriber);
    }

    pub fn subscribe_global(&self, subscriber: Arc<dyn Subscriber>) {
        self.global.lock().unwrap().push(subscriber);
    }

    /// Dispatches `event` to its named subscribers (insertion order) then the
    /// global subscribers (insertion order). A subscriber that panics is
    /// caught and logged; the remaining subscribers still run.
    ///
    /// Re-entering `notify` for the same event name on the same thread (a
    /// subscriber that itself emits the event it's handling) is detected and
    /// skipped with a warning rather than recursing.
    pub fn notify(&self, event: Event) {
        let name = event.name();

        let already_dispatching = DISPATCHING.with(|set| !set.borrow_mut().insert(name));
        if already_dispatching {
            warn!(event = name, "dropped re-entrant event dispatch");
            return;
        }

        let named: Vec<_> = self
            .by_name
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default();
        let global: Vec<_> = self.global.lock().unwrap().clone();

        for subscriber in named.iter().chain(global.iter()) {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| subscriber.handle(&event))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic payload>".to_string());
                error!(event = name, %message, "event subscriber failed");
            }
        }

        DISPATCHING.with(|set| {
            set.borrow_mut().remove(name);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn named_subscriber_runs_before_global() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let named_order = order.clone();
        bus.subscribe(
            "start",
            Arc::new(FnSubscriber(move |_: &Event| named_order.lock().unwrap().push("named"))),
        );
        let global_order = order.clone();
        bus.subscribe_global(Arc::new(FnSubscriber(move |_: &Event| {
            global_order.lock().unwrap().push("global")
        })));

        bus.notify(Event::Start);
        assert_eq!(*order.lock().unwrap(), vec!["named", "global"]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.subscribe("start", Arc::new(FnSubscriber(|_: &Event| panic!("boom"))));
        let ran_clone = ran.clone();
        bus.subscribe(
            "start",
            Arc::new(FnSubscriber(move |_: &Event| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );

        bus.notify(Event::Start);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_dispatch_of_same_event_is_skipped() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.subscribe(
            "start",
            Arc::new(FnSubscriber(move |_: &Event| inner.notify(Event::Start))),
        );
        // Should return rather than recurse forever.
        bus.notify(Event::Start);
    }
}
