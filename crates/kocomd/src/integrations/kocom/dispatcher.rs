//! Named one-to-many signals.
//!
//! Handlers run synchronously on the sender's task and must not block.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use crate::engine::lock;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Handlers<T> {
    next_id: u64,
    by_signal: HashMap<String, Vec<(u64, Handler<T>)>>,
}

pub struct Dispatcher<T> {
    handlers: Arc<Mutex<Handlers<T>>>,
}

impl<T: 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Handlers {
                next_id: 0,
                by_signal: HashMap::new(),
            })),
        }
    }

    /// Connect `handler` to `signal` until the returned subscription is dropped.
    #[must_use = "dropping the subscription disconnects the handler"]
    pub fn connect(
        &self,
        signal: impl Into<String>,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let signal = signal.into();
        let id = {
            let mut handlers = lock(&self.handlers);
            let id = handlers.next_id;
            handlers.next_id += 1;
            handlers
                .by_signal
                .entry(signal.clone())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Handlers<T>>> = Arc::downgrade(&self.handlers);
        Subscription {
            disconnect: Some(Box::new(move || {
                let Some(handlers) = weak.upgrade() else {
                    return;
                };
                let mut handlers = lock(&handlers);
                if let Some(list) = handlers.by_signal.get_mut(&signal) {
                    list.retain(|(handler_id, _)| *handler_id != id);
                    if list.is_empty() {
                        handlers.by_signal.remove(&signal);
                    }
                }
            })),
        }
    }

    /// Invoke every handler connected to `signal`, returning how many ran.
    ///
    /// The handler list is copied first so handlers may connect or
    /// disconnect while being called.
    pub fn send(&self, signal: &str, payload: &T) -> usize {
        let handlers: Vec<Handler<T>> = lock(&self.handlers)
            .by_signal
            .get(signal)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    #[cfg(test)]
    pub fn handler_count(&self, signal: &str) -> usize {
        lock(&self.handlers)
            .by_signal
            .get(signal)
            .map_or(0, Vec::len)
    }
}

impl<T: 'static> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection of one handler; disconnects on drop.
pub struct Subscription {
    disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn disconnect(mut self) {
        self.run_disconnect();
    }

    fn run_disconnect(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_disconnect();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn test_send_reaches_connected_handlers() {
        let dispatcher = Dispatcher::<u8>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let _a = dispatcher.connect("signal", move |value| {
            counter.fetch_add(usize::from(*value), Ordering::SeqCst);
        });
        let counter = seen.clone();
        let _b = dispatcher.connect("signal", move |value| {
            counter.fetch_add(usize::from(*value), Ordering::SeqCst);
        });

        assert_eq!(dispatcher.send("signal", &2), 2);
        assert_eq!(dispatcher.send("other", &2), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_drop_disconnects() {
        let dispatcher = Dispatcher::<()>::new();
        let first = dispatcher.connect("signal", |_| {});
        let second = dispatcher.connect("signal", |_| {});
        assert_eq!(dispatcher.handler_count("signal"), 2);

        drop(first);
        assert_eq!(dispatcher.handler_count("signal"), 1);

        second.disconnect();
        assert_eq!(dispatcher.handler_count("signal"), 0);
        assert_eq!(dispatcher.send("signal", &()), 0);
    }

    #[test]
    fn test_subscription_outlives_dispatcher() {
        let dispatcher = Dispatcher::<()>::new();
        let subscription = dispatcher.connect("signal", |_| {});
        drop(dispatcher);
        drop(subscription);
    }

    #[test]
    fn test_handler_may_connect_during_send() {
        let dispatcher = Arc::new(Dispatcher::<()>::new());
        let kept = Arc::new(Mutex::new(Vec::new()));

        let inner = dispatcher.clone();
        let store = kept.clone();
        let _outer = dispatcher.connect("add", move |_| {
            lock(&store).push(inner.connect("update", |_| {}));
        });

        dispatcher.send("add", &());
        assert_eq!(dispatcher.handler_count("update"), 1);
    }
}
