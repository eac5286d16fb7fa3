//! Listener fan-out for received lines.
//!
//! Every handler owns a [`Listeners`] set. The handler's read path calls
//! [`Listeners::dispatch_line`] for each received line and
//! [`Listeners::dispatch_error`] when the transport fails. Delivery is
//! synchronous, in registration order, on the read path itself: a slow
//! listener delays every listener registered after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::error::Error;

/// Observer of a handler's received data.
pub trait Listener: Send + Sync {
    /// Called for every line received from the device.
    fn data_received(&self, line: &str);

    /// Called when the transport fails.
    fn error(&self, error: &Error);
}

/// Token returned by [`Listeners::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn Listener>);

#[derive(Default)]
struct ListenersInner {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl ListenersInner {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The set of listeners registered on one handler.
///
/// Cloning is cheap and yields a handle to the same set.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<ListenersInner>,
}

impl Listeners {
    /// Creates an empty listener set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns the token used to unregister it.
    pub fn register(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.entries().push((id, listener));
        tracing::trace!("registered listener {:?}", id);
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.inner.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            tracing::trace!("unregistered listener {:?}", id);
        }
        removed
    }

    /// Returns true if at least one listener is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.inner.entries().is_empty()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_listeners()
    }

    /// Delivers a received line to every registered listener.
    ///
    /// The listener list is snapshotted first, so listeners may register or
    /// unregister (themselves included) while being notified. A listener
    /// removed during this call still sees the current line.
    pub fn dispatch_line(&self, line: &str) {
        for listener in self.snapshot() {
            listener.data_received(line);
        }
    }

    /// Delivers a transport error to every registered listener.
    pub fn dispatch_error(&self, error: &Error) {
        for listener in self.snapshot() {
            listener.error(error);
        }
    }

    /// Registers a channel-backed listener and returns its receiving end.
    ///
    /// Events that do not fit into `capacity` are dropped with a warning,
    /// since the read path must not block on a slow consumer.
    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, receiver) = mpsc::channel(capacity);
        let id = self.register(Arc::new(ChannelListener { tx }));
        Subscription {
            id,
            receiver,
            listeners: self.downgrade(),
        }
    }

    /// Creates a weak handle that does not keep the set alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakListeners {
        WeakListeners {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.inner
            .entries()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

/// Weak handle to a [`Listeners`] set.
#[derive(Clone)]
pub struct WeakListeners {
    inner: Weak<ListenersInner>,
}

impl WeakListeners {
    /// Upgrades to a strong handle if the set still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<Listeners> {
        self.inner.upgrade().map(|inner| Listeners { inner })
    }
}

/// Event delivered through a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line received from the device.
    Line(String),
    /// The transport reported an error.
    Error(String),
}

struct ChannelListener {
    tx: mpsc::Sender<Event>,
}

impl ChannelListener {
    fn forward(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("subscription full, dropping {:?}", event);
            }
        }
    }
}

impl Listener for ChannelListener {
    fn data_received(&self, line: &str) {
        self.forward(Event::Line(line.to_owned()));
    }

    fn error(&self, error: &Error) {
        self.forward(Event::Error(error.to_string()));
    }
}

/// An async stream of events from one handler.
///
/// The underlying listener stays registered until the subscription is
/// dropped, which counts towards the handler's listeners on release.
pub struct Subscription {
    id: ListenerId,
    receiver: mpsc::Receiver<Event>,
    listeners: WeakListeners,
}

impl Subscription {
    /// Receives the next event, or `None` once the handler is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// The listener token backing this subscription.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.unregister(self.id);
        }
    }
}
