use crate::message::Message;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Callback = dyn Fn(Option<&Message>) -> bool + Send + Sync;

/// A callable receiving event or response messages.
///
/// `None` is the end marker: for request listeners it means no more responses
/// follow, for event listeners it means the source is going away.
///
/// Two listeners are equal when they were cloned from the same construction,
/// which is how they are identified for removal.
#[derive(Clone)]
pub struct Listener {
    callback: Arc<Callback>,
}

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Option<&Message>) -> bool + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Deliver one message. The listener's return value is advisory.
    pub fn send(&self, message: Option<&Message>) -> bool {
        (self.callback)(message)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.callback) as *const () == Arc::as_ptr(&other.callback) as *const ()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&(Arc::as_ptr(&self.callback) as *const ()))
            .finish()
    }
}

/// Ordered set of listeners.
#[derive(Debug, Default)]
pub struct EventSet {
    listeners: Mutex<Vec<Listener>>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the listener is already present.
    pub fn add(&self, listener: Listener) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.contains(&listener) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns `false` if the listener was not present.
    pub fn remove(&self, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|l| l == listener) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, listener: &Listener) -> bool {
        self.listeners.lock().contains(listener)
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Send `message` to every listener in insertion order.
    ///
    /// Listeners run against a snapshot taken before the first call, so they
    /// may add or remove listeners on this set without deadlocking.
    pub fn broadcast(&self, message: Option<&Message>) {
        let snapshot = self.listeners.lock().clone();
        for listener in snapshot {
            listener.send(message);
        }
    }
}
