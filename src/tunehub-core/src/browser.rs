//! Browser components and the registry that routes requests to them.
//!
//! A browser answers navigation requests (directory listings, search
//! results, ...) with JSON payloads. The registry owns every registered
//! browser, announces additions and removals to global listeners, and keeps a
//! per-browser event set for browser-originated events.

use crate::error::{validate_id, ComponentKind, CoreError, CoreResult};
use crate::events::{EventSet, Listener};
use crate::message::Message;
use crate::request::Request;
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Static description of a browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Asset id of the browser icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub supports_search: bool,
}

/// Payloads broadcast to global browser listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrowserEvent {
    Added {
        id: String,
        #[serde(flatten)]
        info: BrowserInfo,
    },
    Removed {
        id: String,
    },
}

/// A content browser.
///
/// `handle_request` returns `false` to reject a request outright. Accepted
/// requests are answered through [`Request::complete`], either before
/// returning or later from another thread.
pub trait Browser: Send + Sync {
    fn info(&self) -> BrowserInfo;

    fn handle_request(&self, request: Request) -> bool;

    /// Called once after registration with a handle for sending events.
    fn bind(&self, _handle: BrowserHandle) {}

    /// Resolve an asset id (an icon or cover) to a locator.
    fn asset(&self, _id: &str) -> Option<String> {
        None
    }

    /// Apply the `[components."<id>"]` table from the configuration.
    fn configure(&self, _settings: &toml::Table) {}
}

/// Handle given to a registered browser.
#[derive(Clone)]
pub struct BrowserHandle {
    id: Arc<str>,
    events: Arc<EventSet>,
}

impl BrowserHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Broadcast a browser-originated event to the listeners attached to this
    /// browser's id.
    pub fn send_event(&self, message: Message) {
        self.events.broadcast(Some(&message));
    }
}

impl fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserHandle").field("id", &self.id).finish()
    }
}

struct BrowserEntry {
    seq: u64,
    browser: Arc<dyn Browser>,
    info: BrowserInfo,
    events: Arc<EventSet>,
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<BrowserEntry>>,
    next_seq: u64,
}

/// Registry of browsers keyed by id.
#[derive(Default)]
pub struct BrowserRegistry {
    entries: Mutex<Entries>,
    events: EventSet,
    // Serializes mutations with their broadcasts so listeners observe
    // add/remove in the order they happened. Reentrant so listeners may call
    // back into the registry.
    emit: ReentrantMutex<()>,
}

impl BrowserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, browser: Arc<dyn Browser>) -> CoreResult<()> {
        validate_id(id)?;
        let _emit = self.emit.lock();
        let info = browser.info();
        let events = Arc::new(EventSet::new());
        {
            let mut entries = self.entries.lock();
            if entries.by_id.contains_key(id) {
                return Err(CoreError::AlreadyRegistered {
                    kind: ComponentKind::Browser,
                    id: id.to_string(),
                });
            }
            let seq = entries.next_seq;
            entries.next_seq += 1;
            entries.by_id.insert(
                id.to_string(),
                Arc::new(BrowserEntry {
                    seq,
                    browser: browser.clone(),
                    info: info.clone(),
                    events: events.clone(),
                }),
            );
        }
        browser.bind(BrowserHandle {
            id: Arc::from(id),
            events,
        });
        tracing::info!(browser_id = id, name = %info.name, "browser registered");
        self.broadcast(&BrowserEvent::Added {
            id: id.to_string(),
            info,
        });
        Ok(())
    }

    pub fn remove(&self, id: &str) -> CoreResult<()> {
        let _emit = self.emit.lock();
        let entry = self
            .entries
            .lock()
            .by_id
            .remove(id)
            .ok_or_else(|| not_registered(id))?;
        tracing::info!(browser_id = id, "browser removed");
        self.broadcast(&BrowserEvent::Removed { id: id.to_string() });
        entry.events.broadcast(None);
        entry.events.clear();
        Ok(())
    }

    /// Remove every browser, newest first.
    pub fn clear(&self) {
        let _emit = self.emit.lock();
        let mut ids = self.ordered();
        ids.reverse();
        for (id, _) in ids {
            if let Err(err) = self.remove(&id) {
                tracing::warn!(browser_id = %id, error = %err, "failed to remove browser");
            }
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.lock().by_id.contains_key(id)
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<dyn Browser>> {
        self.entries
            .lock()
            .by_id
            .get(id)
            .map(|entry| entry.browser.clone())
    }

    pub fn info(&self, id: &str) -> Option<BrowserInfo> {
        self.entries.lock().by_id.get(id).map(|e| e.info.clone())
    }

    /// Registered browsers in registration order.
    pub fn list(&self) -> Vec<(String, BrowserInfo)> {
        self.ordered()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach a listener.
    ///
    /// With `id == None` the listener is global: it first receives one
    /// `added` event per registered browser, then every later add/remove.
    /// With an id, it receives that browser's own events and no replay.
    pub fn add_event_listener(&self, id: Option<&str>, listener: Listener) -> CoreResult<()> {
        let _emit = self.emit.lock();
        match id {
            None => {
                if !self.events.add(listener.clone()) {
                    return Err(CoreError::ListenerAlreadyRegistered);
                }
                for (id, info) in self.ordered() {
                    let event = BrowserEvent::Added { id, info };
                    if let Some(message) = encode(&event) {
                        listener.send(Some(&message));
                    }
                }
                Ok(())
            }
            Some(id) => {
                let events = self.entry(id)?.events.clone();
                if events.add(listener) {
                    Ok(())
                } else {
                    Err(CoreError::ListenerAlreadyRegistered)
                }
            }
        }
    }

    /// Detach a listener. Removing a listener that is not attached is a no-op.
    pub fn remove_event_listener(&self, id: Option<&str>, listener: &Listener) -> CoreResult<()> {
        match id {
            None => {
                self.events.remove(listener);
            }
            Some(id) => {
                self.entry(id)?.events.remove(listener);
            }
        }
        Ok(())
    }

    /// Route `message` to browser `id`.
    ///
    /// Responses reach `listener` as `Some(response)`, followed by a single
    /// `None` once the request is completed or canceled. The returned request
    /// can be used to cancel it. If the browser rejects the request the
    /// listener still receives the `None` and [`CoreError::HandlerFailed`] is
    /// returned.
    pub fn handle_request(&self, id: &str, message: Message, listener: Listener) -> CoreResult<Request> {
        let entry = self.entry(id)?;
        let on_response = {
            let listener = listener.clone();
            move |response: &Message| {
                listener.send(Some(response));
            }
        };
        let request = Request::with_finish(message, on_response, move || {
            listener.send(None);
        });
        if !entry.browser.handle_request(request.clone()) {
            tracing::debug!(browser_id = id, "browser rejected request");
            request.cancel();
            return Err(CoreError::HandlerFailed { id: id.to_string() });
        }
        Ok(request)
    }

    pub fn get_asset(&self, id: &str, asset: &str) -> Option<String> {
        let entry = self.entry(id).ok()?;
        entry.browser.asset(asset)
    }

    fn entry(&self, id: &str) -> CoreResult<Arc<BrowserEntry>> {
        self.entries
            .lock()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| not_registered(id))
    }

    fn ordered(&self) -> Vec<(String, BrowserInfo)> {
        let entries = self.entries.lock();
        let mut list: Vec<_> = entries
            .by_id
            .iter()
            .map(|(id, entry)| (entry.seq, id.clone(), entry.info.clone()))
            .collect();
        list.sort_by_key(|(seq, _, _)| *seq);
        list.into_iter().map(|(_, id, info)| (id, info)).collect()
    }

    fn broadcast(&self, event: &BrowserEvent) {
        if let Some(message) = encode(event) {
            self.events.broadcast(Some(&message));
        }
    }
}

fn encode(event: &BrowserEvent) -> Option<Message> {
    match Message::from_json(event) {
        Ok(message) => Some(message),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode browser event");
            None
        }
    }
}

fn not_registered(id: &str) -> CoreError {
    CoreError::NotRegistered {
        kind: ComponentKind::Browser,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Echo;

    impl Browser for Echo {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Echo".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, request: Request) -> bool {
            let reply = request.message().clone();
            request.complete(reply);
            true
        }
    }

    struct Refuse;

    impl Browser for Refuse {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Refuse".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, _request: Request) -> bool {
            false
        }
    }

    fn recorder() -> (Listener, Arc<Mutex<Vec<Option<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = Listener::new(move |msg| {
            sink.lock().push(msg.map(Message::to_text));
            true
        });
        (listener, seen)
    }

    #[test]
    fn invalid_ids_rejected() {
        let registry = BrowserRegistry::new();
        let err = registry.add("Bad Id", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidId { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let registry = BrowserRegistry::new();
        registry.add("echo", Arc::new(Echo)).unwrap();
        let err = registry.add("echo", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRegistered { .. }));
    }

    #[test]
    fn global_listener_gets_replay_then_deltas() {
        let registry = BrowserRegistry::new();
        registry.add("b1", Arc::new(Echo)).unwrap();
        registry.add("b2", Arc::new(Echo)).unwrap();
        let (listener, seen) = recorder();
        registry.add_event_listener(None, listener.clone()).unwrap();
        registry.remove("b1").unwrap();

        let events: Vec<BrowserEvent> = seen
            .lock()
            .iter()
            .map(|m| serde_json::from_str(m.as_deref().unwrap()).unwrap())
            .collect();
        assert!(matches!(&events[0], BrowserEvent::Added { id, .. } if id == "b1"));
        assert!(matches!(&events[1], BrowserEvent::Added { id, .. } if id == "b2"));
        assert_eq!(events[2], BrowserEvent::Removed { id: "b1".into() });

        assert_eq!(
            registry.add_event_listener(None, listener),
            Err(CoreError::ListenerAlreadyRegistered)
        );
    }

    #[test]
    fn request_response_then_end() {
        let registry = BrowserRegistry::new();
        registry.add("echo", Arc::new(Echo)).unwrap();
        let (listener, seen) = recorder();
        let request = registry
            .handle_request("echo", Message::from("hello"), listener)
            .unwrap();
        assert!(request.is_completed());
        assert_eq!(*seen.lock(), vec![Some("hello".to_string()), None]);
        assert!(!request.cancel());
    }

    #[test]
    fn rejected_request_ends_and_errors() {
        let registry = BrowserRegistry::new();
        registry.add("refuse", Arc::new(Refuse)).unwrap();
        let (listener, seen) = recorder();
        let err = registry
            .handle_request("refuse", Message::from("x"), listener)
            .unwrap_err();
        assert!(matches!(err, CoreError::HandlerFailed { .. }));
        assert_eq!(*seen.lock(), vec![None]);
    }

    #[test]
    fn unknown_browser_is_reported() {
        let registry = BrowserRegistry::new();
        let (listener, seen) = recorder();
        let err = registry
            .handle_request("missing", Message::from("x"), listener)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotRegistered { .. }));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn browser_events_reach_instance_listeners() {
        struct Noisy(Mutex<Option<BrowserHandle>>);
        impl Browser for Noisy {
            fn info(&self) -> BrowserInfo {
                BrowserInfo::default()
            }
            fn handle_request(&self, _request: Request) -> bool {
                true
            }
            fn bind(&self, handle: BrowserHandle) {
                *self.0.lock() = Some(handle);
            }
        }

        let registry = BrowserRegistry::new();
        let noisy = Arc::new(Noisy(Mutex::new(None)));
        registry.add("noisy", noisy.clone()).unwrap();
        let (listener, seen) = recorder();
        registry
            .add_event_listener(Some("noisy"), listener)
            .unwrap();
        let handle = noisy.0.lock().clone().unwrap();
        assert_eq!(handle.id(), "noisy");
        handle.send_event(Message::from("changed"));
        registry.remove("noisy").unwrap();
        assert_eq!(*seen.lock(), vec![Some("changed".to_string()), None]);
    }

    #[test]
    fn pending_request_can_be_canceled() {
        struct Hold(Mutex<Vec<Request>>);
        impl Browser for Hold {
            fn info(&self) -> BrowserInfo {
                BrowserInfo::default()
            }
            fn handle_request(&self, request: Request) -> bool {
                self.0.lock().push(request);
                true
            }
        }

        let registry = BrowserRegistry::new();
        let hold = Arc::new(Hold(Mutex::new(Vec::new())));
        registry.add("hold", hold.clone()).unwrap();
        let (listener, seen) = recorder();
        let request = registry
            .handle_request("hold", Message::from("x"), listener)
            .unwrap();
        assert!(request.cancel());
        let held = hold.0.lock().pop().unwrap();
        assert!(!held.complete(Message::from("late")));
        assert_eq!(*seen.lock(), vec![None]);
    }
}
