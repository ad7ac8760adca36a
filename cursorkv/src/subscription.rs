//! Change notification for one database handle.
//!
//! Each `Database` owns one `EventBus`. Handlers subscribe to an event name
//! of the form `"{store}-{action}"` (for example `users-add`) and receive
//! every matching `ChangeEvent` emitted after they subscribed.
//!
//! # Subscription Lifecycle
//!
//! 1. `Database::subscribe` registers a handler and returns a `Subscription`
//! 2. Successful mutations emit one event each, synchronously
//! 3. `Subscription::unsubscribe` removes exactly that handler
//! 4. `Database::close` tears down every subscription
//!
//! Handlers are snapshotted before invocation, so a handler may subscribe or
//! unsubscribe without deadlocking. Such changes take effect from the next
//! emission.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::types::{Key, Record};

/// The kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Add,
    Update,
    Remove,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// What an event carries.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed for handler snapshots in tests
pub enum ChangePayload {
    /// Records written by `put`/`put_all`.
    Records(Vec<Record>),
    /// The patch applied by an update.
    Patch(Record),
    /// Primary keys deleted by a remove.
    Keys(Vec<Key>),
}

/// A notification of one successful mutation.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed for handler snapshots in tests
pub struct ChangeEvent {
    pub store: String,
    pub action: ChangeAction,
    pub payload: ChangePayload,
}

impl ChangeEvent {
    /// The name handlers subscribe to.
    #[must_use]
    pub fn name(&self) -> String {
        event_name(&self.store, self.action)
    }
}

/// `"{store}-{action}"`.
#[must_use]
pub fn event_name(store: &str, action: ChangeAction) -> String {
    format!("{store}-{action}")
}

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    /// Event name -> handlers in subscription order.
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// Per-handle publish/subscribe registry.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // The handler map holds no invariant a panicking handler could break.
    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(self: &Arc<Self>, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state
            .handlers
            .entry(event.as_str().to_owned())
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::debug!("subscription {id} added for '{event}'");
        Subscription {
            bus: Arc::downgrade(self),
            event,
            id,
        }
    }

    /// Invoke every handler registered for the event's name. Returns how many
    /// ran.
    pub fn emit(&self, event: &ChangeEvent) -> usize {
        let name = event.name();
        let snapshot: Vec<Handler> = {
            let state = self.state();
            state
                .handlers
                .get(&name)
                .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in &snapshot {
            handler(event);
        }
        tracing::debug!("emitted '{name}' to {} handler(s)", snapshot.len());
        snapshot.len()
    }

    fn remove(&self, event: &str, id: u64) -> bool {
        let mut state = self.state();
        let Some(handlers) = state.handlers.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            state.handlers.remove(event);
        }
        removed
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.state().handlers.clear();
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.state().handlers.get(event).map_or(0, Vec::len)
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().handlers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for one registered handler.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<EventBus>,
    event: String,
    id: u64,
}

impl Subscription {
    /// The event name this handler listens to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove this handler. Returns false if it was already gone (for
    /// example after the database was closed).
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove(&self.event, self.id))
    }
}
