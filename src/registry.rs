//! The handler registry: [`RegHandler`] entries keyed by [`HandlerKey`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::handle::Handle;
use crate::handler::EventHandler;
use crate::mask::EventMask;
use crate::timer::TimerId;

/// The registry key identifying a [`RegHandler`] entry.
///
/// Returned by [`Reactor::register_handler`] and used by every other
/// mutator to refer back to the same entry, replacing the distilled spec's
/// "look the entry up again by `handler.handle()`" convention with a token
/// that is valid even for NOIO handlers that share the same (invalid)
/// handle.
///
/// [`Reactor::register_handler`]: crate::reactor::Reactor::register_handler
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub enum HandlerKey {
    /// Keyed by the handler's own (valid) [`Handle`].
    ByHandle(Handle),
    /// A synthetic key allocated for a handler with no valid `Handle`.
    Synthetic(u64),
}

impl fmt::Debug for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandlerKey::ByHandle(h) => write!(f, "HandlerKey::ByHandle({:?})", h),
            HandlerKey::Synthetic(id) => write!(f, "HandlerKey::Synthetic({})", id),
        }
    }
}

/// Lifecycle state of a [`RegHandler`] entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HandlerState {
    /// Normal operation: I/O events are delivered.
    Normal,
    /// I/O events are suppressed (`modify_events(NONE)` was issued); timers
    /// still fire.
    Suspended,
    /// A close was delivered; the entry is not auto-removed, the handler is
    /// expected to call `remove_handler`.
    Closed,
}

/// A single registered handler and everything the reactor tracks about it.
pub struct RegHandler {
    /// The owning strong reference to the handler (the single ref-count
    /// bump described by the distilled spec's data model).
    pub handler: Rc<dyn EventHandler>,
    /// The currently registered interest mask.
    pub events: EventMask,
    /// Lifecycle state.
    pub state: HandlerState,
    /// Events pending dispatch for the current iteration.
    pub revents: EventMask,
    /// Timer ids that fired this iteration, in FIFO order.
    pub timeout_list: Vec<TimerId>,
    /// Timer ids currently owned by this entry.
    pub timers: HashSet<TimerId>,
}

impl RegHandler {
    fn new(handler: Rc<dyn EventHandler>, events: EventMask) -> RegHandler {
        RegHandler {
            handler,
            events,
            state: HandlerState::Normal,
            revents: EventMask::NONE,
            timeout_list: Vec::new(),
            timers: HashSet::new(),
        }
    }
}

impl fmt::Debug for RegHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RegHandler")
            .field("events", &self.events)
            .field("state", &self.state)
            .field("revents", &self.revents)
            .field("timers", &self.timers)
            .finish()
    }
}

/// The reactor's handler registry: a [`HandlerKey`]-keyed map of
/// [`RegHandler`] entries.
///
/// Every entry is keyed by `handler.handle()` when that handle is valid, or
/// by a synthetic key otherwise (distilled spec §3 "Invariants": "the key is
/// stable for the entry's lifetime").
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<HandlerKey, RegHandler>,
    next_synthetic: u64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Registry {
        Registry::with_capacity(0)
    }

    /// Create an empty registry with its backing map pre-sized to hold at
    /// least `capacity` entries without reallocating.
    pub fn with_capacity(capacity: usize) -> Registry {
        Registry {
            entries: HashMap::with_capacity(capacity),
            next_synthetic: 0,
        }
    }

    /// Insert a fresh entry keyed by `handle`, returning an error if the key
    /// is already present (callers are expected to have checked first; this
    /// guards the invariant in debug builds).
    pub fn insert_by_handle(&mut self, handle: Handle, handler: Rc<dyn EventHandler>, events: EventMask) -> HandlerKey {
        let key = HandlerKey::ByHandle(handle);
        debug_assert!(!self.entries.contains_key(&key), "registry key collision on insert");
        trace!("registry: inserting entry for {:?}, events={:?}", key, events);
        self.entries.insert(key, RegHandler::new(handler, events));
        key
    }

    /// Insert a fresh entry under a newly allocated synthetic key (used for
    /// handlers with no valid `Handle`, e.g. timer-only handlers).
    pub fn insert_synthetic(&mut self, handler: Rc<dyn EventHandler>, events: EventMask) -> HandlerKey {
        let id = self.next_synthetic;
        self.next_synthetic += 1;
        let key = HandlerKey::Synthetic(id);
        trace!("registry: inserting synthetic entry for {:?}, events={:?}", key, events);
        self.entries.insert(key, RegHandler::new(handler, events));
        key
    }

    /// Look up the key that would be used for a registered (valid) handle,
    /// without requiring an existing entry.
    pub fn key_for_handle(handle: Handle) -> HandlerKey {
        HandlerKey::ByHandle(handle)
    }

    /// Shared access to an entry.
    pub fn get(&self, key: HandlerKey) -> Option<&RegHandler> {
        self.entries.get(&key)
    }

    /// Mutable access to an entry.
    pub fn get_mut(&mut self, key: HandlerKey) -> Option<&mut RegHandler> {
        self.entries.get_mut(&key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: HandlerKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Remove and return the entry for `key`, if present.
    pub fn remove(&mut self, key: HandlerKey) -> Option<RegHandler> {
        trace!("registry: removing entry for {:?}", key);
        self.entries.remove(&key)
    }

    /// Iterate over all entries (used by invariant checks and tests).
    pub fn iter(&self) -> impl Iterator<Item = (&HandlerKey, &RegHandler)> {
        self.entries.iter()
    }

    /// Number of entries currently registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
