//! The [`Demultiplexer`] capability: the OS readiness-polling backend.

#[cfg(target_os = "linux")]
pub mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
))]
pub mod kqueue;

use std::time::Duration;

use crate::error::Result;
use crate::handle::Handle;
use crate::mask::EventMask;
use crate::registry::{HandlerKey, Registry};

/// The OS-abstraction seam: blocks for readiness events and reports them
/// back into the registry.
///
/// A `Reactor` is generic over `Demultiplexer` so the event loop itself
/// never touches `libc` directly; [`epoll::Epoll`] and [`kqueue::Kqueue`]
/// are the shipped reference implementations, one per unix platform
/// family. A test demultiplexer that never produces I/O events (only
/// timers/triggers fire) is a handful of lines against this trait — see
/// the `NullDemultiplexer` in this crate's integration tests.
pub trait Demultiplexer {
    /// Start watching `handle` for `interest` (a subset of
    /// `READ | WRITE`). Called once per entry, the first time a non-NOIO
    /// handler is registered.
    fn register_handle(&mut self, handle: Handle, interest: EventMask) -> Result<()>;

    /// Change the watched interest for an already-registered `handle`.
    /// Passing [`EventMask::NONE`] suspends I/O events without
    /// deregistering (used by `suspend_handler`).
    fn modify_events(&mut self, handle: Handle, interest: EventMask) -> Result<()>;

    /// Stop watching `handle` entirely. Called only when an entry is
    /// removed; suspension uses `modify_events(handle, EventMask::NONE)`
    /// instead so the handle stays registered.
    fn remove_handle(&mut self, handle: Handle) -> Result<()>;

    /// Block for up to `timeout` (or indefinitely if `None`) and OR any
    /// readiness bits observed directly into the owning entries'
    /// `revents` in `registry`, appending each newly-readied
    /// [`HandlerKey`] to `out` exactly once — mirroring
    /// [`crate::timer::TimerQueue::schedule`]'s "only report the entry the
    /// first time a bit is set this iteration" rule.
    ///
    /// A spurious wakeup (timeout elapsed, no events) is not an error: it
    /// returns `Ok(())` having appended nothing to `out`.
    fn demultiplex(&mut self, registry: &mut Registry, out: &mut Vec<HandlerKey>, timeout: Option<Duration>) -> Result<()>;
}

/// Record the readiness bits observed for `key`'s entry, appending it to
/// `out` the first time (this iteration) it gains any pending bits.
///
/// Shared by every `Demultiplexer` implementation so the "report once"
/// rule lives in one place rather than being reimplemented per backend.
pub(crate) fn record_readiness(registry: &mut Registry, out: &mut Vec<HandlerKey>, key: HandlerKey, readiness: EventMask) {
    let readiness = readiness & EventMask::ALL;
    if readiness.is_empty() {
        return;
    }
    if let Some(entry) = registry.get_mut(key) {
        let was_empty = entry.revents.is_empty();
        entry.revents |= readiness;
        if was_empty {
            out.push(key);
        }
    }
}
