//! [`Reactor`]: the single-threaded event loop.

use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, trace};

use crate::config::ReactorConfig;
use crate::demux::{record_readiness, Demultiplexer};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::handler::{EventHandler, HandlerResult, TimeoutAction};
use crate::mask::EventMask;
use crate::registry::{HandlerKey, HandlerState, Registry};
use crate::timer::{TimerId, TimerQueue};

/// The single-threaded reactor: a handler registry, a timer queue and a
/// pluggable [`Demultiplexer`], driven by [`Reactor::run`] or one
/// [`Reactor::process_one`] iteration at a time.
///
/// Mirrors the original `Reactor` class's `RunEventLoop`/`ProcessOneHandler`/
/// `HandleEvents` split almost one-to-one; see [`crate::mq_reactor::MqReactor`]
/// for the cross-thread-safe wrapper around it.
pub struct Reactor<D> {
    demux: D,
    registry: Registry,
    timers: TimerQueue,
    config: ReactorConfig,
    running: bool,
    ready: Vec<HandlerKey>,
}

impl<D: Demultiplexer> Reactor<D> {
    /// Build a reactor around `demux` with the default [`ReactorConfig`].
    pub fn new(demux: D) -> Reactor<D> {
        Reactor::with_config(demux, ReactorConfig::default())
    }

    /// Build a reactor around `demux` with an explicit [`ReactorConfig`].
    pub fn with_config(demux: D, config: ReactorConfig) -> Reactor<D> {
        Reactor {
            demux,
            registry: Registry::with_capacity(config.registry_capacity_hint),
            timers: TimerQueue::new(),
            config,
            // Mirrors the original `Reactor::Reactor`, which sets `loop_ =
            // true` as soon as it is constructed with a valid impl, not only
            // once `RunEventLoop` starts: a freshly built reactor is usable
            // for registration right away, and `stop()`/`run()` flip this
            // flag off/back on from there.
            running: true,
            ready: Vec::new(),
        }
    }

    /// Register `handler` for `mask`.
    ///
    /// If `handler.handle()` is valid and an entry already exists for it,
    /// the call merges `mask` into the existing entry's interest instead of
    /// creating a new one, provided it is the same handler (by `Rc`
    /// identity) — a repeated registration with a different handler for
    /// the same handle is a [`Error::Duplicate`]. A handler with
    /// [`Handle::INVALID`] always creates a fresh entry under a synthetic
    /// key, since there's no handle to correlate a later call against.
    ///
    /// Errors with [`Error::BadState`] if the reactor is not running (i.e.
    /// [`Reactor::stop`] was called and [`Reactor::run`] hasn't restarted
    /// it since).
    pub fn register_handler(&mut self, handler: Rc<dyn EventHandler>, mask: EventMask) -> Result<HandlerKey> {
        if !self.running {
            return Err(Error::BadState("reactor not running"));
        }
        let handle = handler.handle();
        if !handle.is_valid() {
            trace!("reactor: registering NOIO handler, mask={:?}", mask);
            return Ok(self.registry.insert_synthetic(handler, mask | EventMask::NOIO));
        }

        let key = Registry::key_for_handle(handle);
        if let Some(entry) = self.registry.get_mut(key) {
            if !Rc::ptr_eq(&entry.handler, &handler) {
                return Err(Error::Duplicate);
            }
            if entry.events.is_noio() && !mask.io_bits().is_empty() {
                return Err(Error::BadState("NOIO handler cannot register I/O interest"));
            }
            let added = mask & !entry.events;
            if !added.is_empty() {
                entry.events |= added;
                if entry.state == HandlerState::Normal && !entry.events.is_noio() {
                    self.demux.modify_events(handle, entry.events.io_bits())?;
                }
            }
            return Ok(key);
        }

        if !mask.is_noio() {
            trace!("reactor: registering {:?}, mask={:?}", handle, mask);
            self.demux.register_handle(handle, mask.io_bits())?;
        }
        Ok(self.registry.insert_by_handle(handle, handler, mask))
    }

    /// Remove `mask`'s bits of interest from `key`'s entry.
    ///
    /// If `mask` covers every bit currently registered on the entry, or the
    /// entry's handle is [`Handle::INVALID`] (there's nothing partial to
    /// keep), the entry is erased entirely: deregistered from the
    /// demultiplexer and every timer it owns cancelled. This is a plain
    /// removal, not a close — `handle_close` is only ever delivered from the
    /// dispatch path (see [`Reactor::mark_closed`]), never from here.
    /// Otherwise just the named bits are cleared from `events` and, if the
    /// entry is [`HandlerState::Normal`], `modify_events` propagates the
    /// narrowed interest to the demultiplexer.
    pub fn remove_handler(&mut self, key: HandlerKey, mask: EventMask) -> Result<()> {
        let handle = self.key_handle(key);
        let entry = self.registry.get(key).ok_or(Error::NotFound)?;
        if !handle.is_valid() || entry.events & !mask == EventMask::NONE {
            return self.erase_entry(key);
        }

        let entry = self.registry.get_mut(key).expect("checked above");
        entry.events &= !mask;
        if entry.state == HandlerState::Normal && !entry.events.is_noio() {
            let interest = entry.events.io_bits();
            self.demux.modify_events(handle, interest)?;
        }
        Ok(())
    }

    /// Suspend I/O delivery for `key`; its timers keep firing. Idempotent.
    pub fn suspend_handler(&mut self, key: HandlerKey) -> Result<()> {
        let handle = self.key_handle(key);
        let entry = self.registry.get_mut(key).ok_or(Error::NotFound)?;
        if entry.state == HandlerState::Closed {
            return Err(Error::BadState("handler is closed"));
        }
        if entry.state == HandlerState::Normal {
            entry.state = HandlerState::Suspended;
            if handle.is_valid() && !entry.events.is_noio() {
                self.demux.modify_events(handle, EventMask::NONE)?;
            }
        }
        Ok(())
    }

    /// Resume I/O delivery for a previously suspended `key`. Idempotent.
    pub fn resume_handler(&mut self, key: HandlerKey) -> Result<()> {
        let handle = self.key_handle(key);
        let entry = self.registry.get_mut(key).ok_or(Error::NotFound)?;
        if entry.state == HandlerState::Closed {
            return Err(Error::BadState("handler is closed"));
        }
        if entry.state == HandlerState::Suspended {
            entry.state = HandlerState::Normal;
            if handle.is_valid() && !entry.events.is_noio() {
                let interest = entry.events.io_bits();
                self.demux.modify_events(handle, interest)?;
            }
        }
        Ok(())
    }

    /// Inject a synthetic event for `key`, delivered on the next loop
    /// iteration exactly as if the demultiplexer or timer queue had
    /// produced it.
    ///
    /// Only a [`HandlerState::Normal`] entry accepts a trigger: a suspended
    /// entry receives no I/O, manual or otherwise, and a closed entry is
    /// done receiving callbacks. Errors with [`Error::BadState`] otherwise,
    /// mirroring the original `Reactor::TriggerHandler`'s
    /// `rh.state == EventHandler::NORMAL_STAT` gate.
    pub fn trigger_handler(&mut self, key: HandlerKey, mask: EventMask) -> Result<()> {
        let entry = self.registry.get(key).ok_or(Error::NotFound)?;
        if entry.state != HandlerState::Normal {
            return Err(Error::BadState("handler is not in the Normal state"));
        }
        record_readiness(&mut self.registry, &mut self.ready, key, mask);
        Ok(())
    }

    /// Register a fresh timer for `key`, firing `delay` from now.
    ///
    /// Errors with [`Error::BadState`] if the reactor is not running.
    pub fn register_timer(&mut self, key: HandlerKey, delay: Duration) -> Result<TimerId> {
        if !self.running {
            return Err(Error::BadState("loop not running"));
        }
        if !self.registry.contains(key) {
            return Err(Error::NotFound);
        }
        let id = self.timers.register(key, delay)?;
        self.registry.get_mut(key).expect("checked above").timers.insert(id);
        Ok(id)
    }

    /// Register a timer under a pre-allocated id (see [`TimerId::alloc`]),
    /// used by [`crate::mq_reactor::MqReactor`] to hand an id back to the
    /// caller before the registration has actually been applied.
    ///
    /// Errors with [`Error::BadState`] if the reactor is not running.
    pub fn register_timer_with_id(&mut self, id: TimerId, key: HandlerKey, delay: Duration) -> Result<()> {
        if !self.running {
            return Err(Error::BadState("loop not running"));
        }
        if !self.registry.contains(key) {
            return Err(Error::NotFound);
        }
        self.timers.register_with_id(id, key, delay)?;
        self.registry.get_mut(key).expect("checked above").timers.insert(id);
        Ok(())
    }

    /// Cancel a pending timer.
    pub fn remove_timer(&mut self, id: TimerId) -> Result<()> {
        self.timers.remove(id)
    }

    /// Re-arm a pending timer for its original delay, measured from now.
    pub fn reset_timer(&mut self, id: TimerId) -> Result<()> {
        self.timers.reset(id)
    }

    /// Number of currently registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of currently pending timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Run the loop until [`Reactor::stop`] is called. Never aborts on a
    /// demultiplexer error; such failures are logged and the loop moves on
    /// to the next iteration, matching the original's "log and continue"
    /// behavior rather than tearing the whole reactor down over one bad
    /// poll.
    pub fn run(&mut self) -> Result<()> {
        self.running = true;
        debug!("reactor: starting loop");
        while self.running {
            self.process_one();
        }
        debug!("reactor: loop stopped");
        Ok(())
    }

    /// Request the loop started by [`Reactor::run`] to stop after its
    /// current iteration. Has no effect if the loop is not running.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether the reactor currently accepts mutators like
    /// [`Reactor::register_handler`] and [`Reactor::register_timer`]. `true`
    /// from construction onward, until [`Reactor::stop`] clears it;
    /// [`Reactor::run`] sets it back to `true` on entry.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Set the running flag directly, bypassing `run`'s own loop.
    ///
    /// Used by [`crate::mq_reactor::MqReactor`], which drives its own loop
    /// around its own iteration (`process_one_mq`) so it can drain queued
    /// commands between iterations.
    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Run exactly one base-loop iteration: poll the demultiplexer, expire
    /// due timers, then dispatch every handler that gained a pending event.
    ///
    /// Mirrors the original `Reactor::RunEventLoop`'s
    /// `PollIOEvents` → `Schedule` → `HandleEvents` ordering: if the
    /// dispatch list already has entries pending (e.g. from a
    /// `trigger_handler` issued between iterations), the poll uses a zero
    /// timeout instead of waiting; timers are only expired *after* the
    /// poll returns, not before. [`crate::mq_reactor::MqReactor`] runs its
    /// own distinct ordering instead (see `process_one_mq`), since the
    /// original's `MQReactor::RunEventLoop` schedules timers before
    /// polling.
    ///
    /// A demultiplex failure is logged and the iteration otherwise
    /// completes normally rather than aborting the caller's loop.
    pub fn process_one(&mut self) {
        let timeout = if !self.ready.is_empty() {
            Duration::from_millis(0)
        } else {
            match self.timers.next_timeout() {
                Some(deadline) => deadline.min(self.config.poll_ceiling),
                None => self.config.poll_ceiling,
            }
        };

        if let Err(err) = self.demux.demultiplex(&mut self.registry, &mut self.ready, Some(timeout)) {
            error!("reactor: demultiplex failed: {}", err);
        }

        self.timers.schedule(&mut self.registry, &mut self.ready);

        let ready = std::mem::take(&mut self.ready);
        for key in ready {
            self.dispatch_entry(key);
        }
    }

    /// [`crate::mq_reactor::MqReactor`]'s loop iteration: schedule timers
    /// before polling the demultiplexer, mirroring the original
    /// `MQReactor::RunEventLoop`'s `ProcessMqMsg` → `Schedule` →
    /// `Demultiplex` → `HandleEvents` ordering, which differs from the base
    /// `Reactor::run`'s own (see `process_one`).
    pub(crate) fn process_one_mq(&mut self) {
        // `self.ready` is always drained by the end of the previous call;
        // anything in it now came from a `trigger_handler` issued between
        // iterations and must be preserved, not cleared, since the
        // corresponding entry's `revents` is already marked pending and
        // `schedule`/`demultiplex` below will not re-add it.
        let timer_timeout = self.timers.schedule(&mut self.registry, &mut self.ready);
        let timeout = match timer_timeout {
            Some(deadline) => deadline.min(self.config.poll_ceiling),
            None => self.config.poll_ceiling,
        };

        if let Err(err) = self.demux.demultiplex(&mut self.registry, &mut self.ready, Some(timeout)) {
            error!("reactor: demultiplex failed: {}", err);
        }

        let ready = std::mem::take(&mut self.ready);
        for key in ready {
            self.dispatch_entry(key);
        }
    }

    fn key_handle(&self, key: HandlerKey) -> Handle {
        match key {
            HandlerKey::ByHandle(handle) => handle,
            HandlerKey::Synthetic(_) => Handle::INVALID,
        }
    }

    /// Deliver every pending callback for `key`'s entry. `ERROR` skips both
    /// I/O callbacks; otherwise READ and WRITE are independent and each
    /// always runs when its bit is set, even if the other already asked to
    /// close — matching the original's unconditional
    /// `if (ev & READ_MASK) {...} if (ev & WRITE_MASK) {...}`, with no
    /// short-circuit between them.
    fn dispatch_entry(&mut self, key: HandlerKey) {
        let (handler, handle, revents, timeout_list) = {
            let entry = match self.registry.get_mut(key) {
                Some(entry) => entry,
                None => return, // removed earlier this iteration
            };
            let revents = std::mem::replace(&mut entry.revents, EventMask::NONE);
            let timeout_list = std::mem::take(&mut entry.timeout_list);
            (Rc::clone(&entry.handler), self.key_handle(key), revents, timeout_list)
        };

        for id in timeout_list {
            match handler.handle_timeout(id) {
                TimeoutAction::Reschedule => {
                    if self.timers.reset(id).is_ok() {
                        if let Some(entry) = self.registry.get_mut(key) {
                            entry.timers.insert(id);
                        }
                    }
                }
                TimeoutAction::Cancel => {
                    let _ = self.timers.remove(id);
                    if let Some(entry) = self.registry.get_mut(key) {
                        entry.timers.remove(&id);
                    }
                }
            }
        }

        let mut close_mask = EventMask::NONE;
        if revents.contains(EventMask::ERROR) {
            close_mask |= EventMask::ERROR;
        } else {
            if revents.contains(EventMask::READ) && self.registry.contains(key) {
                if handler.handle_input(handle) == HandlerResult::Close {
                    close_mask |= EventMask::READ;
                }
            }
            if revents.contains(EventMask::WRITE) && self.registry.contains(key) {
                if handler.handle_output(handle) == HandlerResult::Close {
                    close_mask |= EventMask::WRITE;
                }
            }
        }

        if !close_mask.is_empty() && self.registry.contains(key) {
            self.mark_closed(key, handle, &handler, close_mask);
        }
    }

    /// Mark `key`'s entry [`HandlerState::Closed`] and deliver
    /// `handle_close(handle, close_mask)`. The entry stays registered —
    /// still subject to further dispatch, since nothing here touches the
    /// demultiplexer or the registry — the handler is expected to call
    /// `remove_handler` itself to actually erase it.
    fn mark_closed(&mut self, key: HandlerKey, handle: Handle, handler: &Rc<dyn EventHandler>, close_mask: EventMask) {
        if let Some(entry) = self.registry.get_mut(key) {
            entry.state = HandlerState::Closed;
        }
        trace!("reactor: marking {:?} closed, close_mask={:?}", key, close_mask);
        handler.handle_close(handle, close_mask);
    }

    /// Erase `key`'s entry entirely: deregister it from the demultiplexer,
    /// cancel every timer it owns, and drop it from the registry. Unlike
    /// [`Reactor::mark_closed`], this never calls `handle_close` — it is the
    /// explicit-removal counterpart used by `remove_handler`, not a close
    /// notification.
    fn erase_entry(&mut self, key: HandlerKey) -> Result<()> {
        let entry = self.registry.remove(key).ok_or(Error::NotFound)?;
        let handle = self.key_handle(key);

        for id in &entry.timers {
            let _ = self.timers.remove(*id);
        }

        if handle.is_valid() && !entry.events.is_noio() {
            self.demux.remove_handle(handle)?;
        }

        trace!("reactor: erased {:?}", key);
        Ok(())
    }
}
