//! [`MqReactor`]: a cross-thread-safe wrapper around [`Reactor`].

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;

use crate::command::Command;
use crate::config::ReactorConfig;
use crate::demux::Demultiplexer;
use crate::error::Result;
use crate::handle::Handle;
use crate::handler::{EventHandler, HandlerResult, TimeoutAction};
use crate::mask::EventMask;
use crate::reactor::Reactor;
use crate::registry::HandlerKey;
use crate::timer::TimerId;

/// Composes a [`Reactor`] with a `Mutex`-guarded command queue so
/// registrations, removals, suspends and timer changes requested from any
/// thread are applied safely on the loop thread.
///
/// This wraps rather than subclasses `Reactor` (composition over
/// inheritance), and fixes a bug present in the original `ProcessMqMsg`:
/// that routine only iterated its staging buffer when the swap into it had
/// *not* happened, so a normal (non-empty-queue) call silently dropped
/// every queued command. Here there is exactly one buffer — the one
/// produced by the swap — and it is always the one iterated.
pub struct MqReactor<D> {
    reactor: Reactor<D>,
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl<D: Demultiplexer> MqReactor<D> {
    /// Build an `MqReactor` around `demux` with the default
    /// [`ReactorConfig`].
    pub fn new(demux: D) -> MqReactor<D> {
        MqReactor::with_config(demux, ReactorConfig::default())
    }

    /// Build an `MqReactor` around `demux` with an explicit
    /// [`ReactorConfig`].
    pub fn with_config(demux: D, config: ReactorConfig) -> MqReactor<D> {
        MqReactor {
            reactor: Reactor::with_config(demux, config),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// A `Send + Sync` handle that can queue commands from any thread.
    pub fn handle(&self) -> MqHandle {
        MqHandle { queue: Arc::clone(&self.queue) }
    }

    /// Register `handler` directly, without going through the command
    /// queue. Only safe to call from the loop thread (e.g. before
    /// `run`, or while handling a callback on the loop thread).
    pub fn register_handler(&mut self, handler: Rc<dyn EventHandler>, mask: EventMask) -> Result<HandlerKey> {
        self.reactor.register_handler(handler, mask)
    }

    /// Number of currently registered handlers.
    pub fn handler_count(&self) -> usize {
        self.reactor.handler_count()
    }

    /// Number of currently pending timers.
    pub fn timer_count(&self) -> usize {
        self.reactor.timer_count()
    }

    /// Run the loop until [`MqReactor::stop`] is called (directly, or via
    /// a queued command), draining queued commands before each iteration.
    /// Never aborts on a bad queued command or a demultiplex failure; both
    /// are logged and the loop moves on.
    pub fn run(&mut self) -> Result<()> {
        self.reactor.set_running(true);
        log::debug!("mq reactor: starting loop");
        while self.reactor.is_running() {
            self.step();
        }
        Ok(())
    }

    /// Request the loop to stop after its current iteration.
    pub fn stop(&mut self) {
        self.reactor.stop();
    }

    /// Drain whatever commands are currently queued, then run exactly one
    /// iteration of the underlying reactor.
    ///
    /// This is the building block [`MqReactor::run`] loops on; it is
    /// exposed directly for callers that want to drive the loop themselves
    /// (e.g. to interleave it with other work on the same thread, or in
    /// tests). A failure applying one queued command, or a demultiplex
    /// failure, is logged and does not stop the drain or the iteration —
    /// mirroring the original `ProcessMqMsg`, which logs and moves on to
    /// the next queued message rather than aborting (spec: the loop never
    /// aborts on a handler or demultiplexer error).
    pub fn step(&mut self) {
        self.drain_commands();
        self.reactor.process_one_mq();
    }

    /// Apply every command currently queued, in FIFO order, by swapping
    /// the shared queue into a local buffer under the lock and iterating
    /// that exact buffer after releasing it.
    fn drain_commands(&mut self) {
        let mut pending = VecDeque::new();
        {
            let mut guard = self.queue.lock().expect("command queue mutex poisoned");
            std::mem::swap(&mut *guard, &mut pending);
        }
        if pending.is_empty() {
            return;
        }
        trace!("mq reactor: draining {} queued commands", pending.len());
        for command in pending {
            if let Err(err) = self.apply(command) {
                log::error!("mq reactor: applying queued command failed: {}", err);
            }
        }
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::RegisterHandler { handler, mask } => {
                self.reactor.register_handler(Rc::new(ArcHandler(handler)), mask)?;
            }
            Command::RemoveHandler { key, mask } => {
                self.reactor.remove_handler(key, mask)?;
            }
            Command::SuspendHandler { key } => {
                self.reactor.suspend_handler(key)?;
            }
            Command::ResumeHandler { key } => {
                self.reactor.resume_handler(key)?;
            }
            Command::TriggerHandler { key, mask } => {
                self.reactor.trigger_handler(key, mask)?;
            }
            Command::RegisterTimer { id, key, delay } => {
                self.reactor.register_timer_with_id(id, key, delay)?;
            }
            Command::RemoveTimer { id } => {
                self.reactor.remove_timer(id)?;
            }
            Command::ResetTimer { id } => {
                self.reactor.reset_timer(id)?;
            }
            Command::Stop => {
                self.reactor.stop();
            }
        }
        Ok(())
    }
}

/// Adapts a cross-thread `Arc<dyn EventHandler + Send + Sync>` (the shape
/// a [`Command::RegisterHandler`] carries) to the `Rc<dyn EventHandler>`
/// the single-threaded [`Reactor`] stores internally.
struct ArcHandler(Arc<dyn EventHandler + Send + Sync>);

impl EventHandler for ArcHandler {
    fn handle(&self) -> Handle {
        self.0.handle()
    }
    fn handle_input(&self, handle: Handle) -> HandlerResult {
        self.0.handle_input(handle)
    }
    fn handle_output(&self, handle: Handle) -> HandlerResult {
        self.0.handle_output(handle)
    }
    fn handle_timeout(&self, timer: TimerId) -> TimeoutAction {
        self.0.handle_timeout(timer)
    }
    fn handle_close(&self, handle: Handle, revents: EventMask) {
        self.0.handle_close(handle, revents)
    }
}

/// A cheaply cloneable, `Send + Sync` handle to an [`MqReactor`]'s command
/// queue.
///
/// Every method here queues a [`Command`] and returns immediately; the
/// corresponding effect is applied on the loop thread the next time it
/// drains the queue (every iteration of [`MqReactor::run`]), not
/// synchronously. `MqHandle` is automatically `Send + Sync` because every
/// field of [`Command`] is: in particular handlers queued through it are
/// `Arc<dyn EventHandler + Send + Sync>`, not `Rc`.
#[derive(Clone)]
pub struct MqHandle {
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl MqHandle {
    /// Queue a handler registration.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler + Send + Sync>, mask: EventMask) {
        self.push(Command::RegisterHandler { handler, mask });
    }

    /// Queue removing `mask`'s bits from `key`'s entry, as
    /// [`Reactor::remove_handler`](crate::reactor::Reactor::remove_handler).
    pub fn remove_handler(&self, key: HandlerKey, mask: EventMask) {
        self.push(Command::RemoveHandler { key, mask });
    }

    /// Queue suspending I/O delivery for `key`.
    pub fn suspend_handler(&self, key: HandlerKey) {
        self.push(Command::SuspendHandler { key });
    }

    /// Queue resuming I/O delivery for `key`.
    pub fn resume_handler(&self, key: HandlerKey) {
        self.push(Command::ResumeHandler { key });
    }

    /// Queue a synthetic event for `key`.
    pub fn trigger_handler(&self, key: HandlerKey, mask: EventMask) {
        self.push(Command::TriggerHandler { key, mask });
    }

    /// Allocate a [`TimerId`] now and queue its registration, returning
    /// the id immediately so the caller can reference it (e.g. to cancel
    /// it) before the loop thread has applied the registration.
    pub fn register_timer(&self, key: HandlerKey, delay: Duration) -> TimerId {
        let id = TimerId::alloc();
        self.push(Command::RegisterTimer { id, key, delay });
        id
    }

    /// Queue cancelling a pending timer.
    pub fn remove_timer(&self, id: TimerId) {
        self.push(Command::RemoveTimer { id });
    }

    /// Queue re-arming a pending timer.
    pub fn reset_timer(&self, id: TimerId) {
        self.push(Command::ResetTimer { id });
    }

    /// Queue a request to stop the loop after its current iteration. This
    /// is the only way to shut a running [`MqReactor`] down from a thread
    /// other than the one driving it.
    pub fn stop(&self) {
        self.push(Command::Stop);
    }

    fn push(&self, command: Command) {
        let mut guard = self.queue.lock().expect("command queue mutex poisoned");
        guard.push_back(command);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct NullDemultiplexer;

    impl Demultiplexer for NullDemultiplexer {
        fn register_handle(&mut self, _: Handle, _: EventMask) -> Result<()> {
            Ok(())
        }
        fn modify_events(&mut self, _: Handle, _: EventMask) -> Result<()> {
            Ok(())
        }
        fn remove_handle(&mut self, _: Handle) -> Result<()> {
            Ok(())
        }
        fn demultiplex(&mut self, _: &mut crate::registry::Registry, _: &mut Vec<HandlerKey>, _: Option<Duration>) -> Result<()> {
            Ok(())
        }
    }

    struct CountingHandler {
        inputs: Arc<AtomicUsize>,
    }

    impl EventHandler for CountingHandler {
        fn handle(&self) -> Handle {
            Handle::INVALID
        }
        fn handle_input(&self, _: Handle) -> HandlerResult {
            self.inputs.fetch_add(1, Ordering::SeqCst);
            HandlerResult::Keep
        }
        fn handle_output(&self, _: Handle) -> HandlerResult {
            HandlerResult::Keep
        }
        fn handle_timeout(&self, _: TimerId) -> TimeoutAction {
            TimeoutAction::Cancel
        }
        fn handle_close(&self, _: Handle, _: EventMask) {}
    }

    #[test]
    fn queued_registration_is_applied_on_drain() {
        let mut mq = MqReactor::new(NullDemultiplexer::default());
        let inputs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler { inputs: Arc::clone(&inputs) });

        let handle = mq.handle();
        handle.register_handler(handler, EventMask::NOIO);
        assert_eq!(mq.handler_count(), 0, "not yet drained");
        mq.drain_commands();
        assert_eq!(mq.handler_count(), 1);
    }

    #[test]
    fn queued_trigger_is_applied_and_dispatched() {
        let mut mq = MqReactor::new(NullDemultiplexer::default());
        let inputs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler { inputs: Arc::clone(&inputs) });
        let key = mq.register_handler(Rc::new(ArcHandler(handler)), EventMask::NOIO).unwrap();

        let handle = mq.handle();
        handle.trigger_handler(key, EventMask::READ);
        mq.drain_commands();
        mq.reactor.process_one_mq();
        assert_eq!(inputs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_observed_by_is_running() {
        let mut mq = MqReactor::new(NullDemultiplexer::default());
        mq.reactor.set_running(true);
        mq.stop();
        assert!(!mq.reactor.is_running());
    }

    #[test]
    fn queued_commands_run_in_fifo_order() {
        let mut mq = MqReactor::new(NullDemultiplexer::default());
        let inputs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler { inputs: Arc::clone(&inputs) });
        let key = mq.register_handler(Rc::new(ArcHandler(handler)), EventMask::NOIO).unwrap();

        let handle = mq.handle();
        handle.suspend_handler(key);
        handle.resume_handler(key);
        handle.trigger_handler(key, EventMask::READ);
        mq.drain_commands();
        mq.reactor.process_one_mq();
        assert_eq!(inputs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_failing_queued_command_does_not_block_the_rest_of_the_drain() {
        let mut mq = MqReactor::new(NullDemultiplexer::default());
        let inputs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler { inputs: Arc::clone(&inputs) });
        let key = mq.register_handler(Rc::new(ArcHandler(handler)), EventMask::NOIO).unwrap();

        let handle = mq.handle();
        // A removal for a key that doesn't exist fails inside `apply`...
        handle.remove_handler(HandlerKey::Synthetic(u64::MAX), EventMask::ALL);
        // ...but queued commands after it still get applied.
        handle.trigger_handler(key, EventMask::READ);
        mq.drain_commands();
        mq.reactor.process_one_mq();
        assert_eq!(inputs.load(Ordering::SeqCst), 1);
    }
}
