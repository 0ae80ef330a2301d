//! Shared test helpers: logging setup and `reactor_core` test doubles.

#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use reactor_core::demux::Demultiplexer;
use reactor_core::handle::Handle;
use reactor_core::handler::{EventHandler, HandlerResult, TimeoutAction};
use reactor_core::mask::EventMask;
use reactor_core::registry::{HandlerKey, Registry};
use reactor_core::timer::TimerId;
use reactor_core::Result;

static INIT: Once = Once::new();

/// Initialise logging for the test process. Safe to call from every test;
/// the underlying `std_logger::init` only actually runs once.
pub fn init() {
    INIT.call_once(|| {
        std_logger::init();
    });
}

/// A [`Demultiplexer`] that never produces an I/O event on its own.
///
/// Useful for exercising the timer queue, manual triggers and the command
/// queue in isolation, without needing a real kernel handle.
#[derive(Default)]
pub struct NullDemultiplexer {
    pub registered: RefCell<Vec<(Handle, EventMask)>>,
}

impl Demultiplexer for NullDemultiplexer {
    fn register_handle(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        self.registered.borrow_mut().push((handle, interest));
        Ok(())
    }

    fn modify_events(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        self.registered.borrow_mut().push((handle, interest));
        Ok(())
    }

    fn remove_handle(&mut self, _handle: Handle) -> Result<()> {
        Ok(())
    }

    fn demultiplex(&mut self, _registry: &mut Registry, _out: &mut Vec<HandlerKey>, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }
}

/// A handler that records every callback it receives, for assertions.
pub struct RecordingHandler {
    pub handle: Handle,
    pub inputs: AtomicUsize,
    pub outputs: AtomicUsize,
    pub timeouts: RefCell<Vec<TimerId>>,
    pub closes: RefCell<Vec<EventMask>>,
    pub input_result: HandlerResult,
    pub output_result: HandlerResult,
    pub timeout_action: TimeoutAction,
}

impl RecordingHandler {
    /// A NOIO recording handler (no kernel handle, timers/triggers only).
    pub fn noio() -> RecordingHandler {
        RecordingHandler::with_handle(Handle::INVALID)
    }

    /// A recording handler for a given kernel handle.
    pub fn with_handle(handle: Handle) -> RecordingHandler {
        RecordingHandler {
            handle,
            inputs: AtomicUsize::new(0),
            outputs: AtomicUsize::new(0),
            timeouts: RefCell::new(Vec::new()),
            closes: RefCell::new(Vec::new()),
            input_result: HandlerResult::Keep,
            output_result: HandlerResult::Keep,
            timeout_action: TimeoutAction::Cancel,
        }
    }

    /// Make every `handle_input`/`handle_output` callback ask the reactor
    /// to close the entry.
    pub fn close_on_io(mut self) -> RecordingHandler {
        self.input_result = HandlerResult::Close;
        self.output_result = HandlerResult::Close;
        self
    }

    /// Make every `handle_timeout` callback ask to reschedule instead of
    /// cancel.
    pub fn reschedule_on_timeout(mut self) -> RecordingHandler {
        self.timeout_action = TimeoutAction::Reschedule;
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs.load(Ordering::SeqCst)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        !self.closes.borrow().is_empty()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn handle_input(&self, _handle: Handle) -> HandlerResult {
        self.inputs.fetch_add(1, Ordering::SeqCst);
        self.input_result
    }

    fn handle_output(&self, _handle: Handle) -> HandlerResult {
        self.outputs.fetch_add(1, Ordering::SeqCst);
        self.output_result
    }

    fn handle_timeout(&self, timer: TimerId) -> TimeoutAction {
        self.timeouts.borrow_mut().push(timer);
        self.timeout_action
    }

    fn handle_close(&self, _handle: Handle, revents: EventMask) {
        self.closes.borrow_mut().push(revents);
    }
}
