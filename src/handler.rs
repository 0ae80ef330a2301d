//! The [`EventHandler`] capability trait implemented by callers.

use crate::handle::Handle;
use crate::mask::EventMask;
use crate::timer::TimerId;

/// What a handler wants to happen to its registration after an I/O
/// callback returns.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HandlerResult {
    /// Keep the entry registered as-is.
    Keep,
    /// Remove the entry, as if the caller had called `remove_handler`
    /// immediately after the callback returns.
    Close,
}

/// What a handler wants to happen to a timer after its timeout callback
/// returns.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TimeoutAction {
    /// Re-arm the timer for the same delay from now.
    Reschedule,
    /// Drop the timer; it will not fire again.
    Cancel,
}

/// The capability a caller implements to receive reactor callbacks.
///
/// This mirrors the original `EventHandler` base class (`HandleInput`,
/// `HandleOutput`, `HandleTimeout`, `HandleClose`), replacing the 0/non-zero
/// return convention with [`HandlerResult`] and [`TimeoutAction`]. A
/// `Reactor` never holds anything but a strong `Rc<dyn EventHandler>` to an
/// entry, so there is no analogue to the original's manual `AddRef`/`DelRef`
/// reference counting.
pub trait EventHandler {
    /// The kernel handle this handler wants readiness events for, or
    /// [`Handle::INVALID`] for a NOIO (timer/triggered-only) handler.
    ///
    /// Called once, at registration time; the reactor does not poll this
    /// method again afterwards, so an implementation does not need to
    /// return a stable value across calls once registered (though in
    /// practice it always will, since a handler has exactly one handle for
    /// its lifetime).
    fn handle(&self) -> Handle;

    /// The handle became readable.
    fn handle_input(&self, handle: Handle) -> HandlerResult;

    /// The handle became writable.
    fn handle_output(&self, handle: Handle) -> HandlerResult;

    /// One of this handler's timers fired.
    fn handle_timeout(&self, timer: TimerId) -> TimeoutAction;

    /// The entry is being removed from the registry; `revents` carries
    /// whatever bits (if any, including [`EventMask::ERROR`]) triggered the
    /// removal. Called exactly once per registration, as the last callback
    /// the handler will ever receive for that entry.
    fn handle_close(&self, handle: Handle, revents: EventMask);
}
