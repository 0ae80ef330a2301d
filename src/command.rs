//! The [`Command`] enum applied by [`MqReactor`](crate::mq_reactor::MqReactor)
//! on the loop thread.

use std::sync::Arc;
use std::time::Duration;

use crate::handler::EventHandler;
use crate::mask::EventMask;
use crate::registry::HandlerKey;
use crate::timer::TimerId;

/// A deferred mutation queued from any thread and applied on the reactor's
/// own loop thread.
///
/// This is the Rust-idiomatic equivalent of the original `ReactorMsg`
/// tagged union (`RMSG_REG_HANDLER`, `RMSG_REMOVE_HANDLER`,
/// `RMSG_REG_TIMER`, `RMSG_REMOVE_TIMER`); `ResetTimer` is promoted to a
/// first-class variant rather than being folded into remove+register.
///
/// `RegisterHandler` carries an `Arc<dyn EventHandler + Send + Sync>`
/// rather than the `Rc<dyn EventHandler>` used by the single-threaded
/// `Reactor`: this handler genuinely crosses from the calling thread to
/// the loop thread, and `Rc`'s non-atomic refcount is not sound to share
/// across threads even when usage happens to be sequential.
pub enum Command {
    /// Register `handler` for `mask`, as `Reactor::register_handler`.
    RegisterHandler {
        handler: Arc<dyn EventHandler + Send + Sync>,
        mask: EventMask,
    },
    /// Remove `mask`'s bits from the entry for `key`, as
    /// `Reactor::remove_handler`.
    RemoveHandler { key: HandlerKey, mask: EventMask },
    /// Suspend I/O delivery for `key`, as `Reactor::suspend_handler`.
    SuspendHandler { key: HandlerKey },
    /// Resume I/O delivery for `key`, as `Reactor::resume_handler`.
    ResumeHandler { key: HandlerKey },
    /// Inject a synthetic event for `key`, as `Reactor::trigger_handler`.
    TriggerHandler { key: HandlerKey, mask: EventMask },
    /// Register a timer under a pre-allocated id, as
    /// `Reactor::register_timer_with_id`. The id is allocated on the
    /// calling thread (see [`TimerId::alloc`]) so it can be returned to the
    /// caller before this command is applied.
    RegisterTimer { id: TimerId, key: HandlerKey, delay: Duration },
    /// Cancel a pending timer, as `Reactor::remove_timer`.
    RemoveTimer { id: TimerId },
    /// Re-arm a pending timer, as `Reactor::reset_timer`.
    ResetTimer { id: TimerId },
    /// Request the loop to stop after its current iteration, as
    /// `Reactor::stop`. The only way to shut a running `MqReactor` down
    /// from a thread other than its own.
    Stop,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Command::RegisterHandler { mask, .. } => f.debug_struct("RegisterHandler").field("mask", mask).finish(),
            Command::RemoveHandler { key, mask } => f.debug_struct("RemoveHandler").field("key", key).field("mask", mask).finish(),
            Command::SuspendHandler { key } => f.debug_struct("SuspendHandler").field("key", key).finish(),
            Command::ResumeHandler { key } => f.debug_struct("ResumeHandler").field("key", key).finish(),
            Command::TriggerHandler { key, mask } => f.debug_struct("TriggerHandler").field("key", key).field("mask", mask).finish(),
            Command::RegisterTimer { id, key, delay } => f
                .debug_struct("RegisterTimer")
                .field("id", id)
                .field("key", key)
                .field("delay", delay)
                .finish(),
            Command::RemoveTimer { id } => f.debug_struct("RemoveTimer").field("id", id).finish(),
            Command::ResetTimer { id } => f.debug_struct("ResetTimer").field("id", id).finish(),
            Command::Stop => f.debug_struct("Stop").finish(),
        }
    }
}
