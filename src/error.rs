//! Error types returned by this crate.

use std::io;

/// Errors that can be returned by [`Reactor`], [`MqReactor`] and
/// [`TimerQueue`] operations.
///
/// All failures are returned by value; the reactor never aborts on a handler
/// or demultiplexer error, it logs and continues (see the `run` loop in
/// [`reactor`]).
///
/// [`Reactor`]: crate::reactor::Reactor
/// [`MqReactor`]: crate::mq_reactor::MqReactor
/// [`TimerQueue`]: crate::timer::TimerQueue
/// [`reactor`]: crate::reactor
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied argument was invalid, e.g. a non-positive timer
    /// delay, a null/unregistered handler, or an already-allocated timer id
    /// passed to `register_with_id`.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The referenced handler or timer is not present in the registry or
    /// timer queue.
    #[error("not found")]
    NotFound,

    /// The reactor is in the wrong state for the requested operation, e.g.
    /// the loop is not running, or a NOIO handler attempted to modify its I/O
    /// interest.
    #[error("bad state: {0}")]
    BadState(&'static str),

    /// The OS demultiplexer refused the operation.
    #[error("demultiplexer failure")]
    DemuxFailure(#[source] io::Error),

    /// The same handle was registered with a different handler than the one
    /// already present in the registry.
    #[error("duplicate registration for the same handle")]
    Duplicate,
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::DemuxFailure(err)
    }
}
