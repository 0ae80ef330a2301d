//! A low-level event-demultiplexing reactor: a handler registry, a timer
//! queue, a pluggable readiness backend and a cross-thread command queue,
//! for building non-blocking I/O services on top of.
//!
//! # Goals
//!
//! * A minimal, allocation-light core loop over readiness I/O and timers.
//! * A capability-trait seam ([`Demultiplexer`](demux::Demultiplexer)) so the
//!   loop itself never touches a platform syscall directly; [`demux::epoll`]
//!   and [`demux::kqueue`] are the shipped reference backends.
//! * A single-threaded [`Reactor`](reactor::Reactor) for the common case, and
//!   a [`MqReactor`](mq_reactor::MqReactor) wrapper when handlers need to be
//!   registered, removed or triggered from other threads.
//!
//! # Usage
//!
//! Implement [`EventHandler`](handler::EventHandler) for your type, build a
//! [`Reactor`](reactor::Reactor) around a [`Demultiplexer`](demux::Demultiplexer)
//! (`demux::epoll::Epoll::new()?` on Linux), register your handler, then call
//! [`Reactor::run`](reactor::Reactor::run).
//!
//! # Undefined behaviour
//!
//! It is undefined how a [`Reactor`](reactor::Reactor) behaves after a
//! process is forked; create it after forking if you need both.
//!
//! [`Reactor`](reactor::Reactor) is intentionally `!Send`/`!Sync` (it holds
//! `Rc<dyn EventHandler>` entries); reach for
//! [`MqReactor`](mq_reactor::MqReactor) when other threads need to mutate
//! the registry.

#![warn(
    anonymous_parameters,
    bare_trait_objects,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    variant_size_differences
)]

pub mod command;
pub mod config;
pub mod demux;
pub mod error;
pub mod handle;
pub mod handler;
pub mod mask;
pub mod mq_reactor;
pub mod reactor;
pub mod registry;
pub mod timer;

#[doc(no_inline)]
pub use crate::error::{Error, Result};
#[doc(no_inline)]
pub use crate::handle::Handle;
#[doc(no_inline)]
pub use crate::handler::{EventHandler, HandlerResult, TimeoutAction};
#[doc(no_inline)]
pub use crate::mask::EventMask;
#[doc(no_inline)]
pub use crate::mq_reactor::{MqHandle, MqReactor};
#[doc(no_inline)]
pub use crate::reactor::Reactor;
#[doc(no_inline)]
pub use crate::registry::HandlerKey;
#[doc(no_inline)]
pub use crate::timer::TimerId;
