//! The Linux `epoll` reference [`Demultiplexer`].

use std::cmp::min;
use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{io, mem, ptr};

use log::trace;

use crate::demux::{record_readiness, Demultiplexer};
use crate::error::Result;
use crate::handle::Handle;
use crate::mask::EventMask;
use crate::registry::{HandlerKey, Registry};

/// Maximum number of events pulled from the kernel per `epoll_wait` call.
const EVENTS_CAP: usize = 128;

/// An `epoll`-backed [`Demultiplexer`].
#[derive(Debug)]
pub struct Epoll {
    epfd: RawFd,
}

impl Epoll {
    /// Create a new epoll instance.
    pub fn new() -> io::Result<Epoll> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(Epoll { epfd })
        }
    }
}

impl Demultiplexer for Epoll {
    fn register_handle(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        let mut event = new_epoll_event(interest, handle);
        trace!("epoll: registering {:?}, interest={:?}", handle, interest);
        epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, handle.0, &mut event)
    }

    fn modify_events(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        let mut event = new_epoll_event(interest, handle);
        trace!("epoll: modifying {:?}, interest={:?}", handle, interest);
        epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, handle.0, &mut event)
    }

    fn remove_handle(&mut self, handle: Handle) -> Result<()> {
        trace!("epoll: removing {:?}", handle);
        epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, handle.0, ptr::null_mut())
    }

    fn demultiplex(&mut self, registry: &mut Registry, out: &mut Vec<HandlerKey>, timeout: Option<Duration>) -> Result<()> {
        let mut events: [libc::epoll_event; EVENTS_CAP] = unsafe { mem::zeroed() };
        let timeout_ms = timeout.map(duration_to_millis).unwrap_or(-1);

        let n = unsafe { libc::epoll_wait(self.epfd, events.as_mut_ptr(), EVENTS_CAP as libc::c_int, timeout_ms) };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    // A signal interrupted the wait; treat as a spurious
                    // wakeup rather than an error.
                    return Ok(());
                }
                Err(err.into())
            }
            0 => Ok(()),
            n => {
                for raw_event in &events[..n as usize] {
                    let handle = Handle(raw_event.u64 as RawFd);
                    let readiness = epoll_events_to_mask(raw_event.events);
                    record_readiness(registry, out, Registry::key_for_handle(handle), readiness);
                }
                Ok(())
            }
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        if unsafe { libc::close(self.epfd) } == -1 {
            log::warn!("error closing epoll fd: {}", io::Error::last_os_error());
        }
    }
}

fn new_epoll_event(interest: EventMask, handle: Handle) -> libc::epoll_event {
    let mut events = libc::EPOLLPRI as u32 | libc::EPOLLRDHUP as u32;
    if interest.contains(EventMask::READ) {
        events |= libc::EPOLLIN as u32;
    }
    if interest.contains(EventMask::WRITE) {
        events |= libc::EPOLLOUT as u32;
    }
    libc::epoll_event {
        events,
        u64: handle.0 as u64,
    }
}

fn epoll_events_to_mask(events: u32) -> EventMask {
    let mut mask = EventMask::NONE;
    if events & (libc::EPOLLIN as u32 | libc::EPOLLPRI as u32) != 0 {
        mask |= EventMask::READ;
    }
    if events & libc::EPOLLOUT as u32 != 0 {
        mask |= EventMask::WRITE;
    }
    if events & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32 | libc::EPOLLRDHUP as u32) != 0 {
        mask |= EventMask::ERROR;
    }
    mask
}

fn epoll_ctl(epfd: RawFd, op: libc::c_int, fd: RawFd, event: *mut libc::epoll_event) -> Result<()> {
    if unsafe { libc::epoll_ctl(epfd, op, fd, event) } == -1 {
        Err(io::Error::last_os_error().into())
    } else {
        Ok(())
    }
}

const MILLIS_PER_SEC: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

fn duration_to_millis(duration: Duration) -> libc::c_int {
    let millis = duration
        .as_secs()
        .saturating_mul(MILLIS_PER_SEC)
        .saturating_add(u64::from(duration.subsec_nanos()) / NANOS_PER_MILLI);
    min(millis, libc::c_int::max_value() as u64) as libc::c_int
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_millis_rounds_down_and_saturates() {
        assert_eq!(duration_to_millis(Duration::from_millis(0)), 0);
        assert_eq!(duration_to_millis(Duration::from_millis(5)), 5);
        assert_eq!(duration_to_millis(Duration::from_secs(u64::max_value())), libc::c_int::max_value());
    }

    #[test]
    fn new_epoll_event_sets_interest_bits() {
        let event = new_epoll_event(EventMask::READ | EventMask::WRITE, Handle(7));
        assert_eq!(event.u64, 7);
        assert_ne!(event.events & libc::EPOLLIN as u32, 0);
        assert_ne!(event.events & libc::EPOLLOUT as u32, 0);
    }
}
