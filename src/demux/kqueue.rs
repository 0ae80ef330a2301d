//! The BSD/macOS `kqueue` reference [`Demultiplexer`].

use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{io, mem, ptr};

use log::trace;

use crate::demux::{record_readiness, Demultiplexer};
use crate::error::Result;
use crate::handle::Handle;
use crate::mask::EventMask;
use crate::registry::{HandlerKey, Registry};

/// Maximum number of events pulled from the kernel per `kevent` call.
const EVENTS_CAP: usize = 128;

// Each BSD flavour picked different integer types for `kevent`'s fields;
// the type aliases below pick the right one per target, same split the
// pack's own `sys/unix/kqueue.rs` uses.
#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
#[allow(non_camel_case_types)]
type kevent_filter_t = libc::c_short;
#[cfg(target_os = "macos")]
#[allow(non_camel_case_types)]
type kevent_filter_t = i16;
#[cfg(target_os = "netbsd")]
#[allow(non_camel_case_types)]
type kevent_filter_t = u32;

#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
#[allow(non_camel_case_types)]
type kevent_flags_t = libc::c_ushort;
#[cfg(target_os = "macos")]
#[allow(non_camel_case_types)]
type kevent_flags_t = u16;
#[cfg(target_os = "netbsd")]
#[allow(non_camel_case_types)]
type kevent_flags_t = u32;

/// A `kqueue`-backed [`Demultiplexer`].
#[derive(Debug)]
pub struct Kqueue {
    kq: RawFd,
}

impl Kqueue {
    /// Create a new kqueue instance.
    pub fn new() -> io::Result<Kqueue> {
        let kq = unsafe { libc::kqueue() };
        if kq == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(Kqueue { kq })
        }
    }
}

impl Demultiplexer for Kqueue {
    fn register_handle(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        trace!("kqueue: registering {:?}, interest={:?}", handle, interest);
        apply(self.kq, handle, EventMask::NONE, interest)
    }

    fn modify_events(&mut self, handle: Handle, interest: EventMask) -> Result<()> {
        trace!("kqueue: modifying {:?}, interest={:?}", handle, interest);
        // kqueue has no "update in place": each filter is independently
        // added or deleted depending on the requested interest, so we
        // always submit both filters.
        apply(self.kq, handle, EventMask::READ | EventMask::WRITE, interest)
    }

    fn remove_handle(&mut self, handle: Handle) -> Result<()> {
        trace!("kqueue: removing {:?}", handle);
        apply(self.kq, handle, EventMask::READ | EventMask::WRITE, EventMask::NONE)
    }

    fn demultiplex(&mut self, registry: &mut Registry, out: &mut Vec<HandlerKey>, timeout: Option<Duration>) -> Result<()> {
        let mut events: [libc::kevent; EVENTS_CAP] = unsafe { mem::zeroed() };
        let timespec = timeout.map(timespec_from_duration);
        let timespec_ptr = timespec.as_ref().map(|t| t as *const libc::timespec).unwrap_or(ptr::null());

        let n = unsafe {
            libc::kevent(
                self.kq,
                ptr::null(),
                0,
                events.as_mut_ptr(),
                EVENTS_CAP as libc::c_int,
                timespec_ptr,
            )
        };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(());
                }
                Err(err.into())
            }
            0 => Ok(()),
            n => {
                for raw_event in &events[..n as usize] {
                    let handle = Handle(raw_event.ident as RawFd);
                    let readiness = kevent_to_mask(raw_event);
                    record_readiness(registry, out, Registry::key_for_handle(handle), readiness);
                }
                Ok(())
            }
        }
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        if unsafe { libc::close(self.kq) } == -1 {
            log::warn!("error closing kqueue fd: {}", io::Error::last_os_error());
        }
    }
}

/// Submit filter changes for `handle` transitioning from `from` to `to`
/// interest (a subset of `READ | WRITE` each). A filter present in `to` but
/// not `from` is added; one present in `from` but not `to` is deleted.
fn apply(kq: RawFd, handle: Handle, from: EventMask, to: EventMask) -> Result<()> {
    let mut changes: [libc::kevent; 2] = unsafe { mem::zeroed() };
    let mut n = 0;

    if to.contains(EventMask::READ) != from.contains(EventMask::READ) {
        let flags = if to.contains(EventMask::READ) { libc::EV_ADD } else { libc::EV_DELETE };
        changes[n] = new_kevent(handle, libc::EVFILT_READ, flags);
        n += 1;
    }
    if to.contains(EventMask::WRITE) != from.contains(EventMask::WRITE) {
        let flags = if to.contains(EventMask::WRITE) { libc::EV_ADD } else { libc::EV_DELETE };
        changes[n] = new_kevent(handle, libc::EVFILT_WRITE, flags);
        n += 1;
    }
    if n == 0 {
        return Ok(());
    }

    let ret = unsafe { libc::kevent(kq, changes.as_ptr(), n as libc::c_int, ptr::null_mut(), 0, ptr::null()) };
    if ret == -1 {
        Err(io::Error::last_os_error().into())
    } else {
        Ok(())
    }
}

fn new_kevent(handle: Handle, filter: kevent_filter_t, flags: kevent_flags_t) -> libc::kevent {
    libc::kevent {
        ident: handle.0 as libc::uintptr_t,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: ptr::null_mut(),
    }
}

fn kevent_to_mask(event: &libc::kevent) -> EventMask {
    // `EVFILT_*`/`EV_ERROR` are typed as `kevent_filter_t`/`kevent_flags_t`
    // (their width varies per BSD flavour, see the aliases above), not
    // `c_int`; casting both sides to the same type keeps this portable
    // instead of relying on a fixed-width match that only happens to
    // typecheck on one platform.
    let mut mask = EventMask::NONE;
    if event.filter == libc::EVFILT_READ as kevent_filter_t {
        mask |= EventMask::READ;
    } else if event.filter == libc::EVFILT_WRITE as kevent_filter_t {
        mask |= EventMask::WRITE;
    }
    if event.flags & (libc::EV_ERROR as kevent_flags_t) != 0 {
        mask |= EventMask::ERROR;
    }
    mask
}

fn timespec_from_duration(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(duration.subsec_nanos()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_kevent_sets_ident_and_filter() {
        let kevent = new_kevent(Handle(9), libc::EVFILT_READ, libc::EV_ADD);
        assert_eq!(kevent.ident as i64, 9);
        assert_eq!(kevent.filter as libc::c_int, libc::EVFILT_READ);
    }

    #[test]
    fn timespec_conversion_preserves_seconds() {
        let ts = timespec_from_duration(Duration::from_secs(3));
        assert_eq!(ts.tv_sec as u64, 3);
    }
}
