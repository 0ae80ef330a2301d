//! The [`EventMask`] readiness/interest bitset.

use bitflags::bitflags;

bitflags! {
    /// A set of event kinds.
    ///
    /// `EventMask` is used both as the interest a handler registers and as
    /// the `revents` delivered to it for a given loop iteration. Combine
    /// values with the usual bitwise operators.
    ///
    /// # Examples
    ///
    /// ```
    /// use reactor_core::mask::EventMask;
    ///
    /// let mask = EventMask::READ | EventMask::WRITE;
    /// assert!(mask.contains(EventMask::READ));
    /// assert!(!mask.contains(EventMask::ERROR));
    /// ```
    pub struct EventMask: u8 {
        /// Readable readiness.
        const READ  = 0b0000_0001;
        /// Writable readiness.
        const WRITE = 0b0000_0010;
        /// Error readiness.
        const ERROR = 0b0000_0100;
        /// A timer owned by the entry fired.
        const TIMER = 0b0000_1000;
        /// Marks a handler that participates only in timers/triggered
        /// events; its handle (if any) is never passed to the
        /// [`Demultiplexer`](crate::demux::Demultiplexer).
        const NOIO  = 0b0001_0000;
    }
}

impl EventMask {
    /// The empty mask.
    pub const NONE: EventMask = EventMask { bits: 0 };

    /// `READ | WRITE | ERROR | TIMER`.
    pub const ALL: EventMask = EventMask {
        bits: EventMask::READ.bits | EventMask::WRITE.bits | EventMask::ERROR.bits | EventMask::TIMER.bits,
    };

    /// The subset of `self` that is a valid registration with the
    /// demultiplexer, i.e. `self & (READ | WRITE)`. `ERROR` and `TIMER` are
    /// never requested explicitly from the OS.
    pub fn io_bits(self) -> EventMask {
        self & (EventMask::READ | EventMask::WRITE)
    }

    /// Whether this mask marks a NOIO handler.
    pub fn is_noio(self) -> bool {
        self.contains(EventMask::NOIO)
    }
}

#[cfg(test)]
mod tests {
    use super::EventMask;

    #[test]
    fn all_is_read_write_error_timer() {
        assert!(EventMask::ALL.contains(EventMask::READ));
        assert!(EventMask::ALL.contains(EventMask::WRITE));
        assert!(EventMask::ALL.contains(EventMask::ERROR));
        assert!(EventMask::ALL.contains(EventMask::TIMER));
        assert!(!EventMask::ALL.contains(EventMask::NOIO));
    }

    #[test]
    fn io_bits_excludes_error_and_timer() {
        let mask = EventMask::READ | EventMask::ERROR | EventMask::TIMER;
        assert_eq!(mask.io_bits(), EventMask::READ);
    }

    #[test]
    fn noio_flagging() {
        assert!((EventMask::NOIO | EventMask::TIMER).is_noio());
        assert!(!EventMask::READ.is_noio());
    }
}
