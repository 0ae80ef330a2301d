//! The [`TimerQueue`]: a time-ordered pending-timer set with O(log n)
//! insert/remove/reset.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};
use crate::mask::EventMask;
use crate::registry::{HandlerKey, Registry};

/// Process-wide timer id counter.
///
/// Allocation is a plain atomic increment rather than going through a
/// `TimerQueue` method so that [`MqReactor`](crate::mq_reactor::MqReactor)
/// can pre-allocate an id on a caller thread, hand it to the caller
/// immediately, and only later apply the registration on the loop thread —
/// mirroring the original `AllocTimerId`/`__sync_fetch_and_add` split that
/// let `RegisterTimer` hand back an id before the message reached the
/// loop thread.
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, process-wide unique identifier for a registered timer.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Atomically allocate a fresh id. Ids are never reused for the
    /// lifetime of the process.
    pub fn alloc() -> TimerId {
        TimerId(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TimerId({})", self.0)
    }
}

/// Heap-side record; ordered by deadline then id so `BinaryHeap` (a
/// max-heap) combined with `Reverse` pops the earliest-deadline, lowest-id
/// entry first.
#[derive(Copy, Clone, Eq, PartialEq)]
struct HeapEntry {
    deadline: Instant,
    id: TimerId,
    generation: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &HeapEntry) -> std::cmp::Ordering {
        (self.deadline, self.id).cmp(&(other.deadline, other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &HeapEntry) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Side-table record for a live timer; the source of truth for whether a
/// heap entry is still current (see [`TimerQueue::schedule`]'s generation
/// check).
struct Timer {
    key: HandlerKey,
    delay: Duration,
    generation: u64,
}

/// A time-ordered set of pending timers.
///
/// Insert, remove and reset are all O(log n): the `BinaryHeap` gives
/// insertion order, and a `HashMap` side table keyed by [`TimerId`] makes
/// remove/reset O(log n) instead of the O(n) linear scan the teacher's
/// analogous `remove_deadline` documents as its own known cost. Removal and
/// reset do not touch the heap directly; they bump or erase the side-table
/// entry and let stale heap entries be discarded lazily when popped (the
/// `generation` check in `schedule`).
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    timers: HashMap<TimerId, Timer>,
}

impl TimerQueue {
    /// An empty queue.
    pub fn new() -> TimerQueue {
        TimerQueue {
            heap: BinaryHeap::new(),
            timers: HashMap::new(),
        }
    }

    /// Allocate a fresh [`TimerId`] and register a timer for `key` firing
    /// `delay` from now.
    ///
    /// Returns [`Error::InvalidArgument`] if `delay` is zero.
    pub fn register(&mut self, key: HandlerKey, delay: Duration) -> Result<TimerId> {
        if delay.is_zero() {
            return Err(Error::InvalidArgument("timer delay must be non-zero"));
        }
        let id = TimerId::alloc();
        self.register_with_id(id, key, delay)?;
        Ok(id)
    }

    /// Register a timer under a previously allocated `id`.
    ///
    /// Precondition: `id` is not currently present in this queue (asserted
    /// in debug builds, mirroring the original `RegisterTimer`'s assert on
    /// a caller-supplied id).
    pub fn register_with_id(&mut self, id: TimerId, key: HandlerKey, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Err(Error::InvalidArgument("timer delay must be non-zero"));
        }
        debug_assert!(!self.timers.contains_key(&id), "timer id already registered");
        let deadline = Instant::now() + delay;
        trace!("timer queue: registering {:?} for {:?}, delay={:?}", id, key, delay);
        self.timers.insert(
            id,
            Timer {
                key,
                delay,
                generation: 0,
            },
        );
        self.heap.push(Reverse(HeapEntry {
            deadline,
            id,
            generation: 0,
        }));
        Ok(())
    }

    /// Cancel a pending timer. Returns [`Error::NotFound`] if `id` is not
    /// present (already fired, already removed, or never registered).
    pub fn remove(&mut self, id: TimerId) -> Result<()> {
        trace!("timer queue: removing {:?}", id);
        self.timers.remove(&id).map(|_| ()).ok_or(Error::NotFound)
    }

    /// Re-arm a pending timer for its original delay, measured from now.
    ///
    /// This is O(log n): it bumps the side-table generation and pushes a
    /// fresh heap entry rather than rebuilding the heap; the old heap entry
    /// is discarded lazily when it would otherwise be popped.
    pub fn reset(&mut self, id: TimerId) -> Result<()> {
        let (delay, generation) = {
            let timer = self.timers.get_mut(&id).ok_or(Error::NotFound)?;
            timer.generation += 1;
            (timer.delay, timer.generation)
        };
        let deadline = Instant::now() + delay;
        trace!("timer queue: resetting {:?}, new deadline in {:?}", id, delay);
        self.heap.push(Reverse(HeapEntry { deadline, id, generation }));
        Ok(())
    }

    /// How long until the earliest pending timer fires, or `None` if the
    /// queue is empty (an unbounded wait). A timer already past its
    /// deadline yields `Some(Duration::ZERO)`.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.heap
            .peek()
            .map(|Reverse(entry)| entry.deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of currently pending (live) timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether there are no pending timers.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Pop every timer whose deadline has passed, mark its owning entry's
    /// `revents` with [`EventMask::TIMER`] and append the timer id to the
    /// entry's `timeout_list`.
    ///
    /// An entry is appended to `out` at most once per call, and only for
    /// the transition from "no pending revents" to "has pending revents" —
    /// ported from the original `timer_q.cpp`'s `if (handler->REvents() ==
    /// EventHandler::TIMER_MASK) { list.push_back(handler); }`, which adds a
    /// handler to the dispatch list only when the timer was the first bit
    /// set on it this iteration.
    ///
    /// Returns the same as [`TimerQueue::next_timeout`] after the expired
    /// timers have been drained, for the caller to use as its next
    /// demultiplex timeout.
    pub fn schedule(&mut self, registry: &mut Registry, out: &mut Vec<HandlerKey>) -> Option<Duration> {
        let now = Instant::now();
        loop {
            let expired = match self.heap.peek() {
                Some(Reverse(entry)) if entry.deadline <= now => self.heap.pop().unwrap().0,
                _ => break,
            };

            let timer = match self.timers.get(&expired.id) {
                Some(timer) if timer.generation == expired.generation => timer,
                _ => continue, // stale entry: removed or superseded by a later reset
            };
            let key = timer.key;
            // The side-table entry is left in place, not removed here: the
            // caller's dispatch always either `reset`s it (rearming for the
            // next delay) or explicitly `remove`s it once `handle_timeout`
            // returns, and `reset` requires the entry still be present.

            if let Some(entry) = registry.get_mut(key) {
                let was_empty = entry.revents.is_empty();
                entry.revents |= EventMask::TIMER;
                entry.timeout_list.push(expired.id);
                if was_empty {
                    out.push(key);
                }
            }
        }
        self.next_timeout()
    }
}
