//! Integration tests for `reactor_core::reactor::Reactor`.

use std::rc::Rc;
use std::thread::sleep;
use std::time::Duration;

use reactor_core::error::Error;
use reactor_core::handle::Handle;
use reactor_core::mask::EventMask;
use reactor_core::reactor::Reactor;

mod util;
use util::{init, NullDemultiplexer, RecordingHandler};

#[test]
fn register_then_trigger_delivers_input() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::noio());
    let key = reactor.register_handler(handler.clone(), EventMask::NOIO).unwrap();

    reactor.trigger_handler(key, EventMask::READ).unwrap();
    reactor.process_one();

    assert_eq!(handler.input_count(), 1);
    assert_eq!(handler.output_count(), 0);
}

#[test]
fn handler_asking_to_close_gets_close_callback_but_stays_registered() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::noio().close_on_io());
    let key = reactor.register_handler(handler.clone(), EventMask::NOIO).unwrap();

    reactor.trigger_handler(key, EventMask::READ).unwrap();
    reactor.process_one();

    assert!(handler.was_closed());
    // The entry is not removed automatically: `handle_close` is a
    // notification, and the handler is expected to call `remove_handler`
    // itself, which this follow-up call does.
    assert_eq!(reactor.handler_count(), 1);
    reactor.remove_handler(key, EventMask::ALL).unwrap();
    assert_eq!(reactor.handler_count(), 0);
}

#[test]
fn timer_reschedule_keeps_firing() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::noio().reschedule_on_timeout());
    let key = reactor.register_handler(handler.clone(), EventMask::NOIO).unwrap();
    reactor.register_timer(key, Duration::from_millis(2)).unwrap();

    for _ in 0..3 {
        sleep(Duration::from_millis(4));
        reactor.process_one();
    }

    assert!(handler.timeouts.borrow().len() >= 2, "a Reschedule timer should fire more than once");
    assert_eq!(reactor.timer_count(), 1, "the rescheduled timer is still pending");
}

#[test]
fn suspend_stops_io_but_not_timers() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::with_handle(Handle(3)));
    let key = reactor.register_handler(handler.clone(), EventMask::READ).unwrap();
    reactor.register_timer(key, Duration::from_millis(2)).unwrap();

    reactor.suspend_handler(key).unwrap();
    // A manual trigger is rejected outright while suspended: suspension
    // hides I/O entirely, not just what the demultiplexer reports.
    assert!(matches!(reactor.trigger_handler(key, EventMask::READ), Err(Error::BadState(_))));
    sleep(Duration::from_millis(5));
    reactor.process_one();

    assert_eq!(handler.input_count(), 0, "suspended handlers receive no I/O, manual or otherwise");
    assert_eq!(handler.timeouts.borrow().len(), 1, "timers fire regardless of suspension");
}

#[test]
fn resume_is_idempotent_and_rejects_closed_entries() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::noio().close_on_io());
    let key = reactor.register_handler(handler, EventMask::NOIO).unwrap();

    reactor.trigger_handler(key, EventMask::READ).unwrap();
    reactor.process_one();
    // The entry survives the close, but in the `Closed` state, which
    // `suspend`/`resume` both reject.
    assert!(matches!(reactor.resume_handler(key), Err(Error::BadState(_))));
}

#[test]
fn re_registering_same_handler_merges_interest() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::with_handle(Handle(9)));

    let key1 = reactor.register_handler(handler.clone(), EventMask::READ).unwrap();
    let key2 = reactor.register_handler(handler, EventMask::WRITE).unwrap();

    assert_eq!(key1, key2);
    assert_eq!(reactor.handler_count(), 1);
}

#[test]
fn re_registering_different_handler_on_same_handle_is_duplicate() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let a = Rc::new(RecordingHandler::with_handle(Handle(11)));
    let b = Rc::new(RecordingHandler::with_handle(Handle(11)));

    reactor.register_handler(a, EventMask::READ).unwrap();
    let err = reactor.register_handler(b, EventMask::READ).unwrap_err();
    assert!(matches!(err, Error::Duplicate));
}

#[test]
fn removing_a_subset_of_events_keeps_the_entry_registered() {
    init();
    let mut reactor = Reactor::new(NullDemultiplexer::default());
    let handler = Rc::new(RecordingHandler::with_handle(Handle(13)));
    let key = reactor.register_handler(handler, EventMask::READ | EventMask::WRITE).unwrap();

    reactor.remove_handler(key, EventMask::WRITE).unwrap();
    assert_eq!(reactor.handler_count(), 1, "READ interest is still registered");

    reactor.remove_handler(key, EventMask::READ).unwrap();
    assert_eq!(reactor.handler_count(), 0, "removing the last bit removes the entry entirely");
}
