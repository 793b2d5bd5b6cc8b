use std::sync::{Arc, Mutex};

use clkit_core::{
    ClError, Context, Driver, Event, EventWaitList, Queue, StubDriver,
    driver::stub::{Call, Op},
    event::command_type_name,
    types::*,
    wait_list,
};

fn setup() -> (Arc<StubDriver>, Context, Queue) {
    let stub = StubDriver::single_gpu();
    let driver: Arc<dyn Driver> = stub.clone();
    let ctx = Context::new_gpu(&driver).unwrap();
    let queue = Queue::new(&ctx, None, CL_QUEUE_PROFILING_ENABLE).unwrap();
    (stub, ctx, queue)
}

#[test]
fn wait_list_passes_handles_in_order_and_is_cleared() {
    let (stub, _ctx, q) = setup();
    let a = q.enqueue_marker(None).unwrap();
    let b = q.enqueue_marker(None).unwrap();

    let mut wl = wait_list![&b, &a];
    assert_eq!(wl.handles(), vec![b.handle(), a.handle()]);
    stub.clear_calls();
    let c = q.enqueue_barrier(Some(&mut wl)).unwrap();
    assert!(wl.is_empty());
    assert_eq!(
        stub.calls(),
        vec![Call::Enqueue { queue: q.handle(), command: CL_COMMAND_BARRIER, wait: vec![b.handle(), a.handle()], event: c.handle() }]
    );
}

#[test]
fn list_building() {
    let (_stub, _ctx, q) = setup();
    let evs: Vec<Event> = (0..3).map(|_| q.enqueue_marker(None).unwrap()).collect();
    let mut wl = EventWaitList::new();
    wl.add(&evs[2]).extend(&evs[..2]);
    assert_eq!(wl.len(), 3);
    assert_eq!(wl.events()[0], evs[2]);
    wl.clear();
    assert!(wl.is_empty());
}

#[test]
fn host_wait() {
    let (stub, _ctx, q) = setup();
    let ev = q.enqueue_marker(None).unwrap();
    stub.clear_calls();
    let mut empty = EventWaitList::new();
    empty.wait().unwrap();
    assert!(stub.calls().is_empty());

    let mut wl = wait_list![&ev];
    wl.wait().unwrap();
    assert!(wl.is_empty());
    ev.wait().unwrap();
    assert_eq!(stub.calls(), vec![Call::WaitForEvents(vec![ev.handle()]), Call::WaitForEvents(vec![ev.handle()])]);

    stub.fail(Op::WaitForEvents, CL_INVALID_EVENT);
    let mut wl = wait_list![&ev];
    let err = wl.wait().unwrap_err();
    assert!(err.is_driver(CL_INVALID_EVENT));
    assert_eq!(wl.len(), 1);
}

#[test]
fn callback_on_complete_event_runs_immediately() {
    let (_stub, _ctx, q) = setup();
    let ev = q.enqueue_marker(None).unwrap();
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    ev.set_callback(CL_COMPLETE, move |h, status| *s.lock().unwrap() = Some((h, status))).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some((ev.handle(), CL_COMPLETE)));
}

#[test]
fn user_event_fires_callback_when_completed() {
    let (_stub, ctx, q) = setup();
    let user = Event::new_user(&ctx).unwrap();
    assert_eq!(user.execution_status().unwrap(), CL_SUBMITTED);
    assert_eq!(user.command_type().unwrap(), CL_COMMAND_USER);
    assert!(user.queue().unwrap().is_none());
    assert_eq!(user.context().unwrap(), ctx);

    let fired = Arc::new(Mutex::new(Vec::new()));
    let f = fired.clone();
    user.set_callback(CL_COMPLETE, move |_, status| f.lock().unwrap().push(status)).unwrap();
    assert!(fired.lock().unwrap().is_empty());

    // Waiting on an incomplete user event is fine for submission.
    let mut wl = wait_list![&user];
    q.enqueue_marker(Some(&mut wl)).unwrap();

    user.set_user_status(CL_COMPLETE).unwrap();
    assert_eq!(*fired.lock().unwrap(), vec![CL_COMPLETE]);
    assert_eq!(user.execution_status().unwrap(), CL_COMPLETE);
    assert!(user.set_user_status(CL_COMPLETE).unwrap_err().is_driver(CL_INVALID_OPERATION));
}

#[test]
fn user_events_have_no_profiling_info() {
    let (_stub, ctx, _q) = setup();
    let user = Event::new_user(&ctx).unwrap();
    assert!(user.profiling_info(CL_PROFILING_COMMAND_START).unwrap_err().is_profiling_unavailable());
}

#[test]
fn invalid_callback_type_is_rejected_before_the_driver() {
    let (_stub, _ctx, q) = setup();
    let ev = q.enqueue_marker(None).unwrap();
    assert!(matches!(ev.set_callback(7, |_, _| {}), Err(ClError::InvalidArgument(_))));
    assert!(matches!(ev.set_callback(-1, |_, _| {}), Err(ClError::InvalidArgument(_))));
}

#[test]
fn names_fall_back_to_command_type() {
    let (_stub, _ctx, q) = setup();
    let ev = q.enqueue_marker(None).unwrap();
    assert_eq!(ev.name(), None);
    assert_eq!(ev.final_name().unwrap(), "MARKER");
    ev.set_name("checkpoint");
    assert_eq!(ev.final_name().unwrap(), "checkpoint");

    assert_eq!(command_type_name(CL_COMMAND_READ_BUFFER), Some("READ_BUFFER"));
    assert_eq!(command_type_name(0), None);
}

#[test]
fn produced_events_know_their_queue() {
    let (_stub, _ctx, q) = setup();
    let ev = q.enqueue_marker(None).unwrap();
    assert_eq!(ev.queue().unwrap(), Some(q.clone()));
    assert_eq!(q.events(), vec![ev.clone()]);
    let t0 = ev.profiling_info(CL_PROFILING_COMMAND_START).unwrap();
    let t1 = ev.profiling_info(CL_PROFILING_COMMAND_END).unwrap();
    assert!(t1 > t0);
}

#[test]
fn failed_enqueue_keeps_the_list() {
    let (stub, _ctx, q) = setup();
    let a = q.enqueue_marker(None).unwrap();
    stub.fail(Op::Enqueue, CL_OUT_OF_RESOURCES);
    let mut wl = wait_list![&a];
    assert!(q.enqueue_marker(Some(&mut wl)).unwrap_err().is_driver(CL_OUT_OF_RESOURCES));
    assert_eq!(wl.len(), 1);
    assert_eq!(q.num_events(), 1);
}
