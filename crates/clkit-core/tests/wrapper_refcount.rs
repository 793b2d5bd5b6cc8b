use std::sync::Arc;

use clkit_core::{
    Buffer, Context, Driver, Queue, StubDriver,
    driver::stub::{Call, Op},
    types::*,
};

fn gpu_context() -> (Arc<StubDriver>, Context) {
    let stub = StubDriver::single_gpu();
    let driver: Arc<dyn Driver> = stub.clone();
    let ctx = Context::new_gpu(&driver).unwrap();
    (stub, ctx)
}

#[test]
fn retain_then_double_release_releases_handle_once() {
    let (stub, ctx) = gpu_context();
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 64, None).unwrap();
    let h = buf.handle();

    let extra = buf.retain();
    assert_eq!(buf.ref_count(), 2);
    extra.release();
    assert_eq!(stub.release_count(h), 0);
    assert!(stub.is_live(h));

    buf.release();
    assert_eq!(stub.release_count(h), 1);
    assert!(!stub.is_live(h));
}

#[test]
fn retain_release_pair_is_a_no_op() {
    let (stub, ctx) = gpu_context();
    let before = stub.live_objects();
    let again = ctx.retain();
    again.release();
    assert_eq!(stub.live_objects(), before);
    assert_eq!(stub.release_count(ctx.handle()), 0);
    assert_eq!(stub.retain_count(ctx.handle()), 0);
}

#[test]
fn cached_info_is_fetched_once_and_stays_identical() {
    let (stub, ctx) = gpu_context();
    let dev = ctx.device(0).unwrap();
    stub.clear_calls();

    let first = dev.info(CL_DEVICE_NAME).unwrap();
    let second = dev.info(CL_DEVICE_NAME).unwrap();
    assert_eq!(first.bytes(), second.bytes());
    assert_eq!(first.string(), "Stub GPU");

    let fetches = stub
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Info { param, .. } if *param == CL_DEVICE_NAME))
        .count();
    // one size query plus one fill
    assert_eq!(fetches, 2);
}

#[test]
fn fresh_query_keeps_earlier_views_valid() {
    let (stub, ctx) = gpu_context();
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    let old = buf.info(CL_MEM_REFERENCE_COUNT).unwrap();
    let keep = buf.retain();
    let fresh = buf.info_fresh(CL_MEM_REFERENCE_COUNT).unwrap();

    // Wrapper clones share one driver reference.
    assert_eq!(old.scalar::<u32>().unwrap(), 1);
    assert_eq!(fresh.scalar::<u32>().unwrap(), 1);
    assert_eq!(old.size(), 4);
    drop(keep);
    assert!(stub.is_live(buf.handle()));
}

#[test]
fn failed_query_does_not_poison_cache() {
    let (stub, ctx) = gpu_context();
    let dev = ctx.device(0).unwrap();
    stub.fail(Op::Info(CL_DEVICE_VENDOR), CL_OUT_OF_HOST_MEMORY);
    let err = dev.vendor().unwrap_err();
    assert_eq!(err.code(), Some(CL_OUT_OF_HOST_MEMORY));

    stub.clear_failures();
    assert_eq!(dev.vendor().unwrap(), "Stub Vendor");
}

#[test]
fn zero_size_info_is_a_driver_failure_and_is_not_cached() {
    let (stub, ctx) = gpu_context();
    let dev = ctx.device(0).unwrap();
    stub.empty_info(CL_DEVICE_MAX_COMPUTE_UNITS);
    stub.clear_calls();

    let err = dev.info(CL_DEVICE_MAX_COMPUTE_UNITS).unwrap_err();
    assert!(err.is_driver(CL_INVALID_VALUE));
    // The size query came back empty, so no fill was attempted.
    assert_eq!(stub.calls(), vec![Call::Info { class: InfoClass::Device, object: dev.handle(), param: CL_DEVICE_MAX_COMPUTE_UNITS, fill: false }]);

    stub.clear_failures();
    stub.clear_calls();
    assert_eq!(dev.info(CL_DEVICE_MAX_COMPUTE_UNITS).unwrap().scalar::<u32>().unwrap(), 8);
    assert_eq!(stub.calls().len(), 2);
    dev.info(CL_DEVICE_MAX_COMPUTE_UNITS).unwrap();
    assert_eq!(stub.calls().len(), 2);
}

#[test]
fn borrowed_handles_reuse_live_wrappers() {
    let (stub, ctx) = gpu_context();
    let queue = Queue::new(&ctx, None, 0).unwrap();

    // The queue was created from `ctx`, so no extra retain is needed.
    let same = queue.context().unwrap();
    assert_eq!(same, ctx);
    assert_eq!(stub.retain_count(ctx.handle()), 0);

    let ev = queue.enqueue_marker(None).unwrap();
    let from_event = ev.queue().unwrap().unwrap();
    assert_eq!(from_event, queue);
    assert_eq!(stub.retain_count(queue.handle()), 0);
}

#[test]
fn dropping_a_queue_releases_its_events_first() {
    let (stub, ctx) = gpu_context();
    let queue = Queue::new(&ctx, None, 0).unwrap();
    let ev = queue.enqueue_marker(None).unwrap().handle();
    let qh = queue.handle();
    stub.clear_calls();

    drop(queue);
    let releases: Vec<RawHandle> = stub
        .calls()
        .into_iter()
        .filter_map(|c| if let Call::Release(h) = c { Some(h) } else { None })
        .collect();
    assert_eq!(releases, vec![ev, qh]);
}

#[test]
fn failed_release_is_swallowed() {
    let (stub, ctx) = gpu_context();
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 8, None).unwrap();
    stub.fail(Op::Release, CL_INVALID_MEM_OBJECT);
    drop(buf);
    stub.clear_failures();
}
