// Single test: `memcheck` looks at the whole process, so nothing else may
// hold wrappers while it runs.

use std::sync::Arc;

use clkit_core::{Buffer, Context, Driver, Kernel, NdRange, Program, Queue, StubDriver, live_wrappers, memcheck, types::*};

#[test]
fn every_wrapper_is_gone_after_scope_exit() {
    assert!(memcheck());
    let stub = StubDriver::single_gpu();
    {
        let driver: Arc<dyn Driver> = stub.clone();
        let ctx = Context::new_gpu(&driver).unwrap();
        let queue = Queue::new(&ctx, None, CL_QUEUE_PROFILING_ENABLE).unwrap();
        let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 64, None).unwrap();
        let prog = Program::from_source(&ctx, "__kernel void fill(__global int* out) {}").unwrap();
        prog.build("").unwrap();
        let kernel = Kernel::new(&prog, "fill").unwrap();
        kernel.set_arg(0, &buf);
        kernel.enqueue_ndrange(&queue, &NdRange::new(&[64]), None).unwrap();

        // platform, device, context, queue, buffer, program, kernel, event
        assert_eq!(live_wrappers(), 8);
        assert!(!memcheck());
    }
    assert!(memcheck());
    assert_eq!(stub.live_objects(), 0);
}
