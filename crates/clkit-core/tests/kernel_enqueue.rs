use std::{ffi::c_void, mem::size_of, sync::Arc};

use clkit_core::{
    Buffer, ClError, Context, Driver, Kernel, KernelArg, MemObject, NdRange, Program, Queue, StubDriver, enqueue_native,
    driver::stub::{Call, Op},
    types::*,
    wait_list,
};

const SRC: &str = "__kernel void scale(__global int* a, float f, __local int* tmp) {}\n\
                   __kernel void noop() {}";

struct Fixture {
    stub: Arc<StubDriver>,
    ctx: Context,
    queue: Queue,
    kernel: Kernel,
}

fn fixture() -> Fixture {
    let stub = StubDriver::single_gpu();
    let driver: Arc<dyn Driver> = stub.clone();
    let ctx = Context::new_gpu(&driver).unwrap();
    let queue = Queue::new(&ctx, None, 0).unwrap();
    let prog = Program::from_source(&ctx, SRC).unwrap();
    prog.build("-cl-fast-relaxed-math").unwrap();
    let kernel = prog.create_kernel("scale").unwrap();
    Fixture { stub, ctx, queue, kernel }
}

fn set_arg_calls(calls: &[Call]) -> Vec<(u32, usize)> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::SetKernelArg { index, size, .. } => Some((*index, *size)),
            _ => None,
        })
        .collect()
}

#[test]
fn pending_args_drain_in_index_order_before_dispatch() {
    let f = fixture();
    let a = Buffer::new(&f.ctx, CL_MEM_READ_WRITE, 64, None).unwrap();
    f.kernel.set_arg(0, &a);
    f.kernel.set_arg(2, KernelArg::local::<i32>(16));
    f.kernel.set_arg(1, KernelArg::private(&3.14f32));
    assert_eq!(f.kernel.pending_args(), 3);
    f.stub.clear_calls();

    let ev = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[64]).local(&[16]), None).unwrap();

    let calls = f.stub.calls();
    assert_eq!(set_arg_calls(&calls), vec![(0, size_of::<RawHandle>()), (1, size_of::<f32>()), (2, 64)]);
    let dispatch = calls.iter().position(|c| matches!(c, Call::EnqueueNdRange { .. })).unwrap();
    let last_arg = calls.iter().rposition(|c| matches!(c, Call::SetKernelArg { .. })).unwrap();
    assert!(last_arg < dispatch);

    match &calls[dispatch] {
        Call::EnqueueNdRange { global, local, event, .. } => {
            assert_eq!(global, &vec![64]);
            assert_eq!(local.as_deref(), Some(&[16][..]));
            assert_eq!(*event, ev.handle());
        }
        other => panic!("unexpected call {other:?}"),
    }
    let bound = calls.iter().find_map(|c| match c {
        Call::SetKernelArg { index: 0, value, .. } => value.clone(),
        _ => None,
    });
    assert_eq!(bound.as_deref(), Some(bytemuck::bytes_of(&a.handle())));
    assert_eq!(f.kernel.pending_args(), 0);
}

#[test]
fn local_argument_passes_no_value() {
    let f = fixture();
    f.kernel.set_arg(2, KernelArg::local_bytes(128));
    f.stub.clear_calls();
    f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]), None).unwrap();
    assert!(f.stub.calls().contains(&Call::SetKernelArg { kernel: f.kernel.handle(), index: 2, size: 128, value: None }));
}

#[test]
fn failed_drain_keeps_unset_args_pending() {
    let f = fixture();
    let a = Buffer::new(&f.ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    f.kernel.set_args([KernelArg::from(&a), KernelArg::private(&2.0f32), KernelArg::local::<i32>(4)]);
    f.stub.fail(Op::SetKernelArg(1), CL_INVALID_ARG_VALUE);

    let err = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[4]), None).unwrap_err();
    assert_eq!(err.code(), Some(CL_INVALID_ARG_VALUE));
    assert!(err.to_string().contains("argument 1"));
    assert_eq!(f.kernel.pending_args(), 2);
    assert_eq!(f.queue.num_events(), 0);

    f.stub.clear_failures();
    f.stub.clear_calls();
    f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[4]), None).unwrap();
    assert_eq!(set_arg_calls(&f.stub.calls()), vec![(1, 4), (2, 16)]);
    assert_eq!(f.kernel.pending_args(), 0);
}

#[test]
fn skip_keeps_the_pending_entry() {
    let f = fixture();
    f.kernel.set_arg(1, KernelArg::private(&1.5f32));
    f.kernel.set_args([KernelArg::local::<u8>(8), KernelArg::Skip]);
    f.stub.clear_calls();
    f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]), None).unwrap();
    let calls = f.stub.calls();
    assert_eq!(set_arg_calls(&calls), vec![(0, 8), (1, 4)]);
    assert!(calls.contains(&Call::SetKernelArg {
        kernel: f.kernel.handle(),
        index: 1,
        size: 4,
        value: Some(1.5f32.to_ne_bytes().to_vec()),
    }));
}

#[test]
fn set_args_and_enqueue_binds_then_dispatches() {
    let f = fixture();
    let a = Buffer::new(&f.ctx, CL_MEM_READ_WRITE, 256, None).unwrap();
    let ev = f
        .kernel
        .set_args_and_enqueue_ndrange(
            &f.queue,
            &NdRange::new(&[16, 4]).offset(&[0, 0]),
            None,
            [KernelArg::from(&a), KernelArg::private(&0.5f32), KernelArg::local::<f32>(64)],
        )
        .unwrap();
    assert_eq!(ev.command_type().unwrap(), CL_COMMAND_NDRANGE_KERNEL);
    assert_eq!(ev.final_name().unwrap(), "NDRANGE_KERNEL");
    let dispatch = f.stub.calls().into_iter().find(|c| matches!(c, Call::EnqueueNdRange { .. })).unwrap();
    assert!(matches!(dispatch, Call::EnqueueNdRange { global, offset: Some(o), .. } if global == vec![16, 4] && o == vec![0, 0]));
}

#[test]
fn work_dimension_is_validated() {
    let f = fixture();
    let bad = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[]), None);
    assert!(matches!(bad, Err(ClError::InvalidArgument(_))));
    let bad = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[1, 1, 1, 1]), None);
    assert!(matches!(bad, Err(ClError::InvalidArgument(_))));
    let short = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8, 8]).local(&[8]), None);
    assert!(matches!(short, Err(ClError::InvalidArgument(_))));
    let long = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]).offset(&[0, 0]), None);
    assert!(matches!(long, Err(ClError::InvalidArgument(_))));
    assert_eq!(f.queue.num_events(), 0);
}

#[test]
fn enqueue_order_and_wait_lists() {
    let f = fixture();
    let first = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]), None).unwrap();
    let mut wait = wait_list![&first];
    let second = f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]), Some(&mut wait)).unwrap();

    assert!(wait.is_empty());
    assert_eq!(f.queue.events(), vec![first.clone(), second.clone()]);
    let observed = f.stub.calls().into_iter().rev().find_map(|c| match c {
        Call::EnqueueNdRange { wait, .. } => Some(wait),
        _ => None,
    });
    assert_eq!(observed, Some(vec![first.handle()]));
}

#[test]
fn failed_enqueue_leaves_wait_list_untouched() {
    let f = fixture();
    let first = f.queue.enqueue_marker(None).unwrap();
    let mut wait = wait_list![&first];
    f.stub.fail(Op::EnqueueNdRange, CL_OUT_OF_RESOURCES);
    assert!(f.kernel.enqueue_ndrange(&f.queue, &NdRange::new(&[8]), Some(&mut wait)).is_err());
    assert_eq!(wait.len(), 1);
}

#[test]
fn kernel_queries() {
    let f = fixture();
    assert_eq!(f.kernel.function_name().unwrap(), "scale");
    assert_eq!(f.kernel.num_args().unwrap(), 3);
    assert_eq!(f.kernel.opencl_version().unwrap(), 120);
    assert_eq!(f.kernel.kernel_arg_info(1, CL_KERNEL_ARG_NAME).unwrap().string(), "arg1");
    let dev = f.ctx.device(0).unwrap();
    assert_eq!(f.kernel.work_group_size(&dev).unwrap(), 256);
    assert_eq!(f.kernel.preferred_work_group_size_multiple(&dev).unwrap(), 64);
    assert_eq!(f.kernel.program().create_kernel("noop").unwrap().num_args().unwrap(), 0);
}

#[test]
fn kernel_arg_info_needs_opencl_1_2() {
    let stub = StubDriver::builder()
        .platform("Old Platform", "Old Vendor", "OpenCL 1.1 legacy")
        .device(clkit_core::driver::stub::DeviceSpec::gpu("Old GPU"))
        .build();
    let driver: Arc<dyn Driver> = stub;
    let ctx = Context::new_gpu(&driver).unwrap();
    let prog = Program::from_source(&ctx, SRC).unwrap();
    prog.build("").unwrap();
    let k = prog.create_kernel("scale").unwrap();
    assert!(matches!(
        k.kernel_arg_info(0, CL_KERNEL_ARG_NAME),
        Err(ClError::UnsupportedVersion { required: 120, found: 110, .. })
    ));
}

#[test]
fn build_failure_reports_log() {
    let f = fixture();
    let prog = Program::from_source(&f.ctx, "#error broken\n__kernel void k() {}").unwrap();
    let err = prog.build("").unwrap_err();
    assert_eq!(err.code(), Some(CL_BUILD_PROGRAM_FAILURE));
    assert!(err.to_string().contains("#error directive"));

    let dev = f.ctx.device(0).unwrap();
    assert_eq!(prog.build_status(&dev).unwrap(), CL_BUILD_ERROR);
    assert_eq!(prog.build_logs().unwrap().len(), 1);
    assert!(prog.create_kernel("k").is_err());
}

#[test]
fn program_kernel_names() {
    let f = fixture();
    let prog = f.kernel.program();
    assert_eq!(prog.num_kernels().unwrap(), 2);
    assert_eq!(prog.kernel_names().unwrap(), vec!["scale".to_owned(), "noop".to_owned()]);
    assert_eq!(prog.devices().unwrap().len(), 1);
    assert!(prog.source().unwrap().contains("__kernel void noop"));
}

unsafe extern "C" fn add_one(args: *mut c_void) {
    let block = args.cast::<u8>();
    // SAFETY: the block holds a data pointer followed by an element count.
    unsafe {
        let data = block.cast::<*mut u32>().read_unaligned();
        let n = block.add(size_of::<usize>()).cast::<u32>().read_unaligned();
        for i in 0..n as usize {
            let p = data.add(i);
            p.write_unaligned(p.read_unaligned() + 1);
        }
    }
}

#[test]
fn native_kernel_sees_patched_memory_pointer() {
    let f = fixture();
    let buf = Buffer::from_slice(&f.ctx, CL_MEM_READ_WRITE, &[1u32, 2, 3, 4]).unwrap();

    let mut args = Vec::new();
    args.extend_from_slice(bytemuck::bytes_of(&buf.handle()));
    args.extend_from_slice(&4u32.to_ne_bytes());

    let ev = unsafe { enqueue_native(&f.queue, add_one, &args, &[(MemObject::from(buf.clone()), 0)], None) }.unwrap();
    assert_eq!(ev.command_type().unwrap(), CL_COMMAND_NATIVE_KERNEL);

    let mut out = [0u32; 4];
    buf.enqueue_read(&f.queue, 0, &mut out, None).unwrap();
    assert_eq!(out, [2, 3, 4, 5]);
}

#[test]
fn native_kernel_rejects_offsets_outside_block() {
    let f = fixture();
    let buf = Buffer::new(&f.ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    let args = [0u8; 8];
    let res = unsafe { enqueue_native(&f.queue, add_one, &args, &[(MemObject::from(buf), 4)], None) };
    assert!(matches!(res, Err(ClError::InvalidArgument(_))));
    assert_eq!(f.queue.num_events(), 0);
}
