use clkit_core::{
    Buffer, ClError, ClDriver, Context, Kernel, KernelArg, Program, Profiler, Queue,
    profiler::{AggSort, OverlapSort, SortOrder},
    types::{CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY, CL_QUEUE_PROFILING_ENABLE},
};

const SRC: &str = r#"
__kernel void vec_add(__global const float* a, __global const float* b, __global float* out, uint n) {
    size_t i = get_global_id(0);
    if (i < n) out[i] = a[i] + b[i];
}
"#;

fn main() -> Result<(), ClError> {
    let driver = ClDriver::shared();
    let ctx = Context::new_gpu(&driver)?;
    let device = ctx.device(0)?;
    let queue = Queue::new(&ctx, Some(&device), CL_QUEUE_PROFILING_ENABLE)?;
    println!("running on {} [{}]", device.name()?, device.vendor()?);

    let n: usize = 1 << 22;
    let h_a = vec![1.0_f32; n];
    let h_b = vec![2.0_f32; n];
    let mut h_out = vec![0.0_f32; n];

    let a = Buffer::new(&ctx, CL_MEM_READ_ONLY, n * size_of::<f32>(), None)?;
    let b = Buffer::new(&ctx, CL_MEM_READ_ONLY, n * size_of::<f32>(), None)?;
    let out = Buffer::new(&ctx, CL_MEM_WRITE_ONLY, n * size_of::<f32>(), None)?;
    a.enqueue_write(&queue, 0, &h_a, None)?.set_name("WRITE_A");
    b.enqueue_write(&queue, 0, &h_b, None)?.set_name("WRITE_B");

    let program = Program::from_source(&ctx, SRC)?;
    if let Err(e) = program.build("") {
        eprintln!("{}", program.build_log(&device)?);
        return Err(e);
    }
    let kernel = Kernel::new(&program, "vec_add")?;

    // Padded global size; the kernel guards the tail.
    let ws = kernel.suggest_worksizes(&device, &[n], None, true)?;
    let ev = kernel.set_args_and_enqueue_ndrange(
        &queue,
        &ws.range(&[n]),
        None,
        [(&a).into(), (&b).into(), (&out).into(), KernelArg::private(&(n as u32))],
    )?;
    ev.set_name("VEC_ADD");

    out.enqueue_read(&queue, 0, &mut h_out, None)?.set_name("READ_OUT");
    queue.finish()?;

    assert!(h_out.iter().all(|&x| (x - 3.0).abs() < 1e-6));
    println!("vec_add OK, first element = {}", h_out[0]);

    let mut prof = Profiler::new();
    prof.add_queue("main", &queue);
    let profile = prof.calc()?;
    print!("{}", profile.summary((AggSort::Time, SortOrder::Desc), (OverlapSort::Duration, SortOrder::Desc)));
    Ok(())
}
