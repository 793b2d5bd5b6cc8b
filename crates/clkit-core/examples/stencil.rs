use clkit_core::{
    Buffer, ClError, ClDriver, Context, DeviceSelector, Kernel, KernelArg, Program, Profiler, Queue, filters,
    types::{CL_COMPLETE, CL_MEM_READ_WRITE, CL_QUEUE_PROFILING_ENABLE},
    wait_list,
};

const SRC: &str = r#"
__kernel void jacobi(__global const float* src, __global float* dst, int width, int height) {
    int x = get_global_id(0);
    int y = get_global_id(1);
    if (x >= width || y >= height) return;
    if (x == 0 || y == 0 || x == width - 1 || y == height - 1) {
        dst[y * width + x] = src[y * width + x];
        return;
    }
    dst[y * width + x] = 0.25f * (src[y * width + x - 1] + src[y * width + x + 1]
                                + src[(y - 1) * width + x] + src[(y + 1) * width + x]);
}
"#;

const NX: usize = 1024;
const NY: usize = 1024;
const N_ITERS: usize = 10;

fn main() -> Result<(), ClError> {
    let driver = ClDriver::shared();
    let mut sel = DeviceSelector::new();
    sel.filter(filters::gpu()).filter(filters::same_platform());
    let ctx = Context::from_selector(&driver, &sel)?;
    let device = ctx.device(0)?;
    let queue = Queue::new(&ctx, Some(&device), CL_QUEUE_PROFILING_ENABLE)?;

    let program = Program::from_source(&ctx, SRC)?;
    program.build("-cl-fast-relaxed-math")?;
    let kernel = Kernel::new(&program, "jacobi")?;
    kernel.set_arg(2, KernelArg::private(&(NX as i32)));
    kernel.set_arg(3, KernelArg::private(&(NY as i32)));
    let ws = kernel.suggest_worksizes(&device, &[NX, NY], None, true)?;
    let range = ws.range(&[NX, NY]);

    // Ping-pong pair; ping starts from the host grid.
    let mut ping = Buffer::from_slice(&ctx, CL_MEM_READ_WRITE, &vec![1.0_f32; NX * NY])?;
    let mut pong = Buffer::new(&ctx, CL_MEM_READ_WRITE, NX * NY * size_of::<f32>(), None)?;

    let mut last = None;
    for iter in 0..N_ITERS {
        kernel.set_arg(0, &ping);
        kernel.set_arg(1, &pong);
        let mut wait = match &last {
            Some(ev) => wait_list![ev],
            None => wait_list![],
        };
        let ev = kernel.enqueue_ndrange(&queue, &range, Some(&mut wait))?;
        ev.set_name("JACOBI");
        ev.set_callback(CL_COMPLETE, move |_, status| log::debug!("jacobi iteration {iter} finished ({status})"))?;
        std::mem::swap(&mut ping, &mut pong);
        last = Some(ev);
    }

    let mut host_out = vec![0.0_f32; NX * NY];
    let mut wait = last.as_ref().map(|ev| wait_list![ev]).unwrap_or_default();
    ping.enqueue_read(&queue, 0, &mut host_out, Some(&mut wait))?;
    queue.finish()?;
    println!("Jacobi done, center value = {}", host_out[(NY / 2) * NX + NX / 2]);

    let mut prof = Profiler::new();
    prof.add_queue("stencil", &queue);
    let profile = prof.calc()?;
    println!(
        "{} events profiled, {:.3} ms on device",
        profile.num_records(),
        profile.effective_duration() as f64 * 1e-6
    );
    profile.export_to_file("stencil_profile.tsv")?;
    Ok(())
}
