use std::{
    collections::BTreeMap,
    mem::size_of,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytemuck::Pod;

use crate::{
    buffer::Buffer,
    context::Context,
    device::Device,
    driver::NativeKernelFn,
    error::{ClError, Result, cl_try},
    event::{Event, EventWaitList, consume, wait_handles},
    image::Image,
    memobj::MemObject,
    program::Program,
    queue::Queue,
    sampler::Sampler,
    types::*,
    wrapper::{InfoValue, adopt, cl_wrapper},
    worksize::{self, WorkSizes},
};

// ─── Launch geometry ────────────────────────────────────────────────────

/// Global size plus optional offset and local size of one launch. The
/// number of dimensions is the length of `global`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NdRange {
    pub global: Vec<usize>,
    pub offset: Option<Vec<usize>>,
    pub local: Option<Vec<usize>>,
}

impl NdRange {
    pub fn new(global: &[usize]) -> NdRange {
        NdRange { global: global.to_vec(), offset: None, local: None }
    }

    pub fn local(mut self, local: &[usize]) -> NdRange {
        self.local = Some(local.to_vec());
        self
    }

    pub fn offset(mut self, offset: &[usize]) -> NdRange {
        self.offset = Some(offset.to_vec());
        self
    }

    pub fn dims(&self) -> usize {
        self.global.len()
    }

    /// 1 to 3 dimensions, with offset and local size matching the global
    /// size in length.
    pub fn validate(&self) -> Result<()> {
        let dims = self.dims();
        if !(1..=3).contains(&dims) {
            return Err(ClError::InvalidArgument(format!("work dimension {dims} not in 1..=3")));
        }
        for (what, v) in [("offset", &self.offset), ("local size", &self.local)] {
            if let Some(v) = v {
                if v.len() != dims {
                    return Err(ClError::InvalidArgument(format!("{what} has {} entries for {dims} dimension(s)", v.len())));
                }
            }
        }
        Ok(())
    }
}

// ─── Kernel arguments ───────────────────────────────────────────────────

/// One kernel argument, bound at the next enqueue.
#[derive(Clone, Debug)]
pub enum KernelArg {
    Mem(MemObject),
    Sampler(Sampler),
    /// Raw bytes of a by-value argument.
    Private(Box<[u8]>),
    /// `__local` memory of this many bytes.
    Local(usize),
    /// Leaves whatever is already bound at this index.
    Skip,
}

impl KernelArg {
    pub fn private<T: Pod>(value: &T) -> Self {
        KernelArg::Private(bytemuck::bytes_of(value).into())
    }

    /// Local memory for `n` elements of `T`.
    pub fn local<T>(n: usize) -> Self {
        KernelArg::Local(n * size_of::<T>())
    }

    pub fn local_bytes(n: usize) -> Self {
        KernelArg::Local(n)
    }

    /// Size and value pointer as passed to the driver.
    fn raw(&self) -> (usize, Option<Vec<u8>>) {
        match self {
            KernelArg::Mem(m) => (size_of::<RawHandle>(), Some(bytemuck::bytes_of(&m.handle()).to_vec())),
            KernelArg::Sampler(s) => (size_of::<RawHandle>(), Some(bytemuck::bytes_of(&s.handle()).to_vec())),
            KernelArg::Private(b) => (b.len(), Some(b.to_vec())),
            KernelArg::Local(n) => (*n, None),
            KernelArg::Skip => (0, None),
        }
    }
}

impl From<&Buffer> for KernelArg {
    fn from(b: &Buffer) -> Self {
        KernelArg::Mem(MemObject::Buffer(b.clone()))
    }
}

impl From<&Image> for KernelArg {
    fn from(i: &Image) -> Self {
        KernelArg::Mem(MemObject::Image(i.clone()))
    }
}

impl From<&Sampler> for KernelArg {
    fn from(s: &Sampler) -> Self {
        KernelArg::Sampler(s.clone())
    }
}

impl From<MemObject> for KernelArg {
    fn from(m: MemObject) -> Self {
        KernelArg::Mem(m)
    }
}

// ─── Kernel ─────────────────────────────────────────────────────────────

pub(crate) struct KernelState {
    program: Program,
    args: Mutex<BTreeMap<u32, KernelArg>>,
}

cl_wrapper!(
    /// A kernel with its table of pending arguments.
    Kernel, KernelState, ObjectKind::Kernel, InfoClass::Kernel
);

impl Kernel {
    pub fn new(program: &Program, name: &str) -> Result<Kernel> {
        let h = cl_try!(program.driver().create_kernel(program.handle(), name), "unable to create kernel '{name}'");
        let program = program.clone();
        let driver = Arc::clone(program.driver());
        Ok(Kernel(adopt(&driver, ObjectKind::Kernel, h, move || KernelState {
            program,
            args: Mutex::new(BTreeMap::new()),
        })))
    }

    pub fn program(&self) -> &Program {
        &self.state().program
    }

    pub fn context(&self) -> &Context {
        self.program().context()
    }

    pub fn function_name(&self) -> Result<String> {
        Ok(self.info(CL_KERNEL_FUNCTION_NAME)?.string())
    }

    pub fn num_args(&self) -> Result<u32> {
        self.info(CL_KERNEL_NUM_ARGS)?.scalar()
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.context().opencl_version()
    }

    /// Per-argument info (`CL_KERNEL_ARG_*`, OpenCL 1.2).
    pub fn kernel_arg_info(&self, index: u32, param: u32) -> Result<InfoValue> {
        self.context().platform()?.require_version(120, "kernel argument info")?;
        self.core().query(InfoClass::KernelArg, Some(RawHandle(index as usize)), param, true)
    }

    /// Per-device work-group info (`CL_KERNEL_*` work-group queries).
    pub fn work_group_info(&self, device: &Device, param: u32) -> Result<InfoValue> {
        self.core().query(InfoClass::KernelWorkGroup, Some(device.handle()), param, true)
    }

    pub fn work_group_size(&self, device: &Device) -> Result<usize> {
        self.work_group_info(device, CL_KERNEL_WORK_GROUP_SIZE)?.scalar()
    }

    pub fn preferred_work_group_size_multiple(&self, device: &Device) -> Result<usize> {
        self.work_group_info(device, CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE)?.scalar()
    }

    fn arg_table(&self) -> MutexGuard<'_, BTreeMap<u32, KernelArg>> {
        self.state().args.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `arg` for index `index`, replacing any pending value.
    pub fn set_arg(&self, index: u32, arg: impl Into<KernelArg>) {
        match arg.into() {
            KernelArg::Skip => {}
            arg => {
                self.arg_table().insert(index, arg);
            }
        }
    }

    /// Queues `args` for indices 0, 1, ...; `Skip` entries keep what is
    /// already pending at their index.
    pub fn set_args(&self, args: impl IntoIterator<Item = KernelArg>) {
        let mut table = self.arg_table();
        for (index, arg) in args.into_iter().enumerate() {
            if !matches!(arg, KernelArg::Skip) {
                table.insert(index as u32, arg);
            }
        }
    }

    /// Number of arguments not yet handed to the driver.
    pub fn pending_args(&self) -> usize {
        self.arg_table().len()
    }

    /// Hands the pending arguments to the driver in ascending index order.
    /// On failure the unset ones (including the failing one) stay pending.
    fn drain_args(&self) -> Result<()> {
        let mut table = self.arg_table();
        let mut pending = std::mem::take(&mut *table).into_iter();
        while let Some((index, arg)) = pending.next() {
            let (size, value) = arg.raw();
            if let Err(code) = self.driver().set_kernel_arg(self.handle(), index, size, value.as_deref()) {
                table.insert(index, arg);
                table.extend(pending);
                return Err(ClError::driver(code, format!("unable to set argument {index} of kernel {:#x}", self.handle().0)));
            }
        }
        Ok(())
    }

    /// Binds pending arguments and enqueues `range`.
    pub fn enqueue_ndrange(&self, queue: &Queue, range: &NdRange, wait: Option<&mut EventWaitList>) -> Result<Event> {
        range.validate()?;
        self.drain_args()?;
        let h = cl_try!(
            self.driver().enqueue_nd_range_kernel(
                queue.handle(),
                self.handle(),
                range.offset.as_deref(),
                &range.global,
                range.local.as_deref(),
                &wait_handles(&wait),
            ),
            "unable to enqueue kernel {:#x}",
            self.handle().0
        );
        consume(wait);
        log::debug!("enqueued kernel {:#x} over {:?} on queue {:#x}", self.handle().0, range.global, queue.handle().0);
        Ok(queue.produce_event(h))
    }

    /// `set_args` followed by `enqueue_ndrange`.
    pub fn set_args_and_enqueue_ndrange(
        &self,
        queue: &Queue,
        range: &NdRange,
        wait: Option<&mut EventWaitList>,
        args: impl IntoIterator<Item = KernelArg>,
    ) -> Result<Event> {
        self.set_args(args);
        self.enqueue_ndrange(queue, range, wait)
    }

    /// Work sizes for `real` items with this kernel's limits on `device`.
    pub fn suggest_worksizes(&self, device: &Device, real: &[usize], caps: Option<&[usize]>, pad_global: bool) -> Result<WorkSizes> {
        worksize::suggest_worksizes(Some(self), device, real, caps, pad_global)
    }
}

/// Enqueues a host function. `args` is copied; for each `(mem, offset)` the
/// handle stored at `offset` is swapped for a pointer to `mem`'s storage
/// before `func` runs.
///
/// # Safety
/// `func` must be sound to call with the patched copy of `args`.
pub unsafe fn enqueue_native(
    queue: &Queue,
    func: NativeKernelFn,
    args: &[u8],
    mem_objects: &[(MemObject, usize)],
    wait: Option<&mut EventWaitList>,
) -> Result<Event> {
    let handles: Vec<RawHandle> = mem_objects.iter().map(|(m, _)| m.handle()).collect();
    let offsets: Vec<usize> = mem_objects.iter().map(|&(_, off)| off).collect();
    if let Some(&bad) = offsets.iter().find(|&&off| off.checked_add(size_of::<RawHandle>()).is_none_or(|end| end > args.len())) {
        return Err(ClError::InvalidArgument(format!("memory object offset {bad} outside {}-byte argument block", args.len())));
    }
    let h = cl_try!(
        queue.driver().enqueue_native_kernel(queue.handle(), func, args, &handles, &offsets, &wait_handles(&wait)),
        "unable to enqueue native kernel with {} memory object(s)",
        handles.len()
    );
    consume(wait);
    Ok(queue.produce_event(h))
}
