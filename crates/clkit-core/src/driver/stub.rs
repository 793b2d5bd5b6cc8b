//! Deterministic in-memory driver.
//!
//! Models platforms and devices from a builder, keeps memory contents on
//! the host, completes every command immediately and stamps events from a
//! monotonic tick clock. Every call is logged so tests can observe exactly
//! what the wrappers asked for.

use std::{
    collections::{HashMap, HashSet},
    ffi::c_void,
    mem::size_of,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::{Driver, DriverResult, EventCallback, ImageRegion, NativeKernelFn, Rect, Triple};
use crate::types::*;

/* ───────────── handles ─────────────────────────────────── */

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0x1000);

fn fresh_handle() -> RawHandle {
    RawHandle(NEXT_HANDLE.fetch_add(0x10, Ordering::Relaxed))
}

/* ───────────── public configuration ────────────────────── */

/// Static description of a stub device.
#[derive(Clone, Debug)]
pub struct DeviceSpec {
    pub name: String,
    pub vendor: String,
    pub device_type: DeviceType,
    pub version: String,
    pub max_work_item_sizes: Vec<usize>,
    pub max_work_group_size: usize,
    pub queue_properties: QueueProperties,
    pub available: bool,
    pub built_in_kernels: Vec<String>,
}

impl DeviceSpec {
    pub fn new(name: &str, device_type: DeviceType) -> Self {
        Self {
            name: name.to_owned(),
            vendor: "Stub Vendor".to_owned(),
            device_type,
            version: "OpenCL 1.2 stub".to_owned(),
            max_work_item_sizes: vec![1024, 1024, 64],
            max_work_group_size: 256,
            queue_properties: CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE | CL_QUEUE_PROFILING_ENABLE,
            available: true,
            built_in_kernels: Vec::new(),
        }
    }

    pub fn gpu(name: &str) -> Self {
        Self::new(name, CL_DEVICE_TYPE_GPU)
    }

    pub fn cpu(name: &str) -> Self {
        Self::new(name, CL_DEVICE_TYPE_CPU)
    }

    pub fn accel(name: &str) -> Self {
        Self::new(name, CL_DEVICE_TYPE_ACCELERATOR)
    }

    pub fn vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_owned();
        self
    }

    pub fn work_item_sizes(mut self, sizes: &[usize]) -> Self {
        self.max_work_item_sizes = sizes.to_vec();
        self
    }

    pub fn work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    pub fn built_in_kernels(mut self, names: &[&str]) -> Self {
        self.built_in_kernels = names.iter().map(|&n| n.to_owned()).collect();
        self
    }
}

/// Operations whose failure can be injected with [`StubDriver::fail`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    PlatformIds,
    DeviceIds,
    Info(u32),
    Release,
    CreateContext,
    CreateQueue,
    CreateBuffer,
    CreateImage,
    CreateSampler,
    CreateProgram,
    BuildProgram,
    CompileProgram,
    LinkProgram,
    CreateKernel,
    SetKernelArg(u32),
    EnqueueNdRange,
    EnqueueNative,
    /// Any other enqueue.
    Enqueue,
    WaitForEvents,
    SetCallback,
    UserEvent,
    Flush,
    Finish,
}

/// One observed driver call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Retain(RawHandle),
    Release(RawHandle),
    Info { class: InfoClass, object: RawHandle, param: u32, fill: bool },
    SetKernelArg { kernel: RawHandle, index: u32, size: usize, value: Option<Vec<u8>> },
    EnqueueNdRange {
        queue: RawHandle,
        kernel: RawHandle,
        offset: Option<Vec<usize>>,
        global: Vec<usize>,
        local: Option<Vec<usize>>,
        wait: Vec<RawHandle>,
        event: RawHandle,
    },
    EnqueueNative { queue: RawHandle, args_len: usize, mem_objects: Vec<RawHandle>, wait: Vec<RawHandle>, event: RawHandle },
    Enqueue { queue: RawHandle, command: u32, wait: Vec<RawHandle>, event: RawHandle },
    WaitForEvents(Vec<RawHandle>),
    Flush(RawHandle),
    Finish(RawHandle),
}

/// Builder for [`StubDriver`].
#[derive(Default)]
pub struct StubBuilder {
    platforms: Vec<(String, String, String, Vec<DeviceSpec>)>,
    kernel_wg_size: Option<usize>,
    kernel_wg_multiple: Option<usize>,
    event_duration: Option<u64>,
}

impl StubBuilder {
    /// Starts a new platform; following `device` calls attach to it.
    pub fn platform(mut self, name: &str, vendor: &str, version: &str) -> Self {
        self.platforms.push((name.to_owned(), vendor.to_owned(), version.to_owned(), Vec::new()));
        self
    }

    pub fn device(mut self, spec: DeviceSpec) -> Self {
        if self.platforms.is_empty() {
            self = self.platform("Stub Platform", "Stub Vendor", "OpenCL 1.2 stub");
        }
        if let Some(p) = self.platforms.last_mut() {
            p.3.push(spec);
        }
        self
    }

    /// Work-group limits every kernel reports.
    pub fn kernel_limits(mut self, work_group_size: usize, preferred_multiple: usize) -> Self {
        self.kernel_wg_size = Some(work_group_size);
        self.kernel_wg_multiple = Some(preferred_multiple);
        self
    }

    /// Ticks between start and end of every command.
    pub fn event_duration(mut self, ticks: u64) -> Self {
        self.event_duration = Some(ticks);
        self
    }

    pub fn build(self) -> Arc<StubDriver> {
        let mut platforms = Vec::new();
        let mut devices = HashMap::new();
        for (name, vendor, version, specs) in self.platforms {
            let handle = fresh_handle();
            let mut devs = Vec::new();
            for spec in specs {
                let d = fresh_handle();
                devices.insert(d, (handle, spec));
                devs.push(d);
            }
            platforms.push(StubPlatform { handle, name, vendor, version, devices: devs });
        }
        Arc::new(StubDriver {
            platforms,
            devices,
            kernel_wg_size: self.kernel_wg_size.unwrap_or(256),
            kernel_wg_multiple: self.kernel_wg_multiple.unwrap_or(64),
            event_duration: self.event_duration.unwrap_or(10),
            state: Mutex::new(State { clock: 1000, ..State::default() }),
        })
    }
}

/* ───────────── internal state ──────────────────────────── */

struct StubPlatform {
    handle: RawHandle,
    name: String,
    vendor: String,
    version: String,
    devices: Vec<RawHandle>,
}

/// Sub-buffer origins must be multiples of this many bytes.
const SUB_BUFFER_ALIGN: usize = 128;

struct BuildInfo {
    status: i32,
    log: String,
    options: String,
    /// Built or linked, as opposed to only compiled.
    executable: bool,
}

impl BuildInfo {
    fn ok(options: &str, executable: bool) -> BuildInfo {
        BuildInfo { status: CL_BUILD_SUCCESS, log: String::new(), options: options.to_owned(), executable }
    }

    fn runnable(&self) -> bool {
        self.status == CL_BUILD_SUCCESS && self.executable
    }
}

enum ObjData {
    Context { devices: Vec<RawHandle> },
    Queue { context: RawHandle, device: RawHandle, properties: QueueProperties },
    Buffer { context: RawHandle, flags: MemFlags, data: Vec<u8>, map_count: u32 },
    /// Window of `size` bytes at `origin` into the storage of `parent`.
    SubBuffer { context: RawHandle, flags: MemFlags, parent: RawHandle, origin: usize, size: usize, map_count: u32 },
    Image { context: RawHandle, flags: MemFlags, format: ImageFormat, desc: ImageDesc, data: Vec<u8>, map_count: u32 },
    Sampler { context: RawHandle, normalized: bool, addressing: u32, filter: u32 },
    /// For built-in programs `source` holds the semicolon separated
    /// kernel names.
    Program {
        context: RawHandle,
        source: String,
        devices: Vec<RawHandle>,
        builds: HashMap<RawHandle, BuildInfo>,
        built_in: bool,
    },
    Kernel { program: RawHandle, context: RawHandle, name: String, num_args: u32 },
    Event { queue: RawHandle, context: RawHandle, command: u32, status: i32, times: [u64; 4], user: bool },
}

struct Obj {
    kind: ObjectKind,
    refs: u32,
    data: ObjData,
}

#[derive(Default)]
struct State {
    objects: HashMap<RawHandle, Obj>,
    calls: Vec<Call>,
    retains: HashMap<RawHandle, usize>,
    releases: HashMap<RawHandle, usize>,
    failures: HashMap<Op, Status>,
    empty_info: HashSet<u32>,
    callbacks: Vec<(RawHandle, i32, EventCallback)>,
    clock: u64,
}

/// In-memory [`Driver`].
pub struct StubDriver {
    platforms: Vec<StubPlatform>,
    devices: HashMap<RawHandle, (RawHandle, DeviceSpec)>,
    kernel_wg_size: usize,
    kernel_wg_multiple: usize,
    event_duration: u64,
    state: Mutex<State>,
}

fn string_bytes(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

fn scalar<T: bytemuck::Pod>(v: T) -> Vec<u8> {
    bytemuck::bytes_of(&v).to_vec()
}

fn handles(hs: &[RawHandle]) -> Vec<u8> {
    bytemuck::cast_slice(hs).to_vec()
}

fn channel_count(order: u32) -> usize {
    match order {
        CL_R | CL_A => 1,
        CL_RG | 0x10B3 => 2,
        CL_RGB => 3,
        _ => 4,
    }
}

fn channel_size(data_type: u32) -> usize {
    match data_type {
        0x10D0 | CL_UNORM_INT8 | 0x10D7 | CL_UNSIGNED_INT8 => 1,
        0x10D1 | 0x10D3 | 0x10D4 | 0x10D5 | 0x10D8 | 0x10DB | 0x10DD => 2,
        _ => 4,
    }
}

fn element_size(format: &ImageFormat) -> usize {
    match format.channel_data_type {
        // packed formats
        0x10D4 | 0x10D5 => 2,
        0x10D6 => 4,
        t => channel_count(format.channel_order) * channel_size(t),
    }
}

/// Packs a 4-lane fill colour into one image element.
fn pack_color(format: &ImageFormat, color: &[u8; 16]) -> Vec<u8> {
    let n = channel_count(format.channel_order);
    let size = channel_size(format.channel_data_type);
    let mut out = Vec::with_capacity(n * size);
    for lane in color.chunks_exact(4).take(n) {
        match format.channel_data_type {
            CL_UNORM_INT8 => {
                let f = f32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                out.push((f.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
            _ => out.extend_from_slice(&lane[..size.min(4)]),
        }
    }
    out
}

/// Names pulled in by `#include "name"` lines.
fn includes(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .filter_map(|l| l.trim().strip_prefix("#include"))
        .filter_map(|rest| rest.trim().strip_prefix('"')?.split('"').next())
}

/// Copies the box of `rect` from `src` to `dst`.
fn copy_box(rect: &Rect, src: &[u8], dst: &mut [u8]) -> DriverResult<()> {
    let [width, height, depth] = rect.region;
    for z in 0..depth {
        for y in 0..height {
            let s = rect.src.row_offset(rect.region, y, z);
            let d = rect.dst.row_offset(rect.region, y, z);
            let row = src.get(s..s + width).ok_or(CL_INVALID_VALUE)?;
            dst.get_mut(d..d + width).ok_or(CL_INVALID_VALUE)?.copy_from_slice(row);
        }
    }
    Ok(())
}

impl StubDriver {
    pub fn builder() -> StubBuilder {
        StubBuilder::default()
    }

    /// One platform, one GPU with 1024x1024x64 items and 256-wide groups.
    pub fn single_gpu() -> Arc<StubDriver> {
        Self::builder()
            .platform("Stub Platform", "Stub Vendor", "OpenCL 1.2 stub")
            .device(DeviceSpec::gpu("Stub GPU"))
            .build()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /* ── inspection ────────────────────────────────────── */

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn release_count(&self, handle: RawHandle) -> usize {
        self.state().releases.get(&handle).copied().unwrap_or(0)
    }

    pub fn retain_count(&self, handle: RawHandle) -> usize {
        self.state().retains.get(&handle).copied().unwrap_or(0)
    }

    /// Number of driver objects still holding a reference.
    pub fn live_objects(&self) -> usize {
        self.state().objects.len()
    }

    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.state().objects.contains_key(&handle)
    }

    /// Bytes behind a buffer, sub-buffer or image.
    pub fn buffer_contents(&self, handle: RawHandle) -> Option<Vec<u8>> {
        Self::mem_data(&mut self.state(), handle).ok().map(|d| d.to_vec())
    }

    /// Overrides the queued/submit/start/end stamps of an event.
    pub fn set_event_times(&self, event: RawHandle, queued: u64, submit: u64, start: u64, end: u64) {
        if let Some(Obj { data: ObjData::Event { times, .. }, .. }) = self.state().objects.get_mut(&event) {
            *times = [queued, submit, start, end];
        }
    }

    /// Makes every later call of `op` fail with `status`.
    pub fn fail(&self, op: Op, status: Status) {
        self.state().failures.insert(op, status);
    }

    /// Makes info queries for `param` report a size of zero bytes.
    pub fn empty_info(&self, param: u32) {
        self.state().empty_info.insert(param);
    }

    /// Drops injected failures and empty info replies.
    pub fn clear_failures(&self) {
        let mut st = self.state();
        st.failures.clear();
        st.empty_info.clear();
    }

    /* ── helpers ───────────────────────────────────────── */

    fn check(st: &State, op: Op) -> DriverResult<()> {
        match st.failures.get(&op) {
            Some(&code) => Err(code),
            None => Ok(()),
        }
    }

    fn insert(st: &mut State, kind: ObjectKind, data: ObjData) -> RawHandle {
        let h = fresh_handle();
        st.objects.insert(h, Obj { kind, refs: 1, data });
        h
    }

    fn platform(&self, handle: RawHandle) -> Option<&StubPlatform> {
        self.platforms.iter().find(|p| p.handle == handle)
    }

    fn queue_of(st: &State, queue: RawHandle) -> DriverResult<(RawHandle, QueueProperties)> {
        match st.objects.get(&queue).map(|o| &o.data) {
            Some(ObjData::Queue { context, properties, .. }) => Ok((*context, *properties)),
            _ => Err(CL_INVALID_COMMAND_QUEUE),
        }
    }

    fn check_wait(st: &State, wait: &[RawHandle]) -> DriverResult<()> {
        let ok = wait.iter().all(|e| matches!(st.objects.get(e).map(|o| &o.data), Some(ObjData::Event { .. })));
        if ok { Ok(()) } else { Err(CL_INVALID_EVENT_WAIT_LIST) }
    }

    /// Creates a completed event for `command` on `queue` and logs it.
    fn push_command(&self, st: &mut State, queue: RawHandle, command: u32, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let (context, _) = Self::queue_of(st, queue)?;
        Self::check_wait(st, wait)?;
        let queued = st.clock;
        let start = queued + 2;
        let end = start + self.event_duration;
        st.clock = end;
        let ev = Self::insert(
            st,
            ObjectKind::Event,
            ObjData::Event { queue, context, command, status: CL_COMPLETE, times: [queued, queued + 1, start, end], user: false },
        );
        Ok(ev)
    }

    fn enqueue_simple(&self, queue: RawHandle, command: u32, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        let ev = self.push_command(&mut st, queue, command, wait)?;
        st.calls.push(Call::Enqueue { queue, command, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    /// Storage of a memory object; sub-buffers resolve to their window of
    /// the parent.
    fn mem_data(st: &mut State, mem: RawHandle) -> DriverResult<&mut [u8]> {
        let (target, window) = match st.objects.get(&mem).map(|o| &o.data) {
            Some(ObjData::SubBuffer { parent, origin, size, .. }) => (*parent, Some(*origin..*origin + *size)),
            _ => (mem, None),
        };
        let data = match st.objects.get_mut(&target).map(|o| &mut o.data) {
            Some(ObjData::Buffer { data, .. }) | Some(ObjData::Image { data, .. }) => data.as_mut_slice(),
            _ => return Err(CL_INVALID_MEM_OBJECT),
        };
        match window {
            Some(w) => data.get_mut(w).ok_or(CL_INVALID_MEM_OBJECT),
            None => Ok(data),
        }
    }

    /// Drops one reference, removing the object at zero. A removed
    /// sub-buffer lets go of its parent too.
    fn drop_ref(st: &mut State, handle: RawHandle) {
        let Some(obj) = st.objects.get_mut(&handle) else { return };
        obj.refs -= 1;
        if obj.refs == 0 {
            if let Some(Obj { data: ObjData::SubBuffer { parent, .. }, .. }) = st.objects.remove(&handle) {
                Self::drop_ref(st, parent);
            }
        }
    }

    fn image_geometry(st: &State, image: RawHandle) -> DriverResult<(usize, usize, usize)> {
        match st.objects.get(&image).map(|o| &o.data) {
            Some(ObjData::Image { format, desc, .. }) => {
                let elem = element_size(format);
                let row = desc.width * elem;
                Ok((elem, row, row * desc.height.max(1)))
            }
            _ => Err(CL_INVALID_MEM_OBJECT),
        }
    }

    /// Byte ranges of each row of `region` inside an image, in host order.
    fn image_rows(geom: (usize, usize, usize), origin: Triple, region: Triple) -> Vec<(usize, usize)> {
        let (elem, row, slice) = geom;
        let mut out = Vec::new();
        for z in 0..region[2].max(1) {
            for y in 0..region[1].max(1) {
                let off = (origin[2] + z) * slice + (origin[1] + y) * row + origin[0] * elem;
                out.push((off, region[0] * elem));
            }
        }
        out
    }

    fn kernel_names(source: &str, built_in: bool) -> Vec<&str> {
        if built_in {
            return source.split(';').map(str::trim).filter(|n| !n.is_empty()).collect();
        }
        source
            .split("__kernel")
            .skip(1)
            .filter_map(|chunk| chunk.split('(').next())
            .filter_map(|decl| decl.split_whitespace().last())
            .collect()
    }

    /// A binary is the program text of a successful build; devices without
    /// one get an empty binary.
    fn binaries_of(source: &str, devices: &[RawHandle], builds: &HashMap<RawHandle, BuildInfo>, built_in: bool) -> Vec<Vec<u8>> {
        devices
            .iter()
            .map(|d| match builds.get(d) {
                Some(b) if b.status == CL_BUILD_SUCCESS && !built_in => source.as_bytes().to_vec(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn kernel_num_args(source: &str, name: &str) -> Option<u32> {
        let sig = format!("{name}(");
        let at = source.find(&sig)? + sig.len();
        let rest = &source[at..];
        let params = &rest[..rest.find(')')?];
        if params.trim().is_empty() {
            Some(0)
        } else {
            Some(params.split(',').count() as u32)
        }
    }

    fn info_bytes(&self, st: &State, class: InfoClass, object: RawHandle, secondary: Option<RawHandle>, param: u32) -> DriverResult<Vec<u8>> {
        let obj = st.objects.get(&object);
        let refs = obj.map(|o| o.refs).unwrap_or(0);
        match class {
            InfoClass::Platform => {
                let p = self.platform(object).ok_or(-32)?;
                match param {
                    CL_PLATFORM_PROFILE => Ok(string_bytes("FULL_PROFILE")),
                    CL_PLATFORM_VERSION => Ok(string_bytes(&p.version)),
                    CL_PLATFORM_NAME => Ok(string_bytes(&p.name)),
                    CL_PLATFORM_VENDOR => Ok(string_bytes(&p.vendor)),
                    CL_PLATFORM_EXTENSIONS => Ok(string_bytes("")),
                    _ => Err(CL_INVALID_VALUE),
                }
            }
            InfoClass::Device => {
                let (platform, d) = self.devices.get(&object).ok_or(CL_INVALID_DEVICE)?;
                match param {
                    CL_DEVICE_TYPE => Ok(scalar(d.device_type)),
                    CL_DEVICE_VENDOR_ID => Ok(scalar(0x5717u32)),
                    CL_DEVICE_MAX_COMPUTE_UNITS => Ok(scalar(8u32)),
                    CL_DEVICE_MAX_WORK_ITEM_DIMENSIONS => Ok(scalar(d.max_work_item_sizes.len() as u32)),
                    CL_DEVICE_MAX_WORK_ITEM_SIZES => Ok(bytemuck::cast_slice(&d.max_work_item_sizes).to_vec()),
                    CL_DEVICE_MAX_WORK_GROUP_SIZE => Ok(scalar(d.max_work_group_size)),
                    CL_DEVICE_MEM_BASE_ADDR_ALIGN => Ok(scalar((SUB_BUFFER_ALIGN * 8) as u32)),
                    CL_DEVICE_GLOBAL_MEM_SIZE => Ok(scalar(1u64 << 30)),
                    CL_DEVICE_LOCAL_MEM_SIZE => Ok(scalar(32u64 << 10)),
                    CL_DEVICE_AVAILABLE => Ok(scalar(d.available as u32)),
                    CL_DEVICE_QUEUE_PROPERTIES => Ok(scalar(d.queue_properties)),
                    CL_DEVICE_NAME => Ok(string_bytes(&d.name)),
                    CL_DEVICE_VENDOR => Ok(string_bytes(&d.vendor)),
                    CL_DRIVER_VERSION => Ok(string_bytes("1.0")),
                    CL_DEVICE_VERSION => Ok(string_bytes(&d.version)),
                    CL_DEVICE_PLATFORM => Ok(scalar(*platform)),
                    CL_DEVICE_BUILT_IN_KERNELS => Ok(string_bytes(&d.built_in_kernels.join(";"))),
                    _ => Err(CL_INVALID_VALUE),
                }
            }
            InfoClass::Context => match obj.map(|o| &o.data) {
                Some(ObjData::Context { devices }) => match param {
                    CL_CONTEXT_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_CONTEXT_DEVICES => Ok(handles(devices)),
                    CL_CONTEXT_NUM_DEVICES => Ok(scalar(devices.len() as u32)),
                    CL_CONTEXT_PROPERTIES => {
                        let platform = devices.first().and_then(|d| self.devices.get(d)).map(|(p, _)| p.0).unwrap_or(0);
                        Ok(bytemuck::cast_slice(&[CL_CONTEXT_PLATFORM as usize, platform, 0]).to_vec())
                    }
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(CL_INVALID_CONTEXT),
            },
            InfoClass::Queue => match obj.map(|o| &o.data) {
                Some(ObjData::Queue { context, device, properties }) => match param {
                    CL_QUEUE_CONTEXT => Ok(scalar(*context)),
                    CL_QUEUE_DEVICE => Ok(scalar(*device)),
                    CL_QUEUE_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_QUEUE_PROPERTIES => Ok(scalar(*properties)),
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(CL_INVALID_COMMAND_QUEUE),
            },
            InfoClass::MemObject => match obj.map(|o| &o.data) {
                Some(ObjData::Buffer { context, flags, data, map_count }) => match param {
                    CL_MEM_TYPE => Ok(scalar(CL_MEM_OBJECT_BUFFER)),
                    CL_MEM_FLAGS => Ok(scalar(*flags)),
                    CL_MEM_SIZE => Ok(scalar(data.len())),
                    CL_MEM_HOST_PTR => Ok(scalar(0usize)),
                    CL_MEM_MAP_COUNT => Ok(scalar(*map_count)),
                    CL_MEM_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_MEM_CONTEXT => Ok(scalar(*context)),
                    CL_MEM_ASSOCIATED_MEMOBJECT => Ok(scalar(RawHandle::NULL)),
                    CL_MEM_OFFSET => Ok(scalar(0usize)),
                    _ => Err(CL_INVALID_VALUE),
                },
                Some(ObjData::SubBuffer { context, flags, parent, origin, size, map_count }) => match param {
                    CL_MEM_TYPE => Ok(scalar(CL_MEM_OBJECT_BUFFER)),
                    CL_MEM_FLAGS => Ok(scalar(*flags)),
                    CL_MEM_SIZE => Ok(scalar(*size)),
                    CL_MEM_HOST_PTR => Ok(scalar(0usize)),
                    CL_MEM_MAP_COUNT => Ok(scalar(*map_count)),
                    CL_MEM_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_MEM_CONTEXT => Ok(scalar(*context)),
                    CL_MEM_ASSOCIATED_MEMOBJECT => Ok(scalar(*parent)),
                    CL_MEM_OFFSET => Ok(scalar(*origin)),
                    _ => Err(CL_INVALID_VALUE),
                },
                Some(ObjData::Image { context, flags, desc, data, map_count, .. }) => match param {
                    CL_MEM_TYPE => Ok(scalar(desc.image_type)),
                    CL_MEM_FLAGS => Ok(scalar(*flags)),
                    CL_MEM_SIZE => Ok(scalar(data.len())),
                    CL_MEM_HOST_PTR => Ok(scalar(0usize)),
                    CL_MEM_MAP_COUNT => Ok(scalar(*map_count)),
                    CL_MEM_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_MEM_CONTEXT => Ok(scalar(*context)),
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(CL_INVALID_MEM_OBJECT),
            },
            InfoClass::Image => match obj.map(|o| &o.data) {
                Some(ObjData::Image { format, desc, .. }) => {
                    let elem = element_size(format);
                    match param {
                        CL_IMAGE_FORMAT => Ok(scalar(*format)),
                        CL_IMAGE_ELEMENT_SIZE => Ok(scalar(elem)),
                        CL_IMAGE_ROW_PITCH => Ok(scalar(desc.width * elem)),
                        CL_IMAGE_SLICE_PITCH => Ok(scalar(desc.width * elem * desc.height.max(1))),
                        CL_IMAGE_WIDTH => Ok(scalar(desc.width)),
                        CL_IMAGE_HEIGHT => Ok(scalar(desc.height)),
                        CL_IMAGE_DEPTH => Ok(scalar(desc.depth)),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_MEM_OBJECT),
            },
            InfoClass::Sampler => match obj.map(|o| &o.data) {
                Some(ObjData::Sampler { context, normalized, addressing, filter }) => match param {
                    CL_SAMPLER_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_SAMPLER_CONTEXT => Ok(scalar(*context)),
                    CL_SAMPLER_NORMALIZED_COORDS => Ok(scalar(*normalized as u32)),
                    CL_SAMPLER_ADDRESSING_MODE => Ok(scalar(*addressing)),
                    CL_SAMPLER_FILTER_MODE => Ok(scalar(*filter)),
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(-41),
            },
            InfoClass::Program => match obj.map(|o| &o.data) {
                Some(ObjData::Program { context, source, devices, builds, built_in }) => {
                    let built = builds.values().any(BuildInfo::runnable);
                    let names = Self::kernel_names(source, *built_in);
                    match param {
                        CL_PROGRAM_REFERENCE_COUNT => Ok(scalar(refs)),
                        CL_PROGRAM_CONTEXT => Ok(scalar(*context)),
                        CL_PROGRAM_NUM_DEVICES => Ok(scalar(devices.len() as u32)),
                        CL_PROGRAM_DEVICES => Ok(handles(devices)),
                        CL_PROGRAM_SOURCE if *built_in => Ok(string_bytes("")),
                        CL_PROGRAM_SOURCE => Ok(string_bytes(source)),
                        CL_PROGRAM_BINARY_SIZES => {
                            let sizes: Vec<usize> = Self::binaries_of(source, devices, builds, *built_in).iter().map(Vec::len).collect();
                            Ok(bytemuck::cast_slice(&sizes).to_vec())
                        }
                        CL_PROGRAM_NUM_KERNELS if built => Ok(scalar(names.len())),
                        CL_PROGRAM_KERNEL_NAMES if built => Ok(string_bytes(&names.join(";"))),
                        CL_PROGRAM_NUM_KERNELS | CL_PROGRAM_KERNEL_NAMES => Err(CL_INVALID_PROGRAM_EXECUTABLE),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_PROGRAM),
            },
            InfoClass::ProgramBuild => match obj.map(|o| &o.data) {
                Some(ObjData::Program { devices, builds, .. }) => {
                    let dev = secondary.ok_or(CL_INVALID_DEVICE)?;
                    if !devices.contains(&dev) {
                        return Err(CL_INVALID_DEVICE);
                    }
                    let b = builds.get(&dev);
                    match param {
                        CL_PROGRAM_BUILD_STATUS => Ok(scalar(b.map(|b| b.status).unwrap_or(CL_BUILD_NONE))),
                        CL_PROGRAM_BUILD_OPTIONS => Ok(string_bytes(b.map(|b| b.options.as_str()).unwrap_or(""))),
                        CL_PROGRAM_BUILD_LOG => Ok(string_bytes(b.map(|b| b.log.as_str()).unwrap_or(""))),
                        CL_PROGRAM_BINARY_TYPE => Ok(scalar(match b {
                            Some(b) if b.runnable() => CL_PROGRAM_BINARY_TYPE_EXECUTABLE,
                            Some(b) if b.status == CL_BUILD_SUCCESS => CL_PROGRAM_BINARY_TYPE_COMPILED_OBJECT,
                            _ => CL_PROGRAM_BINARY_TYPE_NONE,
                        })),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_PROGRAM),
            },
            InfoClass::Kernel => match obj.map(|o| &o.data) {
                Some(ObjData::Kernel { program, context, name, num_args }) => match param {
                    CL_KERNEL_FUNCTION_NAME => Ok(string_bytes(name)),
                    CL_KERNEL_NUM_ARGS => Ok(scalar(*num_args)),
                    CL_KERNEL_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_KERNEL_CONTEXT => Ok(scalar(*context)),
                    CL_KERNEL_PROGRAM => Ok(scalar(*program)),
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(CL_INVALID_KERNEL),
            },
            InfoClass::KernelWorkGroup => match obj.map(|o| &o.data) {
                Some(ObjData::Kernel { .. }) => {
                    if let Some(dev) = secondary {
                        if !self.devices.contains_key(&dev) {
                            return Err(CL_INVALID_DEVICE);
                        }
                    }
                    match param {
                        CL_KERNEL_WORK_GROUP_SIZE => Ok(scalar(self.kernel_wg_size)),
                        CL_KERNEL_COMPILE_WORK_GROUP_SIZE => Ok(bytemuck::cast_slice(&[0usize; 3]).to_vec()),
                        CL_KERNEL_LOCAL_MEM_SIZE => Ok(scalar(0u64)),
                        CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE => Ok(scalar(self.kernel_wg_multiple)),
                        CL_KERNEL_PRIVATE_MEM_SIZE => Ok(scalar(0u64)),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_KERNEL),
            },
            InfoClass::KernelArg => match obj.map(|o| &o.data) {
                Some(ObjData::Kernel { num_args, .. }) => {
                    let index = secondary.map(|h| h.0).unwrap_or(0);
                    if index >= *num_args as usize {
                        return Err(CL_INVALID_ARG_INDEX);
                    }
                    match param {
                        CL_KERNEL_ARG_NAME => Ok(string_bytes(&format!("arg{index}"))),
                        CL_KERNEL_ARG_ADDRESS_QUALIFIER..=CL_KERNEL_ARG_TYPE_QUALIFIER => Err(CL_KERNEL_ARG_INFO_NOT_AVAILABLE),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_KERNEL),
            },
            InfoClass::Event => match obj.map(|o| &o.data) {
                Some(ObjData::Event { queue, context, command, status, .. }) => match param {
                    CL_EVENT_COMMAND_QUEUE => Ok(scalar(*queue)),
                    CL_EVENT_COMMAND_TYPE => Ok(scalar(*command)),
                    CL_EVENT_REFERENCE_COUNT => Ok(scalar(refs)),
                    CL_EVENT_COMMAND_EXECUTION_STATUS => Ok(scalar(*status)),
                    CL_EVENT_CONTEXT => Ok(scalar(*context)),
                    _ => Err(CL_INVALID_VALUE),
                },
                _ => Err(CL_INVALID_EVENT),
            },
            InfoClass::EventProfiling => match obj.map(|o| &o.data) {
                Some(ObjData::Event { queue, times, user, status, .. }) => {
                    if *user || *status != CL_COMPLETE {
                        return Err(CL_PROFILING_INFO_NOT_AVAILABLE);
                    }
                    let (_, props) = Self::queue_of(st, *queue).map_err(|_| CL_PROFILING_INFO_NOT_AVAILABLE)?;
                    if props & CL_QUEUE_PROFILING_ENABLE == 0 {
                        return Err(CL_PROFILING_INFO_NOT_AVAILABLE);
                    }
                    match param {
                        CL_PROFILING_COMMAND_QUEUED => Ok(scalar(times[0])),
                        CL_PROFILING_COMMAND_SUBMIT => Ok(scalar(times[1])),
                        CL_PROFILING_COMMAND_START => Ok(scalar(times[2])),
                        CL_PROFILING_COMMAND_END => Ok(scalar(times[3])),
                        _ => Err(CL_INVALID_VALUE),
                    }
                }
                _ => Err(CL_INVALID_EVENT),
            },
        }
    }
}

impl Driver for StubDriver {
    fn platform_ids(&self) -> DriverResult<Vec<RawHandle>> {
        Self::check(&self.state(), Op::PlatformIds)?;
        Ok(self.platforms.iter().map(|p| p.handle).collect())
    }

    fn device_ids(&self, platform: RawHandle, device_type: DeviceType) -> DriverResult<Vec<RawHandle>> {
        Self::check(&self.state(), Op::DeviceIds)?;
        let p = self.platform(platform).ok_or(-32)?;
        let found: Vec<RawHandle> = p
            .devices
            .iter()
            .copied()
            .filter(|d| self.devices.get(d).is_some_and(|(_, s)| s.device_type & device_type != 0))
            .collect();
        if found.is_empty() { Err(CL_DEVICE_NOT_FOUND) } else { Ok(found) }
    }

    fn info(
        &self,
        class: InfoClass,
        object: RawHandle,
        secondary: Option<RawHandle>,
        param: u32,
        value: Option<&mut [u8]>,
    ) -> DriverResult<usize> {
        let mut st = self.state();
        st.calls.push(Call::Info { class, object, param, fill: value.is_some() });
        Self::check(&st, Op::Info(param))?;
        if st.empty_info.contains(&param) {
            return Ok(0);
        }
        let bytes = self.info_bytes(&st, class, object, secondary, param)?;
        match value {
            None => Ok(bytes.len()),
            Some(buf) if buf.len() >= bytes.len() => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(_) => Err(CL_INVALID_VALUE),
        }
    }

    fn retain(&self, _kind: ObjectKind, handle: RawHandle) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::Retain(handle));
        let obj = st.objects.get_mut(&handle).ok_or(CL_INVALID_VALUE)?;
        obj.refs += 1;
        *st.retains.entry(handle).or_default() += 1;
        Ok(())
    }

    fn release(&self, kind: ObjectKind, handle: RawHandle) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::Release(handle));
        Self::check(&st, Op::Release)?;
        let obj = st.objects.get(&handle).ok_or(CL_INVALID_VALUE)?;
        if obj.kind != kind {
            return Err(CL_INVALID_VALUE);
        }
        Self::drop_ref(&mut st, handle);
        *st.releases.entry(handle).or_default() += 1;
        Ok(())
    }

    fn create_context(&self, devices: &[RawHandle]) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateContext)?;
        if devices.is_empty() {
            return Err(CL_INVALID_VALUE);
        }
        if devices.iter().any(|d| !self.devices.contains_key(d)) {
            return Err(CL_INVALID_DEVICE);
        }
        Ok(Self::insert(&mut st, ObjectKind::Context, ObjData::Context { devices: devices.to_vec() }))
    }

    fn create_command_queue(&self, context: RawHandle, device: RawHandle, properties: QueueProperties) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateQueue)?;
        match st.objects.get(&context).map(|o| &o.data) {
            Some(ObjData::Context { devices }) if devices.contains(&device) => {}
            Some(ObjData::Context { .. }) => return Err(CL_INVALID_DEVICE),
            _ => return Err(CL_INVALID_CONTEXT),
        }
        Ok(Self::insert(&mut st, ObjectKind::Queue, ObjData::Queue { context, device, properties }))
    }

    fn create_buffer(&self, context: RawHandle, flags: MemFlags, size: usize, host: Option<&[u8]>) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateBuffer)?;
        if !matches!(st.objects.get(&context).map(|o| &o.data), Some(ObjData::Context { .. })) {
            return Err(CL_INVALID_CONTEXT);
        }
        if size == 0 {
            return Err(-61);
        }
        let mut data = vec![0u8; size];
        if let Some(src) = host {
            if src.len() < size {
                return Err(-37);
            }
            data.copy_from_slice(&src[..size]);
        }
        Ok(Self::insert(&mut st, ObjectKind::Buffer, ObjData::Buffer { context, flags, data, map_count: 0 }))
    }

    fn create_sub_buffer(&self, buffer: RawHandle, flags: MemFlags, origin: usize, size: usize) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateBuffer)?;
        let (context, parent_flags, len) = match st.objects.get(&buffer).map(|o| &o.data) {
            Some(ObjData::Buffer { context, flags, data, .. }) => (*context, *flags, data.len()),
            _ => return Err(CL_INVALID_MEM_OBJECT),
        };
        if size == 0 {
            return Err(CL_INVALID_BUFFER_SIZE);
        }
        if origin.checked_add(size).is_none_or(|end| end > len) {
            return Err(CL_INVALID_VALUE);
        }
        if origin % SUB_BUFFER_ALIGN != 0 {
            return Err(CL_MISALIGNED_SUB_BUFFER_OFFSET);
        }
        let flags = if flags == 0 { parent_flags } else { flags };
        if let Some(parent) = st.objects.get_mut(&buffer) {
            parent.refs += 1;
        }
        Ok(Self::insert(
            &mut st,
            ObjectKind::Buffer,
            ObjData::SubBuffer { context, flags, parent: buffer, origin, size, map_count: 0 },
        ))
    }

    fn create_image(
        &self,
        context: RawHandle,
        flags: MemFlags,
        format: &ImageFormat,
        desc: &ImageDesc,
        host: Option<&[u8]>,
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateImage)?;
        if !matches!(st.objects.get(&context).map(|o| &o.data), Some(ObjData::Context { .. })) {
            return Err(CL_INVALID_CONTEXT);
        }
        let size = element_size(format) * desc.width * desc.height.max(1) * desc.depth.max(1);
        if size == 0 {
            return Err(-40);
        }
        let mut data = vec![0u8; size];
        if let Some(src) = host {
            if src.len() < size {
                return Err(-37);
            }
            data.copy_from_slice(&src[..size]);
        }
        Ok(Self::insert(
            &mut st,
            ObjectKind::Image,
            ObjData::Image { context, flags, format: *format, desc: *desc, data, map_count: 0 },
        ))
    }

    fn create_sampler(&self, context: RawHandle, normalized: bool, addressing: u32, filter: u32) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateSampler)?;
        if !matches!(st.objects.get(&context).map(|o| &o.data), Some(ObjData::Context { .. })) {
            return Err(CL_INVALID_CONTEXT);
        }
        Ok(Self::insert(&mut st, ObjectKind::Sampler, ObjData::Sampler { context, normalized, addressing, filter }))
    }

    fn create_program_with_source(&self, context: RawHandle, sources: &[&str]) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateProgram)?;
        let devices = match st.objects.get(&context).map(|o| &o.data) {
            Some(ObjData::Context { devices }) => devices.clone(),
            _ => return Err(CL_INVALID_CONTEXT),
        };
        if sources.is_empty() {
            return Err(CL_INVALID_VALUE);
        }
        let source = sources.concat();
        Ok(Self::insert(
            &mut st,
            ObjectKind::Program,
            ObjData::Program { context, source, devices, builds: HashMap::new(), built_in: false },
        ))
    }

    fn create_program_with_binary(&self, context: RawHandle, devices: &[RawHandle], binaries: &[&[u8]]) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateProgram)?;
        match st.objects.get(&context).map(|o| &o.data) {
            Some(ObjData::Context { devices: ctx_devs }) if devices.iter().all(|d| ctx_devs.contains(d)) => {}
            Some(ObjData::Context { .. }) => return Err(CL_INVALID_DEVICE),
            _ => return Err(CL_INVALID_CONTEXT),
        }
        if devices.is_empty() || binaries.len() != devices.len() {
            return Err(CL_INVALID_VALUE);
        }
        let source = String::from_utf8_lossy(binaries[0]).into_owned();
        Ok(Self::insert(
            &mut st,
            ObjectKind::Program,
            ObjData::Program { context, source, devices: devices.to_vec(), builds: HashMap::new(), built_in: false },
        ))
    }

    fn create_program_with_built_in_kernels(&self, context: RawHandle, devices: &[RawHandle], names: &str) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateProgram)?;
        match st.objects.get(&context).map(|o| &o.data) {
            Some(ObjData::Context { devices: ctx_devs }) if devices.iter().all(|d| ctx_devs.contains(d)) => {}
            Some(ObjData::Context { .. }) => return Err(CL_INVALID_DEVICE),
            _ => return Err(CL_INVALID_CONTEXT),
        }
        let wanted = Self::kernel_names(names, true);
        if devices.is_empty() || wanted.is_empty() {
            return Err(CL_INVALID_VALUE);
        }
        let supported = devices
            .iter()
            .all(|d| self.devices.get(d).is_some_and(|(_, spec)| wanted.iter().all(|w| spec.built_in_kernels.iter().any(|k| k == w))));
        if !supported {
            return Err(CL_INVALID_VALUE);
        }
        let builds = devices.iter().map(|&d| (d, BuildInfo::ok("", true))).collect();
        Ok(Self::insert(
            &mut st,
            ObjectKind::Program,
            ObjData::Program { context, source: wanted.join(";"), devices: devices.to_vec(), builds, built_in: true },
        ))
    }

    fn build_program(&self, program: RawHandle, devices: &[RawHandle], options: &str) -> DriverResult<()> {
        let mut st = self.state();
        Self::check(&st, Op::BuildProgram)?;
        let Some(Obj { data: ObjData::Program { source, devices: prog_devs, builds, built_in, .. }, .. }) = st.objects.get_mut(&program)
        else {
            return Err(CL_INVALID_PROGRAM);
        };
        if *built_in {
            return Err(CL_INVALID_OPERATION);
        }
        let targets: Vec<RawHandle> = if devices.is_empty() { prog_devs.clone() } else { devices.to_vec() };
        if targets.iter().any(|d| !prog_devs.contains(d)) {
            return Err(CL_INVALID_DEVICE);
        }
        let failed = source.contains("#error");
        for d in targets {
            let info = if failed {
                BuildInfo {
                    status: CL_BUILD_ERROR,
                    log: "error: #error directive encountered".to_owned(),
                    options: options.to_owned(),
                    executable: false,
                }
            } else {
                BuildInfo::ok(options, true)
            };
            builds.insert(d, info);
        }
        if failed { Err(CL_BUILD_PROGRAM_FAILURE) } else { Ok(()) }
    }

    fn compile_program(&self, program: RawHandle, devices: &[RawHandle], options: &str, headers: &[(RawHandle, &str)]) -> DriverResult<()> {
        let mut st = self.state();
        Self::check(&st, Op::CompileProgram)?;
        for (h, _) in headers {
            if !matches!(st.objects.get(h).map(|o| &o.data), Some(ObjData::Program { .. })) {
                return Err(CL_INVALID_PROGRAM);
            }
        }
        let Some(Obj { data: ObjData::Program { source, devices: prog_devs, builds, built_in, .. }, .. }) = st.objects.get_mut(&program)
        else {
            return Err(CL_INVALID_PROGRAM);
        };
        if *built_in {
            return Err(CL_INVALID_OPERATION);
        }
        let targets: Vec<RawHandle> = if devices.is_empty() { prog_devs.clone() } else { devices.to_vec() };
        if targets.iter().any(|d| !prog_devs.contains(d)) {
            return Err(CL_INVALID_DEVICE);
        }
        let missing = includes(source).find(|inc| !headers.iter().any(|(_, name)| name == inc));
        let log = match missing {
            Some(inc) => Some(format!("fatal error: '{inc}' file not found")),
            None if source.contains("#error") => Some("error: #error directive encountered".to_owned()),
            None => None,
        };
        for d in targets {
            let info = match &log {
                Some(log) => BuildInfo { status: CL_BUILD_ERROR, log: log.clone(), options: options.to_owned(), executable: false },
                None => BuildInfo::ok(options, false),
            };
            builds.insert(d, info);
        }
        if log.is_some() { Err(CL_COMPILE_PROGRAM_FAILURE) } else { Ok(()) }
    }

    fn link_program(&self, context: RawHandle, devices: &[RawHandle], options: &str, programs: &[RawHandle]) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::LinkProgram)?;
        let ctx_devs = match st.objects.get(&context).map(|o| &o.data) {
            Some(ObjData::Context { devices }) => devices.clone(),
            _ => return Err(CL_INVALID_CONTEXT),
        };
        let targets: Vec<RawHandle> = if devices.is_empty() { ctx_devs.clone() } else { devices.to_vec() };
        if targets.iter().any(|d| !ctx_devs.contains(d)) {
            return Err(CL_INVALID_DEVICE);
        }
        if programs.is_empty() {
            return Err(CL_INVALID_VALUE);
        }
        let mut sources = Vec::with_capacity(programs.len());
        for p in programs {
            match st.objects.get(p).map(|o| &o.data) {
                Some(ObjData::Program { source, builds, .. }) => {
                    let compiled = targets
                        .iter()
                        .all(|d| builds.get(d).is_some_and(|b| b.status == CL_BUILD_SUCCESS && !b.executable));
                    if !compiled {
                        return Err(CL_INVALID_OPERATION);
                    }
                    sources.push(source.clone());
                }
                _ => return Err(CL_INVALID_PROGRAM),
            }
        }
        let builds = targets.iter().map(|&d| (d, BuildInfo::ok(options, true))).collect();
        Ok(Self::insert(
            &mut st,
            ObjectKind::Program,
            ObjData::Program { context, source: sources.join("\n"), devices: targets, builds, built_in: false },
        ))
    }

    fn program_binaries(&self, program: RawHandle) -> DriverResult<Vec<Vec<u8>>> {
        match self.state().objects.get(&program).map(|o| &o.data) {
            Some(ObjData::Program { source, devices, builds, built_in, .. }) => Ok(Self::binaries_of(source, devices, builds, *built_in)),
            _ => Err(CL_INVALID_PROGRAM),
        }
    }

    fn create_kernel(&self, program: RawHandle, name: &str) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::CreateKernel)?;
        let (context, num_args) = match st.objects.get(&program).map(|o| &o.data) {
            Some(ObjData::Program { context, source, builds, built_in, .. }) => {
                if !builds.values().any(BuildInfo::runnable) {
                    return Err(CL_INVALID_PROGRAM_EXECUTABLE);
                }
                let n = if *built_in {
                    Self::kernel_names(source, true).contains(&name).then_some(0).ok_or(CL_INVALID_KERNEL_NAME)?
                } else {
                    Self::kernel_num_args(source, name).ok_or(CL_INVALID_KERNEL_NAME)?
                };
                (*context, n)
            }
            _ => return Err(CL_INVALID_PROGRAM),
        };
        Ok(Self::insert(
            &mut st,
            ObjectKind::Kernel,
            ObjData::Kernel { program, context, name: name.to_owned(), num_args },
        ))
    }

    fn create_user_event(&self, context: RawHandle) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::UserEvent)?;
        if !matches!(st.objects.get(&context).map(|o| &o.data), Some(ObjData::Context { .. })) {
            return Err(CL_INVALID_CONTEXT);
        }
        Ok(Self::insert(
            &mut st,
            ObjectKind::Event,
            ObjData::Event { queue: RawHandle::NULL, context, command: CL_COMMAND_USER, status: CL_SUBMITTED, times: [0; 4], user: true },
        ))
    }

    fn set_kernel_arg(&self, kernel: RawHandle, index: u32, size: usize, value: Option<&[u8]>) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::SetKernelArg { kernel, index, size, value: value.map(<[u8]>::to_vec) });
        Self::check(&st, Op::SetKernelArg(index))?;
        match st.objects.get(&kernel).map(|o| &o.data) {
            Some(ObjData::Kernel { num_args, .. }) if index < *num_args => {}
            Some(ObjData::Kernel { .. }) => return Err(CL_INVALID_ARG_INDEX),
            _ => return Err(CL_INVALID_KERNEL),
        }
        match value {
            Some(v) if v.len() != size => Err(CL_INVALID_ARG_SIZE),
            None if size == 0 => Err(CL_INVALID_ARG_SIZE),
            _ => Ok(()),
        }
    }

    fn enqueue_nd_range_kernel(
        &self,
        queue: RawHandle,
        kernel: RawHandle,
        offset: Option<&[usize]>,
        global: &[usize],
        local: Option<&[usize]>,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::EnqueueNdRange)?;
        if !matches!(st.objects.get(&kernel).map(|o| &o.data), Some(ObjData::Kernel { .. })) {
            return Err(CL_INVALID_KERNEL);
        }
        if global.is_empty() || global.len() > 3 {
            return Err(CL_INVALID_WORK_DIMENSION);
        }
        if let Some(l) = local {
            if l.len() != global.len() || l.iter().product::<usize>() > self.kernel_wg_size {
                return Err(CL_INVALID_WORK_GROUP_SIZE);
            }
        }
        let ev = self.push_command(&mut st, queue, CL_COMMAND_NDRANGE_KERNEL, wait)?;
        st.calls.push(Call::EnqueueNdRange {
            queue,
            kernel,
            offset: offset.map(<[usize]>::to_vec),
            global: global.to_vec(),
            local: local.map(<[usize]>::to_vec),
            wait: wait.to_vec(),
            event: ev,
        });
        Ok(ev)
    }

    fn enqueue_native_kernel(
        &self,
        queue: RawHandle,
        func: NativeKernelFn,
        args: &[u8],
        mem_objects: &[RawHandle],
        mem_offsets: &[usize],
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::EnqueueNative)?;
        if mem_objects.len() != mem_offsets.len() {
            return Err(CL_INVALID_VALUE);
        }
        let ev = self.push_command(&mut st, queue, CL_COMMAND_NATIVE_KERNEL, wait)?;
        st.calls.push(Call::EnqueueNative {
            queue,
            args_len: args.len(),
            mem_objects: mem_objects.to_vec(),
            wait: wait.to_vec(),
            event: ev,
        });

        // Host copy of the argument block with each handle swapped for a
        // pointer to the object's storage.
        let mut block = args.to_vec();
        for (mem, &off) in mem_objects.iter().zip(mem_offsets) {
            if off + size_of::<usize>() > block.len() {
                return Err(CL_INVALID_VALUE);
            }
            let ptr = Self::mem_data(&mut st, *mem)?.as_mut_ptr() as usize;
            block[off..off + size_of::<usize>()].copy_from_slice(&ptr.to_ne_bytes());
        }
        // SAFETY: `block` is a live, writable copy of `args`; the storage
        // pointers patched into it stay valid while `st` is held.
        unsafe { func(block.as_mut_ptr().cast()) };
        Ok(ev)
    }

    unsafe fn enqueue_read_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        _blocking: bool,
        offset: usize,
        size: usize,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        let data = Self::mem_data(&mut st, buffer)?;
        let src = data.get(offset..offset + size).ok_or(CL_INVALID_VALUE)?;
        // SAFETY: caller guarantees `dst` is valid for `size` bytes.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, size) };
        let ev = self.push_command(&mut st, queue, CL_COMMAND_READ_BUFFER, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_READ_BUFFER, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    unsafe fn enqueue_write_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        _blocking: bool,
        offset: usize,
        size: usize,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        let data = Self::mem_data(&mut st, buffer)?;
        let dst = data.get_mut(offset..offset + size).ok_or(CL_INVALID_VALUE)?;
        // SAFETY: caller guarantees `src` is valid for `size` bytes.
        unsafe { std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), size) };
        let ev = self.push_command(&mut st, queue, CL_COMMAND_WRITE_BUFFER, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_WRITE_BUFFER, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    fn enqueue_copy_buffer(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            let chunk = Self::mem_data(&mut st, src)?.get(src_offset..src_offset + size).ok_or(CL_INVALID_VALUE)?.to_vec();
            let out = Self::mem_data(&mut st, dst)?.get_mut(dst_offset..dst_offset + size).ok_or(CL_INVALID_VALUE)?;
            out.copy_from_slice(&chunk);
        }
        self.enqueue_simple(queue, CL_COMMAND_COPY_BUFFER, wait)
    }

    fn enqueue_fill_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        pattern: &[u8],
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        if pattern.is_empty() || size % pattern.len() != 0 || offset % pattern.len() != 0 {
            return Err(CL_INVALID_VALUE);
        }
        {
            let mut st = self.state();
            let out = Self::mem_data(&mut st, buffer)?.get_mut(offset..offset + size).ok_or(CL_INVALID_VALUE)?;
            for chunk in out.chunks_exact_mut(pattern.len()) {
                chunk.copy_from_slice(pattern);
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_FILL_BUFFER, wait)
    }

    fn enqueue_map_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        _blocking: bool,
        _flags: MapFlags,
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void)> {
        let ptr = {
            let mut st = self.state();
            if !matches!(st.objects.get(&buffer).map(|o| &o.data), Some(ObjData::Buffer { .. } | ObjData::SubBuffer { .. })) {
                return Err(CL_INVALID_MEM_OBJECT);
            }
            let region = Self::mem_data(&mut st, buffer)?.get_mut(offset..offset + size).ok_or(CL_INVALID_VALUE)?;
            let ptr = region.as_mut_ptr().cast::<c_void>();
            if let Some(Obj { data: ObjData::Buffer { map_count, .. } | ObjData::SubBuffer { map_count, .. }, .. }) = st.objects.get_mut(&buffer) {
                *map_count += 1;
            }
            ptr
        };
        let ev = self.enqueue_simple(queue, CL_COMMAND_MAP_BUFFER, wait)?;
        Ok((ev, ptr))
    }

    fn enqueue_copy_buffer_to_image(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            let rows = Self::image_rows(Self::image_geometry(&st, dst)?, dst_origin, region);
            let total: usize = rows.iter().map(|r| r.1).sum();
            let chunk = Self::mem_data(&mut st, src)?.get(src_offset..src_offset + total).ok_or(CL_INVALID_VALUE)?.to_vec();
            let img = Self::mem_data(&mut st, dst)?;
            let mut at = 0;
            for (off, len) in rows {
                img.get_mut(off..off + len).ok_or(CL_INVALID_VALUE)?.copy_from_slice(&chunk[at..at + len]);
                at += len;
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_COPY_BUFFER_TO_IMAGE, wait)
    }

    unsafe fn enqueue_read_buffer_rect(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        _blocking: bool,
        rect: &Rect,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        rect.src.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
        let host_len = rect.dst.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
        let data = Self::mem_data(&mut st, buffer)?;
        // SAFETY: caller guarantees `dst` covers the host box.
        let host = unsafe { std::slice::from_raw_parts_mut(dst, host_len) };
        copy_box(rect, data, host)?;
        let ev = self.push_command(&mut st, queue, CL_COMMAND_READ_BUFFER_RECT, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_READ_BUFFER_RECT, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    unsafe fn enqueue_write_buffer_rect(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        _blocking: bool,
        rect: &Rect,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        rect.dst.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
        let host_len = rect.src.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
        // SAFETY: caller guarantees `src` covers the host box.
        let host = unsafe { std::slice::from_raw_parts(src, host_len) };
        copy_box(rect, host, Self::mem_data(&mut st, buffer)?)?;
        let ev = self.push_command(&mut st, queue, CL_COMMAND_WRITE_BUFFER_RECT, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_WRITE_BUFFER_RECT, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    fn enqueue_copy_buffer_rect(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        rect: &Rect,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            rect.src.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
            rect.dst.extent(rect.region).ok_or(CL_INVALID_VALUE)?;
            let from = Self::mem_data(&mut st, src)?.to_vec();
            copy_box(rect, &from, Self::mem_data(&mut st, dst)?)?;
        }
        self.enqueue_simple(queue, CL_COMMAND_COPY_BUFFER_RECT, wait)
    }

    unsafe fn enqueue_read_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        _blocking: bool,
        area: &ImageRegion,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        let geom = Self::image_geometry(&st, image)?;
        let ImageRegion { origin, region, row_pitch, slice_pitch } = *area;
        let row_pitch = if row_pitch == 0 { region[0] * geom.0 } else { row_pitch };
        let slice_pitch = if slice_pitch == 0 { row_pitch * region[1].max(1) } else { slice_pitch };
        let rows = Self::image_rows(geom, origin, region);
        let img = Self::mem_data(&mut st, image)?;
        let per_slice = region[1].max(1);
        for (i, (off, len)) in rows.into_iter().enumerate() {
            let src = img.get(off..off + len).ok_or(CL_INVALID_VALUE)?;
            let host = (i / per_slice) * slice_pitch + (i % per_slice) * row_pitch;
            // SAFETY: caller guarantees `dst` covers the region with the given pitches.
            unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.add(host), len) };
        }
        let ev = self.push_command(&mut st, queue, CL_COMMAND_READ_IMAGE, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_READ_IMAGE, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    unsafe fn enqueue_write_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        _blocking: bool,
        area: &ImageRegion,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let mut st = self.state();
        Self::check(&st, Op::Enqueue)?;
        let geom = Self::image_geometry(&st, image)?;
        let ImageRegion { origin, region, row_pitch, slice_pitch } = *area;
        let row_pitch = if row_pitch == 0 { region[0] * geom.0 } else { row_pitch };
        let slice_pitch = if slice_pitch == 0 { row_pitch * region[1].max(1) } else { slice_pitch };
        let rows = Self::image_rows(geom, origin, region);
        let img = Self::mem_data(&mut st, image)?;
        let per_slice = region[1].max(1);
        for (i, (off, len)) in rows.into_iter().enumerate() {
            let out = img.get_mut(off..off + len).ok_or(CL_INVALID_VALUE)?;
            let host = (i / per_slice) * slice_pitch + (i % per_slice) * row_pitch;
            // SAFETY: caller guarantees `src` covers the region with the given pitches.
            unsafe { std::ptr::copy_nonoverlapping(src.add(host), out.as_mut_ptr(), len) };
        }
        let ev = self.push_command(&mut st, queue, CL_COMMAND_WRITE_IMAGE, wait)?;
        st.calls.push(Call::Enqueue { queue, command: CL_COMMAND_WRITE_IMAGE, wait: wait.to_vec(), event: ev });
        Ok(ev)
    }

    fn enqueue_copy_image(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            let src_rows = Self::image_rows(Self::image_geometry(&st, src)?, src_origin, region);
            let dst_rows = Self::image_rows(Self::image_geometry(&st, dst)?, dst_origin, region);
            let src_img = Self::mem_data(&mut st, src)?.to_vec();
            let dst_img = Self::mem_data(&mut st, dst)?;
            for ((s, len), (d, _)) in src_rows.into_iter().zip(dst_rows) {
                let chunk = src_img.get(s..s + len).ok_or(CL_INVALID_VALUE)?;
                dst_img.get_mut(d..d + len).ok_or(CL_INVALID_VALUE)?.copy_from_slice(chunk);
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_COPY_IMAGE, wait)
    }

    fn enqueue_fill_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        fill_color: &[u8; 16],
        origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            let format = match st.objects.get(&image).map(|o| &o.data) {
                Some(ObjData::Image { format, .. }) => *format,
                _ => return Err(CL_INVALID_MEM_OBJECT),
            };
            let mut pixel = pack_color(&format, fill_color);
            pixel.resize(element_size(&format), 0);
            let rows = Self::image_rows(Self::image_geometry(&st, image)?, origin, region);
            let img = Self::mem_data(&mut st, image)?;
            for (off, len) in rows {
                let out = img.get_mut(off..off + len).ok_or(CL_INVALID_VALUE)?;
                for px in out.chunks_exact_mut(pixel.len()) {
                    px.copy_from_slice(&pixel);
                }
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_FILL_IMAGE, wait)
    }

    fn enqueue_map_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        _blocking: bool,
        _flags: MapFlags,
        area: &ImageRegion,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void, usize, usize)> {
        let (ptr, row, slice) = {
            let mut st = self.state();
            let (elem, row, slice) = Self::image_geometry(&st, image)?;
            let [x, y, z] = area.origin;
            let off = z * slice + y * row + x * elem;
            let Some(Obj { data: ObjData::Image { data, map_count, .. }, .. }) = st.objects.get_mut(&image) else {
                return Err(CL_INVALID_MEM_OBJECT);
            };
            if off >= data.len() {
                return Err(CL_INVALID_VALUE);
            }
            *map_count += 1;
            (data[off..].as_mut_ptr().cast::<c_void>(), row, slice)
        };
        let ev = self.enqueue_simple(queue, CL_COMMAND_MAP_IMAGE, wait)?;
        Ok((ev, ptr, row, slice))
    }

    fn enqueue_copy_image_to_buffer(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        region: Triple,
        dst_offset: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            let rows = Self::image_rows(Self::image_geometry(&st, src)?, src_origin, region);
            let img = Self::mem_data(&mut st, src)?.to_vec();
            let buf = Self::mem_data(&mut st, dst)?;
            let mut at = dst_offset;
            for (off, len) in rows {
                let chunk = img.get(off..off + len).ok_or(CL_INVALID_VALUE)?;
                buf.get_mut(at..at + len).ok_or(CL_INVALID_VALUE)?.copy_from_slice(chunk);
                at += len;
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_COPY_IMAGE_TO_BUFFER, wait)
    }

    fn enqueue_unmap(&self, queue: RawHandle, mem: RawHandle, _mapped: *mut c_void, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            match st.objects.get_mut(&mem).map(|o| &mut o.data) {
                Some(ObjData::Buffer { map_count, .. } | ObjData::SubBuffer { map_count, .. } | ObjData::Image { map_count, .. })
                    if *map_count > 0 =>
                {
                    *map_count -= 1;
                }
                Some(ObjData::Buffer { .. } | ObjData::SubBuffer { .. } | ObjData::Image { .. }) => return Err(CL_INVALID_VALUE),
                _ => return Err(CL_INVALID_MEM_OBJECT),
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_UNMAP_MEM_OBJECT, wait)
    }

    fn enqueue_migrate_mem_objects(&self, queue: RawHandle, mems: &[RawHandle], _flags: u64, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        {
            let mut st = self.state();
            for m in mems {
                Self::mem_data(&mut st, *m)?;
            }
        }
        self.enqueue_simple(queue, CL_COMMAND_MIGRATE_MEM_OBJECTS, wait)
    }

    fn enqueue_marker(&self, queue: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        self.enqueue_simple(queue, CL_COMMAND_MARKER, wait)
    }

    fn enqueue_barrier(&self, queue: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        self.enqueue_simple(queue, CL_COMMAND_BARRIER, wait)
    }

    fn wait_for_events(&self, events: &[RawHandle]) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::WaitForEvents(events.to_vec()));
        Self::check(&st, Op::WaitForEvents)?;
        if events.is_empty() {
            return Err(CL_INVALID_VALUE);
        }
        for e in events {
            match st.objects.get(e).map(|o| &o.data) {
                Some(ObjData::Event { status, .. }) if *status < 0 => return Err(-14),
                Some(ObjData::Event { .. }) => {}
                _ => return Err(CL_INVALID_EVENT),
            }
        }
        Ok(())
    }

    fn set_event_callback(&self, event: RawHandle, exec_type: i32, callback: EventCallback) -> DriverResult<()> {
        let status = {
            let mut st = self.state();
            Self::check(&st, Op::SetCallback)?;
            let status = match st.objects.get(&event).map(|o| &o.data) {
                Some(ObjData::Event { status, .. }) => *status,
                _ => return Err(CL_INVALID_EVENT),
            };
            if status > exec_type {
                st.callbacks.push((event, exec_type, callback));
                return Ok(());
            }
            status
        };
        callback(event, status);
        Ok(())
    }

    fn set_user_event_status(&self, event: RawHandle, status: i32) -> DriverResult<()> {
        let ready = {
            let mut st = self.state();
            Self::check(&st, Op::UserEvent)?;
            match st.objects.get_mut(&event).map(|o| &mut o.data) {
                Some(ObjData::Event { user: true, status: s, .. }) if *s == CL_SUBMITTED => *s = status,
                Some(ObjData::Event { user: true, .. }) => return Err(CL_INVALID_OPERATION),
                _ => return Err(CL_INVALID_EVENT),
            }
            let (ready, pending): (Vec<_>, Vec<_>) =
                std::mem::take(&mut st.callbacks).into_iter().partition(|(e, t, _)| *e == event && status <= *t);
            st.callbacks = pending;
            ready
        };
        for (e, _, cb) in ready {
            cb(e, status);
        }
        Ok(())
    }

    fn flush(&self, queue: RawHandle) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::Flush(queue));
        Self::check(&st, Op::Flush)?;
        Self::queue_of(&st, queue).map(|_| ())
    }

    fn finish(&self, queue: RawHandle) -> DriverResult<()> {
        let mut st = self.state();
        st.calls.push(Call::Finish(queue));
        Self::check(&st, Op::Finish)?;
        Self::queue_of(&st, queue).map(|_| ())
    }
}
