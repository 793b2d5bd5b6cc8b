//! The seam between the wrappers and an OpenCL implementation.
//!
//! Everything above this module works with [`RawHandle`]s and raw
//! [`Status`] codes handed out by a [`Driver`]. Two drivers ship with the
//! crate: [`stub::StubDriver`], a deterministic in-memory driver, and
//! (with the `opencl` feature) `opencl::ClDriver` on top of `opencl3` and
//! `cl3`.

use std::ffi::c_void;

use crate::types::{
    DeviceType, ImageDesc, ImageFormat, InfoClass, MapFlags, MemFlags, ObjectKind,
    QueueProperties, RawHandle, Status,
};

pub mod stub;

#[cfg(feature = "opencl")]
pub mod opencl;

pub type DriverResult<T> = std::result::Result<T, Status>;

/// Host function run by `clEnqueueNativeKernel`.
pub type NativeKernelFn = unsafe extern "C" fn(*mut c_void);

/// Completion callback; receives the event handle and its status.
pub type EventCallback = Box<dyn FnOnce(RawHandle, Status) + Send + 'static>;

/// Origin or region of an image transfer.
pub type Triple = [usize; 3];

/// Area of an image transfer plus the pitches of the host side. Zero
/// pitches mean tightly packed rows and slices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageRegion {
    pub origin: Triple,
    pub region: Triple,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl ImageRegion {
    pub fn new(origin: Triple, region: Triple) -> ImageRegion {
        ImageRegion { origin, region, row_pitch: 0, slice_pitch: 0 }
    }

    pub fn with_pitches(self, row_pitch: usize, slice_pitch: usize) -> ImageRegion {
        ImageRegion { row_pitch, slice_pitch, ..self }
    }
}

/// One side of a rectangular buffer transfer: the byte origin of the box
/// and the row and slice pitch of the memory around it. Zero pitches mean
/// tightly packed rows and slices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RectSide {
    pub origin: Triple,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl RectSide {
    pub fn new(origin: Triple) -> RectSide {
        RectSide { origin, row_pitch: 0, slice_pitch: 0 }
    }

    pub fn with_pitches(self, row_pitch: usize, slice_pitch: usize) -> RectSide {
        RectSide { row_pitch, slice_pitch, ..self }
    }

    /// Row and slice pitch in effect for a box of `region`.
    pub fn pitches(&self, region: Triple) -> (usize, usize) {
        let row = if self.row_pitch == 0 { region[0] } else { self.row_pitch };
        let slice = if self.slice_pitch == 0 { row.saturating_mul(region[1]) } else { self.slice_pitch };
        (row, slice)
    }

    /// Byte offset of row `y` of slice `z` of the box.
    pub fn row_offset(&self, region: Triple, y: usize, z: usize) -> usize {
        let (row, slice) = self.pitches(region);
        (self.origin[2] + z) * slice + (self.origin[1] + y) * row + self.origin[0]
    }

    /// Bytes the memory must hold for the box to fit, or `None` when the
    /// region is empty, a pitch is narrower than the box, or the sum does
    /// not fit a `usize`.
    pub fn extent(&self, region: Triple) -> Option<usize> {
        if region.contains(&0) {
            return None;
        }
        let (row, slice) = self.pitches(region);
        if row < region[0] || slice < row.checked_mul(region[1])? {
            return None;
        }
        let last_slice = self.origin[2].checked_add(region[2] - 1)?.checked_mul(slice)?;
        let last_row = self.origin[1].checked_add(region[1] - 1)?.checked_mul(row)?;
        last_slice.checked_add(last_row)?.checked_add(self.origin[0])?.checked_add(region[0])
    }
}

/// Rectangular transfer of a `region` box, measured in bytes, rows and
/// slices, from `src` to `dst`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub src: RectSide,
    pub dst: RectSide,
    pub region: Triple,
}

impl Rect {
    pub fn new(region: Triple) -> Rect {
        Rect { region, ..Rect::default() }
    }

    pub fn src(self, src: RectSide) -> Rect {
        Rect { src, ..self }
    }

    pub fn dst(self, dst: RectSide) -> Rect {
        Rect { dst, ..self }
    }
}

pub trait Driver: Send + Sync {
    /* ── discovery ─────────────────────────────────────── */

    fn platform_ids(&self) -> DriverResult<Vec<RawHandle>>;

    fn device_ids(&self, platform: RawHandle, device_type: DeviceType) -> DriverResult<Vec<RawHandle>>;

    /// Two-call info protocol: `value == None` asks for the size in bytes,
    /// `Some(buf)` fills `buf`. `secondary` is the device of a dual query,
    /// or the argument index for [`InfoClass::KernelArg`].
    fn info(
        &self,
        class: InfoClass,
        object: RawHandle,
        secondary: Option<RawHandle>,
        param: u32,
        value: Option<&mut [u8]>,
    ) -> DriverResult<usize>;

    /* ── reference counting ────────────────────────────── */

    fn retain(&self, kind: ObjectKind, handle: RawHandle) -> DriverResult<()>;

    fn release(&self, kind: ObjectKind, handle: RawHandle) -> DriverResult<()>;

    /* ── object creation ───────────────────────────────── */

    fn create_context(&self, devices: &[RawHandle]) -> DriverResult<RawHandle>;

    fn create_command_queue(
        &self,
        context: RawHandle,
        device: RawHandle,
        properties: QueueProperties,
    ) -> DriverResult<RawHandle>;

    fn create_buffer(
        &self,
        context: RawHandle,
        flags: MemFlags,
        size: usize,
        host: Option<&[u8]>,
    ) -> DriverResult<RawHandle>;

    /// Sub-buffer over `size` bytes of `buffer` starting at `origin`.
    fn create_sub_buffer(&self, buffer: RawHandle, flags: MemFlags, origin: usize, size: usize) -> DriverResult<RawHandle>;

    fn create_image(
        &self,
        context: RawHandle,
        flags: MemFlags,
        format: &ImageFormat,
        desc: &ImageDesc,
        host: Option<&[u8]>,
    ) -> DriverResult<RawHandle>;

    fn create_sampler(
        &self,
        context: RawHandle,
        normalized_coords: bool,
        addressing_mode: u32,
        filter_mode: u32,
    ) -> DriverResult<RawHandle>;

    fn create_program_with_source(&self, context: RawHandle, sources: &[&str]) -> DriverResult<RawHandle>;

    fn create_program_with_binary(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        binaries: &[&[u8]],
    ) -> DriverResult<RawHandle>;

    /// Program whose kernels the devices provide themselves; `names` is
    /// semicolon separated.
    fn create_program_with_built_in_kernels(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        names: &str,
    ) -> DriverResult<RawHandle>;

    fn build_program(&self, program: RawHandle, devices: &[RawHandle], options: &str) -> DriverResult<()>;

    /// Compiles without linking. `headers` pairs each header program with
    /// the name source files include it by.
    fn compile_program(
        &self,
        program: RawHandle,
        devices: &[RawHandle],
        options: &str,
        headers: &[(RawHandle, &str)],
    ) -> DriverResult<()>;

    /// Links compiled programs into a new executable program.
    fn link_program(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        options: &str,
        programs: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// One binary per program device, in `CL_PROGRAM_DEVICES` order. Empty
    /// for devices without a build.
    fn program_binaries(&self, program: RawHandle) -> DriverResult<Vec<Vec<u8>>>;

    fn create_kernel(&self, program: RawHandle, name: &str) -> DriverResult<RawHandle>;

    fn create_user_event(&self, context: RawHandle) -> DriverResult<RawHandle>;

    /* ── kernels ───────────────────────────────────────── */

    /// `value == None` binds local memory of `size` bytes.
    fn set_kernel_arg(&self, kernel: RawHandle, index: u32, size: usize, value: Option<&[u8]>) -> DriverResult<()>;

    fn enqueue_nd_range_kernel(
        &self,
        queue: RawHandle,
        kernel: RawHandle,
        offset: Option<&[usize]>,
        global: &[usize],
        local: Option<&[usize]>,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// `mem_offsets[i]` is the byte offset inside `args` where the handle of
    /// `mem_objects[i]` is stored.
    fn enqueue_native_kernel(
        &self,
        queue: RawHandle,
        func: NativeKernelFn,
        args: &[u8],
        mem_objects: &[RawHandle],
        mem_offsets: &[usize],
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /* ── buffers ───────────────────────────────────────── */

    /// # Safety
    /// `dst` must be valid for `size` bytes until the returned event
    /// completes.
    unsafe fn enqueue_read_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        offset: usize,
        size: usize,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// # Safety
    /// `src` must be valid for `size` bytes until the returned event
    /// completes.
    unsafe fn enqueue_write_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        offset: usize,
        size: usize,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_copy_buffer(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_fill_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        pattern: &[u8],
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_map_buffer(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        flags: MapFlags,
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void)>;

    fn enqueue_copy_buffer_to_image(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// # Safety
    /// `dst` must hold the box of `rect.dst` until the returned event
    /// completes.
    unsafe fn enqueue_read_buffer_rect(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        rect: &Rect,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// # Safety
    /// `src` must hold the box of `rect.src` until the returned event
    /// completes.
    unsafe fn enqueue_write_buffer_rect(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        rect: &Rect,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_copy_buffer_rect(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        rect: &Rect,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /* ── images ────────────────────────────────────────── */

    /// # Safety
    /// `dst` must hold the whole region with the given pitches until the
    /// returned event completes.
    unsafe fn enqueue_read_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        blocking: bool,
        area: &ImageRegion,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// # Safety
    /// `src` must hold the whole region with the given pitches until the
    /// returned event completes.
    unsafe fn enqueue_write_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        blocking: bool,
        area: &ImageRegion,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_copy_image(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_fill_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        fill_color: &[u8; 16],
        origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /// Returns the event, the mapped pointer, and the row and slice pitch.
    /// The pitches of `area` are ignored.
    fn enqueue_map_image(
        &self,
        queue: RawHandle,
        image: RawHandle,
        blocking: bool,
        flags: MapFlags,
        area: &ImageRegion,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void, usize, usize)>;

    fn enqueue_copy_image_to_buffer(
        &self,
        queue: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        region: Triple,
        dst_offset: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    /* ── generic memory / synchronisation ──────────────── */

    fn enqueue_unmap(
        &self,
        queue: RawHandle,
        mem: RawHandle,
        mapped: *mut c_void,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_migrate_mem_objects(
        &self,
        queue: RawHandle,
        mems: &[RawHandle],
        flags: u64,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle>;

    fn enqueue_marker(&self, queue: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle>;

    fn enqueue_barrier(&self, queue: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle>;

    fn wait_for_events(&self, events: &[RawHandle]) -> DriverResult<()>;

    fn set_event_callback(&self, event: RawHandle, exec_type: i32, callback: EventCallback) -> DriverResult<()>;

    fn set_user_event_status(&self, event: RawHandle, status: i32) -> DriverResult<()>;

    fn flush(&self, queue: RawHandle) -> DriverResult<()>;

    fn finish(&self, queue: RawHandle) -> DriverResult<()>;
}
