//! [`Driver`] on top of the system OpenCL ICD loader. Discovery goes
//! through `opencl3`; everything else calls `cl3` directly.

// cl3 marks only some entry points unsafe; every call is wrapped alike.
#![allow(unused_unsafe)]

use std::{
    ffi::{CString, c_void},
    ptr,
    sync::Arc,
};

use cl3::{
    command_queue, context, device, event, kernel, memory, platform, program, sampler,
    types::{cl_event, cl_image_format, cl_int, cl_mem, cl_uint},
};

use super::{Driver, DriverResult, EventCallback, ImageRegion, NativeKernelFn, Rect, Triple};
use crate::types::*;

// ─── Handle conversion ─────────────────────────────────────────────────

fn raw(h: RawHandle) -> *mut c_void {
    h.0 as *mut c_void
}

fn handle(p: *mut c_void) -> RawHandle {
    RawHandle(p as usize)
}

fn handles(ps: Vec<*mut c_void>) -> Vec<RawHandle> {
    ps.into_iter().map(handle).collect()
}

/// Wait list in driver form; kept alive across the call.
struct WaitList(Vec<cl_event>);

impl WaitList {
    fn new(wait: &[RawHandle]) -> Self {
        WaitList(wait.iter().map(|&h| raw(h)).collect())
    }

    fn len(&self) -> cl_uint {
        self.0.len() as cl_uint
    }

    fn as_ptr(&self) -> *const cl_event {
        if self.0.is_empty() { ptr::null() } else { self.0.as_ptr() }
    }
}

/// Layout of `cl_image_desc`.
#[repr(C)]
struct RawImageDesc {
    image_type: u32,
    image_width: usize,
    image_height: usize,
    image_depth: usize,
    image_array_size: usize,
    image_row_pitch: usize,
    image_slice_pitch: usize,
    num_mip_levels: u32,
    num_samples: u32,
    buffer: cl_mem,
}

/// Layout of `cl_buffer_region`.
#[repr(C)]
struct RawBufferRegion {
    origin: usize,
    size: usize,
}

fn device_ids(devices: &[RawHandle]) -> Vec<*mut c_void> {
    devices.iter().map(|&d| raw(d)).collect()
}

fn cl_bool(b: bool) -> cl3::types::cl_bool {
    if b { 1 } else { 0 }
}

// ─── Extern callback ───────────────────────────────────────────────────

extern "C" fn event_callback(evt: cl_event, status: cl_int, user_data: *mut c_void) {
    // SAFETY: stems from Box::into_raw in `set_event_callback`, called once.
    let cb: Box<EventCallback> = unsafe { Box::from_raw(user_data.cast()) };
    cb(handle(evt), status);
}

// ─── Driver ────────────────────────────────────────────────────────────

/// The real OpenCL driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClDriver;

impl ClDriver {
    pub fn shared() -> Arc<dyn Driver> {
        Arc::new(ClDriver)
    }
}

/// Two-call emulation over cl3's size-then-fill helpers.
fn deliver(data: Vec<u8>, value: Option<&mut [u8]>) -> DriverResult<usize> {
    match value {
        None => Ok(data.len()),
        Some(buf) if buf.len() >= data.len() => {
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }
        Some(_) => Err(CL_INVALID_VALUE),
    }
}

impl Driver for ClDriver {
    fn platform_ids(&self) -> DriverResult<Vec<RawHandle>> {
        let platforms = opencl3::platform::get_platforms().map_err(|e| e.0)?;
        Ok(platforms.iter().map(|p| handle(p.id())).collect())
    }

    fn device_ids(&self, platform: RawHandle, device_type: DeviceType) -> DriverResult<Vec<RawHandle>> {
        opencl3::platform::Platform::new(raw(platform)).get_devices(device_type).map(handles).map_err(|e| e.0)
    }

    fn info(
        &self,
        class: InfoClass,
        object: RawHandle,
        secondary: Option<RawHandle>,
        param: u32,
        value: Option<&mut [u8]>,
    ) -> DriverResult<usize> {
        let o = raw(object);
        let sec = secondary.map_or(ptr::null_mut(), raw);
        // SAFETY: `object` and `secondary` are live handles of `class`.
        let data = unsafe {
            match class {
                InfoClass::Platform => platform::get_platform_data(o, param),
                InfoClass::Device => device::get_device_data(o, param),
                InfoClass::Context => context::get_context_data(o, param),
                InfoClass::Queue => command_queue::get_command_queue_data(o, param),
                InfoClass::MemObject => memory::get_mem_object_data(o, param),
                InfoClass::Image => memory::get_image_data(o, param),
                InfoClass::Sampler => sampler::get_sampler_data(o, param),
                InfoClass::Program => program::get_program_data(o, param),
                InfoClass::ProgramBuild => program::get_program_build_data(o, sec, param),
                InfoClass::Kernel => kernel::get_kernel_data(o, param),
                InfoClass::KernelWorkGroup => kernel::get_kernel_work_group_data(o, sec, param),
                InfoClass::KernelArg => {
                    kernel::get_kernel_arg_data(o, secondary.map_or(0, |h| h.0) as cl_uint, param)
                }
                InfoClass::Event => event::get_event_data(o, param),
                InfoClass::EventProfiling => event::get_event_profiling_data(o, param),
            }
        }?;
        deliver(data, value)
    }

    fn retain(&self, kind: ObjectKind, h: RawHandle) -> DriverResult<()> {
        let p = raw(h);
        // SAFETY: `h` is a live handle of `kind`, owned by a wrapper.
        unsafe {
            match kind {
                ObjectKind::Platform | ObjectKind::Device => Ok(()),
                ObjectKind::Context => context::retain_context(p),
                ObjectKind::Queue => command_queue::retain_command_queue(p),
                ObjectKind::Buffer | ObjectKind::Image => memory::retain_mem_object(p),
                ObjectKind::Sampler => sampler::retain_sampler(p),
                ObjectKind::Program => program::retain_program(p),
                ObjectKind::Kernel => kernel::retain_kernel(p),
                ObjectKind::Event => event::retain_event(p),
            }
        }
    }

    fn release(&self, kind: ObjectKind, h: RawHandle) -> DriverResult<()> {
        let p = raw(h);
        // SAFETY: the wrapper holding `h` gives up its reference here.
        unsafe {
            match kind {
                ObjectKind::Platform | ObjectKind::Device => Ok(()),
                ObjectKind::Context => context::release_context(p),
                ObjectKind::Queue => command_queue::release_command_queue(p),
                ObjectKind::Buffer | ObjectKind::Image => memory::release_mem_object(p),
                ObjectKind::Sampler => sampler::release_sampler(p),
                ObjectKind::Program => program::release_program(p),
                ObjectKind::Kernel => kernel::release_kernel(p),
                ObjectKind::Event => event::release_event(p),
            }
        }
    }

    fn create_context(&self, devices: &[RawHandle]) -> DriverResult<RawHandle> {
        let ids = device_ids(devices);
        // SAFETY: `ids` are live device handles.
        unsafe { context::create_context(&ids, ptr::null(), None, ptr::null_mut()) }.map(handle)
    }

    #[allow(deprecated)]
    fn create_command_queue(&self, ctx: RawHandle, dev: RawHandle, properties: QueueProperties) -> DriverResult<RawHandle> {
        // SAFETY: context and device are live handles.
        unsafe { command_queue::create_command_queue(raw(ctx), raw(dev), properties) }.map(handle)
    }

    fn create_buffer(&self, ctx: RawHandle, flags: MemFlags, size: usize, host: Option<&[u8]>) -> DriverResult<RawHandle> {
        let host_ptr = host.map_or(ptr::null_mut(), |h| h.as_ptr() as *mut c_void);
        // SAFETY: the driver only reads `host` (COPY_HOST_PTR) during the call.
        unsafe { memory::create_buffer(raw(ctx), flags, size, host_ptr) }.map(handle)
    }

    fn create_image(
        &self,
        ctx: RawHandle,
        flags: MemFlags,
        format: &ImageFormat,
        desc: &ImageDesc,
        host: Option<&[u8]>,
    ) -> DriverResult<RawHandle> {
        let d = RawImageDesc {
            image_type: desc.image_type,
            image_width: desc.width,
            image_height: desc.height,
            image_depth: desc.depth,
            image_array_size: desc.array_size,
            image_row_pitch: desc.row_pitch,
            image_slice_pitch: desc.slice_pitch,
            num_mip_levels: 0,
            num_samples: 0,
            buffer: ptr::null_mut(),
        };
        let host_ptr = host.map_or(ptr::null_mut(), |h| h.as_ptr() as *mut c_void);
        // SAFETY: `ImageFormat` and `RawImageDesc` share the C layouts.
        unsafe {
            memory::create_image(
                raw(ctx),
                flags,
                (format as *const ImageFormat).cast::<cl_image_format>(),
                (&d as *const RawImageDesc).cast(),
                host_ptr,
            )
        }
        .map(handle)
    }

    #[allow(deprecated)]
    fn create_sampler(&self, ctx: RawHandle, normalized: bool, addressing: u32, filter: u32) -> DriverResult<RawHandle> {
        // SAFETY: live context handle.
        unsafe { sampler::create_sampler(raw(ctx), cl_bool(normalized), addressing, filter) }.map(handle)
    }

    fn create_program_with_source(&self, ctx: RawHandle, sources: &[&str]) -> DriverResult<RawHandle> {
        // SAFETY: live context handle; sources are copied by the driver.
        unsafe { program::create_program_with_source(raw(ctx), sources) }.map(handle)
    }

    fn create_program_with_binary(&self, ctx: RawHandle, devices: &[RawHandle], binaries: &[&[u8]]) -> DriverResult<RawHandle> {
        let ids = device_ids(devices);
        // SAFETY: one binary per device, copied by the driver.
        unsafe { program::create_program_with_binary(raw(ctx), &ids, binaries) }.map(handle)
    }

    fn create_sub_buffer(&self, buffer: RawHandle, flags: MemFlags, origin: usize, size: usize) -> DriverResult<RawHandle> {
        let region = RawBufferRegion { origin, size };
        // SAFETY: `region` is read during the call only.
        unsafe {
            memory::create_sub_buffer(raw(buffer), flags, CL_BUFFER_CREATE_TYPE_REGION, (&region as *const RawBufferRegion).cast())
        }
        .map(handle)
    }

    fn create_program_with_built_in_kernels(&self, ctx: RawHandle, devices: &[RawHandle], names: &str) -> DriverResult<RawHandle> {
        let names = CString::new(names).map_err(|_| CL_INVALID_VALUE)?;
        // SAFETY: live context and device handles.
        unsafe { program::create_program_with_builtin_kernels(raw(ctx), &device_ids(devices), &names) }.map(handle)
    }

    fn compile_program(&self, prog: RawHandle, devices: &[RawHandle], options: &str, headers: &[(RawHandle, &str)]) -> DriverResult<()> {
        let opts = CString::new(options).map_err(|_| CL_INVALID_BUILD_OPTIONS)?;
        let programs: Vec<*mut c_void> = headers.iter().map(|&(h, _)| raw(h)).collect();
        let names = headers.iter().map(|&(_, n)| CString::new(n)).collect::<Result<Vec<_>, _>>().map_err(|_| CL_INVALID_VALUE)?;
        let name_refs: Vec<&std::ffi::CStr> = names.iter().map(CString::as_c_str).collect();
        // SAFETY: live program and header handles; no notify callback.
        unsafe { program::compile_program(raw(prog), &device_ids(devices), &opts, &programs, &name_refs, None, ptr::null_mut()) }
    }

    fn link_program(&self, ctx: RawHandle, devices: &[RawHandle], options: &str, programs: &[RawHandle]) -> DriverResult<RawHandle> {
        let opts = CString::new(options).map_err(|_| CL_INVALID_BUILD_OPTIONS)?;
        let inputs: Vec<*mut c_void> = programs.iter().map(|&p| raw(p)).collect();
        // SAFETY: live context and program handles; no notify callback.
        unsafe { program::link_program(raw(ctx), &device_ids(devices), &opts, &inputs, None, ptr::null_mut()) }.map(handle)
    }

    fn program_binaries(&self, prog: RawHandle) -> DriverResult<Vec<Vec<u8>>> {
        // SAFETY: live program handle.
        let info = unsafe { program::get_program_info(raw(prog), CL_PROGRAM_BINARIES) }?;
        Ok(info.into())
    }

    fn build_program(&self, prog: RawHandle, devices: &[RawHandle], options: &str) -> DriverResult<()> {
        let ids = device_ids(devices);
        let opts = CString::new(options).map_err(|_| CL_INVALID_BUILD_OPTIONS)?;
        // SAFETY: live program; no notify callback.
        unsafe { program::build_program(raw(prog), &ids, &opts, None, ptr::null_mut()) }
    }

    fn create_kernel(&self, prog: RawHandle, name: &str) -> DriverResult<RawHandle> {
        let name = CString::new(name).map_err(|_| CL_INVALID_KERNEL_NAME)?;
        // SAFETY: live program handle.
        unsafe { kernel::create_kernel(raw(prog), &name) }.map(handle)
    }

    fn create_user_event(&self, ctx: RawHandle) -> DriverResult<RawHandle> {
        // SAFETY: live context handle.
        unsafe { event::create_user_event(raw(ctx)) }.map(handle)
    }

    fn set_kernel_arg(&self, k: RawHandle, index: u32, size: usize, value: Option<&[u8]>) -> DriverResult<()> {
        let v = value.map_or(ptr::null(), |v| v.as_ptr().cast::<c_void>());
        // SAFETY: `v` is null (local memory) or valid for `size` bytes.
        unsafe { kernel::set_kernel_arg(raw(k), index, size, v) }
    }

    fn enqueue_nd_range_kernel(
        &self,
        q: RawHandle,
        k: RawHandle,
        offset: Option<&[usize]>,
        global: &[usize],
        local: Option<&[usize]>,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: offset and local have `global.len()` entries when given.
        unsafe {
            command_queue::enqueue_nd_range_kernel(
                raw(q),
                raw(k),
                global.len() as cl_uint,
                offset.map_or(ptr::null(), <[usize]>::as_ptr),
                global.as_ptr(),
                local.map_or(ptr::null(), <[usize]>::as_ptr),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_native_kernel(
        &self,
        q: RawHandle,
        func: NativeKernelFn,
        args: &[u8],
        mem_objects: &[RawHandle],
        mem_offsets: &[usize],
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        if mem_objects.len() != mem_offsets.len() {
            return Err(CL_INVALID_VALUE);
        }
        // The driver copies `block`; locations must point into the block it is given.
        let mut block = args.to_vec();
        let mems: Vec<cl_mem> = mem_objects.iter().map(|&m| raw(m)).collect();
        let locs: Vec<*const c_void> = mem_offsets.iter().map(|&off| block[off..].as_ptr().cast()).collect();
        let w = WaitList::new(wait);
        // SAFETY: `locs` point into `block`, which outlives the call.
        unsafe {
            command_queue::enqueue_native_kernel(
                raw(q),
                Some(func),
                block.as_mut_ptr().cast(),
                block.len(),
                mems.len() as cl_uint,
                if mems.is_empty() { ptr::null() } else { mems.as_ptr() },
                if locs.is_empty() { ptr::null() } else { locs.as_ptr() },
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    unsafe fn enqueue_read_buffer(
        &self,
        q: RawHandle,
        buf: RawHandle,
        blocking: bool,
        offset: usize,
        size: usize,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_read_buffer(raw(q), raw(buf), cl_bool(blocking), offset, size, dst.cast(), w.len(), w.as_ptr())
        }
        .map(handle)
    }

    unsafe fn enqueue_write_buffer(
        &self,
        q: RawHandle,
        buf: RawHandle,
        blocking: bool,
        offset: usize,
        size: usize,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_write_buffer(raw(q), raw(buf), cl_bool(blocking), offset, size, src.cast(), w.len(), w.as_ptr())
        }
        .map(handle)
    }

    fn enqueue_copy_buffer(
        &self,
        q: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: device-side copy between live buffers.
        unsafe {
            command_queue::enqueue_copy_buffer(raw(q), raw(src), raw(dst), src_offset, dst_offset, size, w.len(), w.as_ptr())
        }
        .map(handle)
    }

    fn enqueue_fill_buffer(
        &self,
        q: RawHandle,
        buf: RawHandle,
        pattern: &[u8],
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: the pattern is copied during the call.
        unsafe {
            command_queue::enqueue_fill_buffer(
                raw(q),
                raw(buf),
                pattern.as_ptr().cast(),
                pattern.len(),
                offset,
                size,
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_map_buffer(
        &self,
        q: RawHandle,
        buf: RawHandle,
        blocking: bool,
        flags: MapFlags,
        offset: usize,
        size: usize,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void)> {
        let w = WaitList::new(wait);
        let mut mapped: cl_mem = ptr::null_mut();
        // SAFETY: `mapped` receives the host pointer of the region.
        let ev = unsafe {
            command_queue::enqueue_map_buffer(
                raw(q),
                raw(buf),
                cl_bool(blocking),
                flags,
                offset,
                size,
                &mut mapped,
                w.len(),
                w.as_ptr(),
            )
        }?;
        Ok((handle(ev), mapped))
    }

    fn enqueue_copy_buffer_to_image(
        &self,
        q: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_offset: usize,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: origin and region are three-element arrays.
        unsafe {
            command_queue::enqueue_copy_buffer_to_image(
                raw(q),
                raw(src),
                raw(dst),
                src_offset,
                dst_origin.as_ptr(),
                region.as_ptr(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    unsafe fn enqueue_read_buffer_rect(
        &self,
        q: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        rect: &Rect,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_read_buffer_rect(
                raw(q),
                raw(buffer),
                cl_bool(blocking),
                rect.src.origin.as_ptr(),
                rect.dst.origin.as_ptr(),
                rect.region.as_ptr(),
                rect.src.row_pitch,
                rect.src.slice_pitch,
                rect.dst.row_pitch,
                rect.dst.slice_pitch,
                dst.cast(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    unsafe fn enqueue_write_buffer_rect(
        &self,
        q: RawHandle,
        buffer: RawHandle,
        blocking: bool,
        rect: &Rect,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_write_buffer_rect(
                raw(q),
                raw(buffer),
                cl_bool(blocking),
                rect.dst.origin.as_ptr(),
                rect.src.origin.as_ptr(),
                rect.region.as_ptr(),
                rect.dst.row_pitch,
                rect.dst.slice_pitch,
                rect.src.row_pitch,
                rect.src.slice_pitch,
                src.cast(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_copy_buffer_rect(
        &self,
        q: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        rect: &Rect,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: origins and region are three-element arrays.
        unsafe {
            command_queue::enqueue_copy_buffer_rect(
                raw(q),
                raw(src),
                raw(dst),
                rect.src.origin.as_ptr(),
                rect.dst.origin.as_ptr(),
                rect.region.as_ptr(),
                rect.src.row_pitch,
                rect.src.slice_pitch,
                rect.dst.row_pitch,
                rect.dst.slice_pitch,
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    unsafe fn enqueue_read_image(
        &self,
        q: RawHandle,
        image: RawHandle,
        blocking: bool,
        area: &ImageRegion,
        dst: *mut u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_read_image(
                raw(q),
                raw(image),
                cl_bool(blocking),
                area.origin.as_ptr(),
                area.region.as_ptr(),
                area.row_pitch,
                area.slice_pitch,
                dst.cast(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    unsafe fn enqueue_write_image(
        &self,
        q: RawHandle,
        image: RawHandle,
        blocking: bool,
        area: &ImageRegion,
        src: *const u8,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: forwarded to the caller.
        unsafe {
            command_queue::enqueue_write_image(
                raw(q),
                raw(image),
                cl_bool(blocking),
                area.origin.as_ptr(),
                area.region.as_ptr(),
                area.row_pitch,
                area.slice_pitch,
                src.cast_mut().cast(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_copy_image(
        &self,
        q: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        dst_origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: origins and region are three-element arrays.
        unsafe {
            command_queue::enqueue_copy_image(
                raw(q),
                raw(src),
                raw(dst),
                src_origin.as_ptr(),
                dst_origin.as_ptr(),
                region.as_ptr(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_fill_image(
        &self,
        q: RawHandle,
        image: RawHandle,
        fill_color: &[u8; 16],
        origin: Triple,
        region: Triple,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: the colour is copied during the call.
        unsafe {
            command_queue::enqueue_fill_image(
                raw(q),
                raw(image),
                fill_color.as_ptr().cast(),
                origin.as_ptr(),
                region.as_ptr(),
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_map_image(
        &self,
        q: RawHandle,
        image: RawHandle,
        blocking: bool,
        flags: MapFlags,
        area: &ImageRegion,
        wait: &[RawHandle],
    ) -> DriverResult<(RawHandle, *mut c_void, usize, usize)> {
        let w = WaitList::new(wait);
        let (mut row, mut slice) = (0usize, 0usize);
        let mut mapped: cl_mem = ptr::null_mut();
        // SAFETY: the out-parameters live on this frame.
        let ev = unsafe {
            command_queue::enqueue_map_image(
                raw(q),
                raw(image),
                cl_bool(blocking),
                flags,
                area.origin.as_ptr(),
                area.region.as_ptr(),
                &mut row,
                &mut slice,
                &mut mapped,
                w.len(),
                w.as_ptr(),
            )
        }?;
        Ok((handle(ev), mapped, row, slice))
    }

    fn enqueue_copy_image_to_buffer(
        &self,
        q: RawHandle,
        src: RawHandle,
        dst: RawHandle,
        src_origin: Triple,
        region: Triple,
        dst_offset: usize,
        wait: &[RawHandle],
    ) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: origin and region are three-element arrays.
        unsafe {
            command_queue::enqueue_copy_image_to_buffer(
                raw(q),
                raw(src),
                raw(dst),
                src_origin.as_ptr(),
                region.as_ptr(),
                dst_offset,
                w.len(),
                w.as_ptr(),
            )
        }
        .map(handle)
    }

    fn enqueue_unmap(&self, q: RawHandle, mem: RawHandle, mapped: *mut c_void, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: `mapped` came from a map call on `mem`.
        unsafe { command_queue::enqueue_unmap_mem_object(raw(q), raw(mem), mapped, w.len(), w.as_ptr()) }.map(handle)
    }

    fn enqueue_migrate_mem_objects(&self, q: RawHandle, mems: &[RawHandle], flags: u64, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let list: Vec<cl_mem> = mems.iter().map(|&m| raw(m)).collect();
        let w = WaitList::new(wait);
        // SAFETY: `list` holds live memory objects.
        unsafe {
            command_queue::enqueue_migrate_mem_object(raw(q), list.len() as cl_uint, list.as_ptr(), flags, w.len(), w.as_ptr())
        }
        .map(handle)
    }

    fn enqueue_marker(&self, q: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: live queue.
        unsafe { command_queue::enqueue_marker_with_wait_list(raw(q), w.len(), w.as_ptr()) }.map(handle)
    }

    fn enqueue_barrier(&self, q: RawHandle, wait: &[RawHandle]) -> DriverResult<RawHandle> {
        let w = WaitList::new(wait);
        // SAFETY: live queue.
        unsafe { command_queue::enqueue_barrier_with_wait_list(raw(q), w.len(), w.as_ptr()) }.map(handle)
    }

    fn wait_for_events(&self, events: &[RawHandle]) -> DriverResult<()> {
        let w = WaitList::new(events);
        // SAFETY: live events.
        unsafe { event::wait_for_events(&w.0) }
    }

    fn set_event_callback(&self, ev: RawHandle, exec_type: i32, callback: EventCallback) -> DriverResult<()> {
        let user_data = Box::into_raw(Box::new(callback));
        // SAFETY: `event_callback` takes ownership of `user_data` exactly once.
        let res = unsafe { event::set_event_callback(raw(ev), exec_type, event_callback, user_data.cast()) };
        if res.is_err() {
            // SAFETY: the driver rejected the callback, so it never runs.
            drop(unsafe { Box::from_raw(user_data) });
        }
        res
    }

    fn set_user_event_status(&self, ev: RawHandle, status: i32) -> DriverResult<()> {
        // SAFETY: live user event.
        unsafe { event::set_user_event_status(raw(ev), status) }
    }

    fn flush(&self, q: RawHandle) -> DriverResult<()> {
        // SAFETY: live queue.
        unsafe { command_queue::flush(raw(q)) }
    }

    fn finish(&self, q: RawHandle) -> DriverResult<()> {
        // SAFETY: live queue.
        unsafe { command_queue::finish(raw(q)) }
    }
}
