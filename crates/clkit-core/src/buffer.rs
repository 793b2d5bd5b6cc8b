use std::mem::size_of_val;

use bytemuck::Pod;

use crate::{
    context::Context,
    driver::{Rect, RectSide, Triple},
    error::{ClError, Result, cl_try},
    event::{Event, EventWaitList, consume, wait_handles},
    image::Image,
    memobj::{Mapped, MemState},
    queue::Queue,
    types::*,
    wrapper::{adopt, cl_wrapper},
};

cl_wrapper!(
    /// A linear device buffer.
    Buffer, MemState, ObjectKind::Buffer, InfoClass::MemObject
);

fn check_range(what: &str, offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ClError::InvalidArgument(format!("{what}: range {offset}+{len} exceeds buffer of {size} bytes"))),
    }
}

/// Checks that the box of `side` fits in `size` bytes.
fn check_box(what: &str, side: &RectSide, region: Triple, size: usize) -> Result<()> {
    match side.extent(region) {
        Some(end) if end <= size => Ok(()),
        Some(end) => Err(ClError::InvalidArgument(format!("{what}: box ends at byte {end} of {size}"))),
        None => Err(ClError::InvalidArgument(format!("{what}: empty region {region:?} or pitch narrower than the box"))),
    }
}

impl Buffer {
    /// Creates a buffer of `size` bytes. `host` is copied in when the
    /// flags ask for `CL_MEM_COPY_HOST_PTR`.
    pub fn new(ctx: &Context, flags: MemFlags, size: usize, host: Option<&[u8]>) -> Result<Buffer> {
        if size == 0 {
            return Err(ClError::InvalidArgument("buffer size must be non-zero".into()));
        }
        if let Some(h) = host {
            if h.len() < size {
                return Err(ClError::InvalidArgument(format!("host data of {} bytes for buffer of {size}", h.len())));
            }
        }
        let h = cl_try!(ctx.driver().create_buffer(ctx.handle(), flags, size, host), "unable to create buffer of {size} bytes");
        let context = ctx.clone();
        Ok(Buffer(adopt(ctx.driver(), ObjectKind::Buffer, h, || MemState { context, parent: None })))
    }

    /// Buffer over `size` bytes of this one starting at `origin`
    /// (OpenCL 1.1). Zero `flags` inherit the parent's. The parent lives
    /// at least as long as the sub-buffer.
    pub fn sub_buffer(&self, flags: MemFlags, origin: usize, size: usize) -> Result<Buffer> {
        self.context().platform()?.require_version(110, "sub-buffers")?;
        if self.parent().is_some() {
            return Err(ClError::InvalidArgument("sub-buffers cannot be nested".into()));
        }
        if size == 0 {
            return Err(ClError::InvalidArgument("sub-buffer size must be non-zero".into()));
        }
        check_range("sub-buffer", origin, size, self.size()?)?;
        let h = cl_try!(
            self.driver().create_sub_buffer(self.handle(), flags, origin, size),
            "unable to create sub-buffer of {size} bytes at {origin} in buffer {:#x}",
            self.handle().0
        );
        let context = self.context().clone();
        let parent = Some((self.clone(), origin));
        Ok(Buffer(adopt(self.driver(), ObjectKind::Buffer, h, || MemState { context, parent })))
    }

    /// Buffer this one is a sub-buffer of.
    pub fn parent(&self) -> Option<&Buffer> {
        self.state().parent.as_ref().map(|(b, _)| b)
    }

    /// Byte offset inside the parent; 0 for buffers that are not
    /// sub-buffers.
    pub fn origin(&self) -> usize {
        self.state().parent.as_ref().map_or(0, |&(_, origin)| origin)
    }

    /// Buffer initialised from `data`.
    pub fn from_slice<T: Pod>(ctx: &Context, flags: MemFlags, data: &[T]) -> Result<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        Buffer::new(ctx, flags | CL_MEM_COPY_HOST_PTR, bytes.len(), Some(bytes))
    }

    pub fn context(&self) -> &Context {
        &self.state().context
    }

    pub fn size(&self) -> Result<usize> {
        self.info(CL_MEM_SIZE)?.scalar()
    }

    pub fn flags(&self) -> Result<MemFlags> {
        self.info(CL_MEM_FLAGS)?.scalar()
    }

    /// Blocking read of `dst.len()` elements starting at byte `offset`.
    pub fn enqueue_read<T: Pod>(
        &self,
        queue: &Queue,
        offset: usize,
        dst: &mut [T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let len = size_of_val(dst);
        check_range("read", offset, len, self.size()?)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        // SAFETY: the read is blocking, so `bytes` outlives the transfer.
        unsafe { self.read_raw(queue, true, offset, bytes, wait) }
    }

    /// Non-blocking read.
    ///
    /// # Safety
    /// `dst` must neither be touched nor dropped until the returned event
    /// has completed.
    pub unsafe fn enqueue_read_async<T: Pod>(
        &self,
        queue: &Queue,
        offset: usize,
        dst: &mut [T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let len = size_of_val(dst);
        check_range("read", offset, len, self.size()?)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        // SAFETY: forwarded to the caller.
        unsafe { self.read_raw(queue, false, offset, bytes, wait) }
    }

    unsafe fn read_raw(
        &self,
        queue: &Queue,
        blocking: bool,
        offset: usize,
        dst: &mut [u8],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        // SAFETY: `dst` is valid for its length; lifetime per caller.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_read_buffer(
                    queue.handle(),
                    self.handle(),
                    blocking,
                    offset,
                    dst.len(),
                    dst.as_mut_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to read {} bytes from buffer {:#x}",
            dst.len(),
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Blocking write of `src` starting at byte `offset`.
    pub fn enqueue_write<T: Pod>(
        &self,
        queue: &Queue,
        offset: usize,
        src: &[T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let bytes: &[u8] = bytemuck::cast_slice(src);
        check_range("write", offset, bytes.len(), self.size()?)?;
        // SAFETY: the write is blocking, so `bytes` outlives the transfer.
        unsafe { self.write_raw(queue, true, offset, bytes, wait) }
    }

    /// Non-blocking write.
    ///
    /// # Safety
    /// `src` must stay alive and unmodified until the returned event has
    /// completed.
    pub unsafe fn enqueue_write_async<T: Pod>(
        &self,
        queue: &Queue,
        offset: usize,
        src: &[T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let bytes: &[u8] = bytemuck::cast_slice(src);
        check_range("write", offset, bytes.len(), self.size()?)?;
        // SAFETY: forwarded to the caller.
        unsafe { self.write_raw(queue, false, offset, bytes, wait) }
    }

    unsafe fn write_raw(
        &self,
        queue: &Queue,
        blocking: bool,
        offset: usize,
        src: &[u8],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        // SAFETY: `src` is valid for its length; lifetime per caller.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_write_buffer(
                    queue.handle(),
                    self.handle(),
                    blocking,
                    offset,
                    src.len(),
                    src.as_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to write {} bytes to buffer {:#x}",
            src.len(),
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn enqueue_copy(
        &self,
        queue: &Queue,
        dst: &Buffer,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let h = cl_try!(
            self.driver().enqueue_copy_buffer(
                queue.handle(),
                self.handle(),
                dst.handle(),
                src_offset,
                dst_offset,
                size,
                &wait_handles(&wait),
            ),
            "unable to copy {size} bytes between buffers"
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Fills `size` bytes from `offset` with `pattern` (OpenCL 1.2).
    pub fn enqueue_fill<T: Pod>(
        &self,
        queue: &Queue,
        pattern: &T,
        offset: usize,
        size: usize,
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        self.context().platform()?.require_version(120, "buffer fill")?;
        let h = cl_try!(
            self.driver().enqueue_fill_buffer(
                queue.handle(),
                self.handle(),
                bytemuck::bytes_of(pattern),
                offset,
                size,
                &wait_handles(&wait),
            ),
            "unable to fill buffer {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Maps `size` bytes at `offset` into host memory.
    pub fn enqueue_map(
        &self,
        queue: &Queue,
        blocking: bool,
        flags: MapFlags,
        offset: usize,
        size: usize,
        wait: Option<&mut EventWaitList>,
    ) -> Result<(Event, Mapped)> {
        let (h, ptr) = cl_try!(
            self.driver().enqueue_map_buffer(
                queue.handle(),
                self.handle(),
                blocking,
                flags,
                offset,
                size,
                &wait_handles(&wait),
            ),
            "unable to map buffer {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok((queue.produce_event(h), Mapped { ptr, size, row_pitch: 0, slice_pitch: 0 }))
    }

    /// Blocking read of a box of the buffer into `dst` (OpenCL 1.1).
    /// `rect.src` lays out the buffer side, `rect.dst` the host side.
    pub fn enqueue_read_rect<T: Pod>(
        &self,
        queue: &Queue,
        rect: &Rect,
        dst: &mut [T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        self.context().platform()?.require_version(110, "rectangular buffer read")?;
        check_box("read rect buffer side", &rect.src, rect.region, self.size()?)?;
        check_box("read rect host side", &rect.dst, rect.region, size_of_val(dst))?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        // SAFETY: blocking read into a host buffer checked to hold the box.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_read_buffer_rect(
                    queue.handle(),
                    self.handle(),
                    true,
                    rect,
                    bytes.as_mut_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to read {:?} box from buffer {:#x}",
            rect.region,
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Blocking write of a box of `src` into the buffer (OpenCL 1.1).
    /// `rect.src` lays out the host side, `rect.dst` the buffer side.
    pub fn enqueue_write_rect<T: Pod>(
        &self,
        queue: &Queue,
        rect: &Rect,
        src: &[T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        self.context().platform()?.require_version(110, "rectangular buffer write")?;
        let bytes: &[u8] = bytemuck::cast_slice(src);
        check_box("write rect host side", &rect.src, rect.region, bytes.len())?;
        check_box("write rect buffer side", &rect.dst, rect.region, self.size()?)?;
        // SAFETY: blocking write from a host buffer checked to hold the box.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_write_buffer_rect(
                    queue.handle(),
                    self.handle(),
                    true,
                    rect,
                    bytes.as_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to write {:?} box to buffer {:#x}",
            rect.region,
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Copies a box of this buffer into `dst` (OpenCL 1.1).
    pub fn enqueue_copy_rect(
        &self,
        queue: &Queue,
        dst: &Buffer,
        rect: &Rect,
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        self.context().platform()?.require_version(110, "rectangular buffer copy")?;
        check_box("copy rect source", &rect.src, rect.region, self.size()?)?;
        check_box("copy rect destination", &rect.dst, rect.region, dst.size()?)?;
        let h = cl_try!(
            self.driver().enqueue_copy_buffer_rect(queue.handle(), self.handle(), dst.handle(), rect, &wait_handles(&wait)),
            "unable to copy {:?} box between buffers",
            rect.region
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn enqueue_copy_to_image(
        &self,
        queue: &Queue,
        dst: &Image,
        src_offset: usize,
        dst_origin: [usize; 3],
        region: [usize; 3],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let h = cl_try!(
            self.driver().enqueue_copy_buffer_to_image(
                queue.handle(),
                self.handle(),
                dst.handle(),
                src_offset,
                dst_origin,
                region,
                &wait_handles(&wait),
            ),
            "unable to copy buffer {:#x} to image",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.context().opencl_version()
    }
}
