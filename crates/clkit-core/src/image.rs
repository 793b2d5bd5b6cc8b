use std::mem::size_of_val;

use bytemuck::Pod;

use crate::{
    buffer::Buffer,
    context::Context,
    driver::ImageRegion,
    error::{ClError, Result, cl_try},
    event::{Event, EventWaitList, consume, wait_handles},
    memobj::{Mapped, MemState},
    queue::Queue,
    types::*,
    wrapper::{adopt, cl_wrapper},
};

cl_wrapper!(
    /// A 1D, 2D or 3D image.
    Image, MemState, ObjectKind::Image, InfoClass::MemObject
);

/// Bytes of host memory a region spans with the given pitches
/// (zero pitches mean tightly packed).
fn host_extent(elem: usize, region: [usize; 3], row_pitch: usize, slice_pitch: usize) -> usize {
    let row = if row_pitch == 0 { region[0] * elem } else { row_pitch };
    let slice = if slice_pitch == 0 { row * region[1].max(1) } else { slice_pitch };
    let rows = region[1].max(1);
    let slices = region[2].max(1);
    (slices - 1) * slice + (rows - 1) * row + region[0] * elem
}

impl Image {
    pub fn new(
        ctx: &Context,
        flags: MemFlags,
        format: &ImageFormat,
        desc: &ImageDesc,
        host: Option<&[u8]>,
    ) -> Result<Image> {
        if desc.width == 0 {
            return Err(ClError::InvalidArgument("image width must be non-zero".into()));
        }
        let h = cl_try!(
            ctx.driver().create_image(ctx.handle(), flags, format, desc, host),
            "unable to create {}x{}x{} image",
            desc.width,
            desc.height,
            desc.depth
        );
        let context = ctx.clone();
        Ok(Image(adopt(ctx.driver(), ObjectKind::Image, h, || MemState { context, parent: None })))
    }

    pub fn context(&self) -> &Context {
        &self.state().context
    }

    fn image_info(&self, param: u32) -> Result<usize> {
        self.core().query(InfoClass::Image, None, param, true)?.scalar()
    }

    pub fn format(&self) -> Result<ImageFormat> {
        self.core().query(InfoClass::Image, None, CL_IMAGE_FORMAT, true)?.scalar()
    }

    pub fn element_size(&self) -> Result<usize> {
        self.image_info(CL_IMAGE_ELEMENT_SIZE)
    }

    pub fn width(&self) -> Result<usize> {
        self.image_info(CL_IMAGE_WIDTH)
    }

    pub fn height(&self) -> Result<usize> {
        self.image_info(CL_IMAGE_HEIGHT)
    }

    pub fn depth(&self) -> Result<usize> {
        self.image_info(CL_IMAGE_DEPTH)
    }

    pub fn size(&self) -> Result<usize> {
        self.info(CL_MEM_SIZE)?.scalar()
    }

    /// Blocking read of `area` into `dst`, laid out with the pitches of
    /// `area`.
    pub fn enqueue_read<T: Pod>(
        &self,
        queue: &Queue,
        area: &ImageRegion,
        dst: &mut [T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let need = host_extent(self.element_size()?, area.region, area.row_pitch, area.slice_pitch);
        if size_of_val(dst) < need {
            return Err(ClError::InvalidArgument(format!("host buffer of {} bytes, region needs {need}", size_of_val(dst))));
        }
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        // SAFETY: blocking read into a buffer checked to cover the region.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_read_image(
                    queue.handle(),
                    self.handle(),
                    true,
                    area,
                    bytes.as_mut_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to read image {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Blocking write of `src`, laid out with the pitches of `area`, into
    /// the image.
    pub fn enqueue_write<T: Pod>(
        &self,
        queue: &Queue,
        area: &ImageRegion,
        src: &[T],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let need = host_extent(self.element_size()?, area.region, area.row_pitch, area.slice_pitch);
        let bytes: &[u8] = bytemuck::cast_slice(src);
        if bytes.len() < need {
            return Err(ClError::InvalidArgument(format!("host data of {} bytes, region needs {need}", bytes.len())));
        }
        // SAFETY: blocking write from a buffer checked to cover the region.
        let h = cl_try!(
            unsafe {
                self.driver().enqueue_write_image(
                    queue.handle(),
                    self.handle(),
                    true,
                    area,
                    bytes.as_ptr(),
                    &wait_handles(&wait),
                )
            },
            "unable to write image {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn enqueue_copy(
        &self,
        queue: &Queue,
        dst: &Image,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let h = cl_try!(
            self.driver().enqueue_copy_image(
                queue.handle(),
                self.handle(),
                dst.handle(),
                src_origin,
                dst_origin,
                region,
                &wait_handles(&wait),
            ),
            "unable to copy image {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Fills a region with a four-component colour of 32-bit lanes
    /// (`f32`, `i32` or `u32` depending on the channel type). OpenCL 1.2.
    pub fn enqueue_fill<T: Pod>(
        &self,
        queue: &Queue,
        color: &[T; 4],
        origin: [usize; 3],
        region: [usize; 3],
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        self.context().platform()?.require_version(120, "image fill")?;
        let lanes: &[u8] = bytemuck::cast_slice(color.as_slice());
        let fill: [u8; 16] = lanes
            .try_into()
            .map_err(|_| ClError::InvalidArgument("fill colour lanes must be 32 bits wide".into()))?;
        let h = cl_try!(
            self.driver().enqueue_fill_image(queue.handle(), self.handle(), &fill, origin, region, &wait_handles(&wait)),
            "unable to fill image {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn enqueue_map(
        &self,
        queue: &Queue,
        blocking: bool,
        flags: MapFlags,
        origin: [usize; 3],
        region: [usize; 3],
        wait: Option<&mut EventWaitList>,
    ) -> Result<(Event, Mapped)> {
        let elem = self.element_size()?;
        let (h, ptr, row_pitch, slice_pitch) = cl_try!(
            self.driver().enqueue_map_image(
                queue.handle(),
                self.handle(),
                blocking,
                flags,
                &ImageRegion::new(origin, region),
                &wait_handles(&wait),
            ),
            "unable to map image {:#x}",
            self.handle().0
        );
        consume(wait);
        let size = host_extent(elem, region, row_pitch, slice_pitch);
        Ok((queue.produce_event(h), Mapped { ptr, size, row_pitch, slice_pitch }))
    }

    pub fn enqueue_copy_to_buffer(
        &self,
        queue: &Queue,
        dst: &Buffer,
        src_origin: [usize; 3],
        region: [usize; 3],
        dst_offset: usize,
        wait: Option<&mut EventWaitList>,
    ) -> Result<Event> {
        let h = cl_try!(
            self.driver().enqueue_copy_image_to_buffer(
                queue.handle(),
                self.handle(),
                dst.handle(),
                src_origin,
                region,
                dst_offset,
                &wait_handles(&wait),
            ),
            "unable to copy image {:#x} to buffer",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.context().opencl_version()
    }
}

#[cfg(test)]
mod tests {
    use super::host_extent;

    #[test]
    fn host_extent_packed_and_pitched() {
        assert_eq!(host_extent(4, [8, 2, 1], 0, 0), 64);
        assert_eq!(host_extent(4, [8, 2, 1], 40, 0), 40 + 32);
        assert_eq!(host_extent(1, [4, 4, 2], 0, 0), 32);
    }
}
