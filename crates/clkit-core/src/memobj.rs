use std::{ffi::c_void, sync::Arc};

use crate::{
    buffer::Buffer,
    context::Context,
    driver::Driver,
    error::{Result, cl_try},
    event::{Event, EventWaitList, consume, wait_handles},
    image::Image,
    queue::Queue,
    types::*,
};

/// State shared by buffers and images: the context they live in, and for
/// sub-buffers the parent and the origin inside it.
pub(crate) struct MemState {
    pub(crate) context: Context,
    pub(crate) parent: Option<(Buffer, usize)>,
}

/// Either kind of memory object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemObject {
    Buffer(Buffer),
    Image(Image),
}

impl MemObject {
    pub fn handle(&self) -> RawHandle {
        match self {
            MemObject::Buffer(b) => b.handle(),
            MemObject::Image(i) => i.handle(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        match self {
            MemObject::Buffer(b) => b.driver(),
            MemObject::Image(i) => i.driver(),
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            MemObject::Buffer(b) => &b.state().context,
            MemObject::Image(i) => &i.state().context,
        }
    }

    pub fn size(&self) -> Result<usize> {
        match self {
            MemObject::Buffer(b) => b.size(),
            MemObject::Image(i) => i.size(),
        }
    }

    /// Unmaps a region returned by a map call.
    pub fn enqueue_unmap(&self, queue: &Queue, mapped: Mapped, wait: Option<&mut EventWaitList>) -> Result<Event> {
        let h = cl_try!(
            self.driver().enqueue_unmap(queue.handle(), self.handle(), mapped.ptr, &wait_handles(&wait)),
            "unable to unmap memory object {:#x}",
            self.handle().0
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }

    /// Migrates `mems` to the device of `queue` (OpenCL 1.2).
    pub fn enqueue_migrate(queue: &Queue, mems: &[MemObject], flags: u64, wait: Option<&mut EventWaitList>) -> Result<Event> {
        queue.context()?.platform()?.require_version(120, "memory object migration")?;
        let handles: Vec<RawHandle> = mems.iter().map(MemObject::handle).collect();
        let h = cl_try!(
            queue.driver().enqueue_migrate_mem_objects(queue.handle(), &handles, flags, &wait_handles(&wait)),
            "unable to migrate {} memory object(s)",
            handles.len()
        );
        consume(wait);
        Ok(queue.produce_event(h))
    }
}

impl From<Buffer> for MemObject {
    fn from(b: Buffer) -> Self {
        MemObject::Buffer(b)
    }
}

impl From<Image> for MemObject {
    fn from(i: Image) -> Self {
        MemObject::Image(i)
    }
}

/// Host view of a mapped region. Dereferencing it is up to the caller;
/// it stays valid until passed to [`MemObject::enqueue_unmap`].
#[derive(Debug)]
pub struct Mapped {
    pub(crate) ptr: *mut c_void,
    pub size: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl Mapped {
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// # Safety
    /// The map must have completed and cover `len * size_of::<T>()` bytes
    /// suitably aligned for `T`, and nothing else may access the region
    /// while the slice lives.
    pub unsafe fn as_mut_slice<T: bytemuck::Pod>(&mut self, len: usize) -> &mut [T] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.cast::<T>(), len) }
    }
}
