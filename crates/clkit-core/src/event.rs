use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    context::Context,
    driver::Driver,
    error::{ClError, Result, cl_try},
    queue::Queue,
    types::*,
    wrapper::{adopt, cl_wrapper},
};

#[derive(Default)]
pub(crate) struct EventState {
    name: Mutex<Option<String>>,
}

cl_wrapper!(
    /// A driver event. Events produced by enqueues are owned by their queue.
    Event, EventState, ObjectKind::Event, InfoClass::Event
);

impl Event {
    pub(crate) fn adopt(driver: &Arc<dyn Driver>, handle: RawHandle) -> Event {
        Event(adopt(driver, ObjectKind::Event, handle, EventState::default))
    }

    /// User event in `ctx`, initially `CL_SUBMITTED`.
    pub fn new_user(ctx: &Context) -> Result<Event> {
        let h = cl_try!(ctx.driver().create_user_event(ctx.handle()), "unable to create user event");
        Ok(Event::adopt(ctx.driver(), h))
    }

    /// Completes (`CL_COMPLETE`) or aborts (negative status) a user event.
    pub fn set_user_status(&self, status: i32) -> Result<()> {
        cl_try!(
            self.driver().set_user_event_status(self.handle(), status),
            "unable to set status of user event {:#x}",
            self.handle().0
        );
        Ok(())
    }

    /// Name used by the profiler instead of the command type.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.state().name.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    pub fn name(&self) -> Option<String> {
        self.state().name.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The user-assigned name, or the canonical command-type name.
    pub fn final_name(&self) -> Result<String> {
        if let Some(n) = self.name() {
            return Ok(n);
        }
        let ct = self.command_type()?;
        Ok(command_type_name(ct).map(str::to_owned).unwrap_or_else(|| format!("UNKNOWN_{ct:#06x}")))
    }

    pub fn command_type(&self) -> Result<u32> {
        self.info(CL_EVENT_COMMAND_TYPE)?.scalar()
    }

    /// Current execution status; never cached.
    pub fn execution_status(&self) -> Result<i32> {
        self.info_fresh(CL_EVENT_COMMAND_EXECUTION_STATUS)?.scalar()
    }

    /// One of the `CL_PROFILING_COMMAND_*` timestamps, in device ticks.
    pub fn profiling_info(&self, param: u32) -> Result<u64> {
        self.core().query(InfoClass::EventProfiling, None, param, true)?.scalar()
    }

    pub fn context(&self) -> Result<Context> {
        let h: RawHandle = self.info(CL_EVENT_CONTEXT)?.scalar()?;
        Context::wrap(self.driver(), h)
    }

    /// Queue the command was submitted to. User events have none.
    pub fn queue(&self) -> Result<Option<Queue>> {
        let h: RawHandle = self.info(CL_EVENT_COMMAND_QUEUE)?.scalar()?;
        if h.is_null() {
            return Ok(None);
        }
        Queue::wrap(self.driver(), h).map(Some)
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.context()?.opencl_version()
    }

    /// Blocks until this event completes.
    pub fn wait(&self) -> Result<()> {
        cl_try!(self.driver().wait_for_events(&[self.handle()]), "unable to wait for event {:#x}", self.handle().0);
        Ok(())
    }

    /// Registers `f` to run once the event reaches `exec_type`
    /// (`CL_COMPLETE`, `CL_RUNNING` or `CL_SUBMITTED`).
    pub fn set_callback<F>(&self, exec_type: i32, f: F) -> Result<()>
    where
        F: FnOnce(RawHandle, Status) + Send + 'static,
    {
        if !(CL_COMPLETE..=CL_SUBMITTED).contains(&exec_type) {
            return Err(ClError::InvalidArgument(format!("invalid callback execution type {exec_type}")));
        }
        cl_try!(
            self.driver().set_event_callback(self.handle(), exec_type, Box::new(f)),
            "unable to set callback on event {:#x}",
            self.handle().0
        );
        Ok(())
    }
}

/// Canonical name of a command type, as reported by `CL_EVENT_COMMAND_TYPE`.
pub fn command_type_name(command_type: u32) -> Option<&'static str> {
    Some(match command_type {
        CL_COMMAND_NDRANGE_KERNEL => "NDRANGE_KERNEL",
        CL_COMMAND_TASK => "TASK",
        CL_COMMAND_NATIVE_KERNEL => "NATIVE_KERNEL",
        CL_COMMAND_READ_BUFFER => "READ_BUFFER",
        CL_COMMAND_WRITE_BUFFER => "WRITE_BUFFER",
        CL_COMMAND_COPY_BUFFER => "COPY_BUFFER",
        CL_COMMAND_READ_IMAGE => "READ_IMAGE",
        CL_COMMAND_WRITE_IMAGE => "WRITE_IMAGE",
        CL_COMMAND_COPY_IMAGE => "COPY_IMAGE",
        CL_COMMAND_COPY_IMAGE_TO_BUFFER => "COPY_IMAGE_TO_BUFFER",
        CL_COMMAND_COPY_BUFFER_TO_IMAGE => "COPY_BUFFER_TO_IMAGE",
        CL_COMMAND_MAP_BUFFER => "MAP_BUFFER",
        CL_COMMAND_MAP_IMAGE => "MAP_IMAGE",
        CL_COMMAND_UNMAP_MEM_OBJECT => "UNMAP_MEM_OBJECT",
        CL_COMMAND_MARKER => "MARKER",
        CL_COMMAND_ACQUIRE_GL_OBJECTS => "ACQUIRE_GL_OBJECTS",
        CL_COMMAND_RELEASE_GL_OBJECTS => "RELEASE_GL_OBJECTS",
        CL_COMMAND_READ_BUFFER_RECT => "READ_BUFFER_RECT",
        CL_COMMAND_WRITE_BUFFER_RECT => "WRITE_BUFFER_RECT",
        CL_COMMAND_COPY_BUFFER_RECT => "COPY_BUFFER_RECT",
        CL_COMMAND_USER => "USER",
        CL_COMMAND_BARRIER => "BARRIER",
        CL_COMMAND_MIGRATE_MEM_OBJECTS => "MIGRATE_MEM_OBJECTS",
        CL_COMMAND_FILL_BUFFER => "FILL_BUFFER",
        CL_COMMAND_FILL_IMAGE => "FILL_IMAGE",
        CL_COMMAND_SVM_FREE => "SVM_FREE",
        CL_COMMAND_SVM_MEMCPY => "SVM_MEMCPY",
        CL_COMMAND_SVM_MEMFILL => "SVM_MEMFILL",
        CL_COMMAND_SVM_MAP => "SVM_MAP",
        CL_COMMAND_SVM_UNMAP => "SVM_UNMAP",
        CL_COMMAND_GL_FENCE_SYNC_OBJECT_KHR => "GL_FENCE_SYNC_OBJECT_KHR",
        CL_COMMAND_ACQUIRE_D3D10_OBJECTS_KHR => "ACQUIRE_D3D10_OBJECTS_KHR",
        CL_COMMAND_RELEASE_D3D10_OBJECTS_KHR => "RELEASE_D3D10_OBJECTS_KHR",
        CL_COMMAND_ACQUIRE_DX9_MEDIA_SURFACES_KHR => "ACQUIRE_DX9_MEDIA_SURFACES_KHR",
        CL_COMMAND_RELEASE_DX9_MEDIA_SURFACES_KHR => "RELEASE_DX9_MEDIA_SURFACES_KHR",
        CL_COMMAND_ACQUIRE_D3D11_OBJECTS_KHR => "ACQUIRE_D3D11_OBJECTS_KHR",
        CL_COMMAND_RELEASE_D3D11_OBJECTS_KHR => "RELEASE_D3D11_OBJECTS_KHR",
        CL_COMMAND_ACQUIRE_EGL_OBJECTS_KHR => "ACQUIRE_EGL_OBJECTS_KHR",
        CL_COMMAND_RELEASE_EGL_OBJECTS_KHR => "RELEASE_EGL_OBJECTS_KHR",
        CL_COMMAND_EGL_FENCE_SYNC_OBJECT_KHR => "EGL_FENCE_SYNC_OBJECT_KHR",
        _ => return None,
    })
}

/* ───────────── wait lists ──────────────────────────────── */

/// Ordered events an enqueue must wait on. Enqueues clear the list once
/// the command has been submitted.
#[derive(Clone, Debug, Default)]
pub struct EventWaitList(Vec<Event>);

impl EventWaitList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: &Event) -> &mut Self {
        self.0.push(event.clone());
        self
    }

    pub fn extend<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> &mut Self {
        self.0.extend(events.into_iter().cloned());
        self
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn handles(&self) -> Vec<RawHandle> {
        self.0.iter().map(Event::handle).collect()
    }

    /// Host-side wait on every listed event, then clears the list.
    /// An empty list returns immediately.
    pub fn wait(&mut self) -> Result<()> {
        let Some(first) = self.0.first() else {
            return Ok(());
        };
        let driver = Arc::clone(first.driver());
        cl_try!(driver.wait_for_events(&self.handles()), "unable to wait for {} event(s)", self.0.len());
        self.clear();
        Ok(())
    }
}

/// Handles of an optional wait list.
pub(crate) fn wait_handles(wait: &Option<&mut EventWaitList>) -> Vec<RawHandle> {
    wait.as_ref().map(|w| w.handles()).unwrap_or_default()
}

/// Clears an optional wait list after a successful submission.
pub(crate) fn consume(wait: Option<&mut EventWaitList>) {
    if let Some(w) = wait {
        w.clear();
    }
}

/// Builds an [`EventWaitList`] from event references.
#[macro_export]
macro_rules! wait_list {
    ($($ev:expr),* $(,)?) => {{
        let mut list = $crate::event::EventWaitList::new();
        $( list.add($ev); )*
        list
    }};
}
