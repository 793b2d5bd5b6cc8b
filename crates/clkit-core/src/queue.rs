use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;

use crate::{
    context::Context,
    device::Device,
    driver::Driver,
    error::{Result, cl_try},
    event::{Event, EventWaitList, consume, wait_handles},
    types::*,
    wrapper::{adopt, cl_wrapper, wrap_borrowed},
};

#[derive(Default)]
pub(crate) struct QueueState {
    context: OnceCell<Context>,
    device: OnceCell<Device>,
    events: Mutex<Vec<Event>>,
}

cl_wrapper!(
    /// A command queue. Keeps every event produced on it until `gc` or
    /// until the queue itself goes away.
    Queue, QueueState, ObjectKind::Queue, InfoClass::Queue
);

impl Queue {
    /// Creates a queue on `device`, or on the first device of `ctx`.
    pub fn new(ctx: &Context, device: Option<&Device>, properties: QueueProperties) -> Result<Queue> {
        let device = match device {
            Some(d) => d.clone(),
            None => ctx.device(0)?,
        };
        let h = cl_try!(
            ctx.driver().create_command_queue(ctx.handle(), device.handle(), properties),
            "unable to create command queue"
        );
        let driver = Arc::clone(ctx.driver());
        let ctx = ctx.clone();
        Ok(Queue(adopt(&driver, ObjectKind::Queue, h, move || QueueState {
            context: OnceCell::with_value(ctx),
            device: OnceCell::with_value(device),
            events: Mutex::new(Vec::new()),
        })))
    }

    pub(crate) fn wrap(driver: &Arc<dyn Driver>, handle: RawHandle) -> Result<Queue> {
        wrap_borrowed(driver, ObjectKind::Queue, handle, QueueState::default).map(Queue)
    }

    pub fn context(&self) -> Result<Context> {
        self.state()
            .context
            .get_or_try_init(|| {
                let h: RawHandle = self.info(CL_QUEUE_CONTEXT)?.scalar()?;
                Context::wrap(self.driver(), h)
            })
            .cloned()
    }

    pub fn device(&self) -> Result<Device> {
        self.state()
            .device
            .get_or_try_init(|| {
                let h: RawHandle = self.info(CL_QUEUE_DEVICE)?.scalar()?;
                Device::wrap(self.driver(), h)
            })
            .cloned()
    }

    pub fn properties(&self) -> Result<QueueProperties> {
        self.info(CL_QUEUE_PROPERTIES)?.scalar()
    }

    fn event_list(&self) -> MutexGuard<'_, Vec<Event>> {
        self.state().events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wraps an event the driver just returned and files it on this queue.
    pub(crate) fn produce_event(&self, handle: RawHandle) -> Event {
        let ev = Event::adopt(self.driver(), handle);
        self.event_list().push(ev.clone());
        ev
    }

    /// Events produced on this queue, in submission order.
    pub fn events(&self) -> Vec<Event> {
        self.event_list().clone()
    }

    pub fn num_events(&self) -> usize {
        self.event_list().len()
    }

    /// Drops the queue's references to its events.
    pub fn gc(&self) {
        let drained = std::mem::take(&mut *self.event_list());
        log::debug!("queue {:#x}: released {} event(s)", self.handle().0, drained.len());
    }

    pub fn flush(&self) -> Result<()> {
        cl_try!(self.driver().flush(self.handle()), "unable to flush queue {:#x}", self.handle().0);
        Ok(())
    }

    /// Blocks until every command on the queue has completed.
    pub fn finish(&self) -> Result<()> {
        cl_try!(self.driver().finish(self.handle()), "unable to finish queue {:#x}", self.handle().0);
        Ok(())
    }

    pub fn enqueue_marker(&self, wait: Option<&mut EventWaitList>) -> Result<Event> {
        let h = cl_try!(self.driver().enqueue_marker(self.handle(), &wait_handles(&wait)), "unable to enqueue marker");
        consume(wait);
        Ok(self.produce_event(h))
    }

    pub fn enqueue_barrier(&self, wait: Option<&mut EventWaitList>) -> Result<Event> {
        let h = cl_try!(self.driver().enqueue_barrier(self.handle(), &wait_handles(&wait)), "unable to enqueue barrier");
        consume(wait);
        Ok(self.produce_event(h))
    }
}
