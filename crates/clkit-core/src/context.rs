use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
    device::Device,
    driver::Driver,
    error::{ClError, Result, cl_try},
    platform::Platform,
    selector::{DeviceSelector, filters},
    types::*,
    wrapper::{adopt, cl_wrapper, wrap_borrowed},
};

#[derive(Default)]
pub(crate) struct ContextState {
    devices: OnceCell<Vec<Device>>,
    platform: OnceCell<Platform>,
}

cl_wrapper!(
    /// A context over one or more devices of a single platform.
    Context, ContextState, ObjectKind::Context, InfoClass::Context
);

impl Context {
    pub(crate) fn wrap(driver: &Arc<dyn Driver>, handle: RawHandle) -> Result<Context> {
        wrap_borrowed(driver, ObjectKind::Context, handle, ContextState::default).map(Context)
    }

    /// Creates a context holding exactly `devices`.
    pub fn from_devices(devices: &[Device]) -> Result<Context> {
        let first = devices
            .first()
            .ok_or_else(|| ClError::InvalidArgument("context needs at least one device".into()))?;
        let driver = Arc::clone(first.driver());
        let handles: Vec<RawHandle> = devices.iter().map(Device::handle).collect();
        let h = cl_try!(driver.create_context(&handles), "unable to create context over {} device(s)", handles.len());
        let list = devices.to_vec();
        Ok(Context(adopt(&driver, ObjectKind::Context, h, move || ContextState {
            devices: OnceCell::with_value(list),
            platform: OnceCell::new(),
        })))
    }

    /// Runs `selector` and creates a context with the surviving devices.
    pub fn from_selector(driver: &Arc<dyn Driver>, selector: &DeviceSelector) -> Result<Context> {
        let devices = selector.select(driver)?;
        if devices.is_empty() {
            return Err(ClError::NotFound("no device survived the selection filters".into()));
        }
        Context::from_devices(&devices)
    }

    fn from_type(driver: &Arc<dyn Driver>, mask: DeviceType) -> Result<Context> {
        let mut sel = DeviceSelector::new();
        sel.filter(filters::type_mask(mask)).filter(filters::same_platform());
        Context::from_selector(driver, &sel)
    }

    /// Context over the GPUs of the first platform that has one.
    pub fn new_gpu(driver: &Arc<dyn Driver>) -> Result<Context> {
        Context::from_type(driver, CL_DEVICE_TYPE_GPU)
    }

    pub fn new_cpu(driver: &Arc<dyn Driver>) -> Result<Context> {
        Context::from_type(driver, CL_DEVICE_TYPE_CPU)
    }

    pub fn new_accel(driver: &Arc<dyn Driver>) -> Result<Context> {
        Context::from_type(driver, CL_DEVICE_TYPE_ACCELERATOR)
    }

    pub fn new_any(driver: &Arc<dyn Driver>) -> Result<Context> {
        Context::from_type(driver, CL_DEVICE_TYPE_ALL)
    }

    pub fn devices(&self) -> Result<&[Device]> {
        self.state()
            .devices
            .get_or_try_init(|| {
                self.info(CL_CONTEXT_DEVICES)?
                    .array::<RawHandle>()
                    .into_iter()
                    .map(|h| Device::wrap(self.driver(), h))
                    .collect()
            })
            .map(Vec::as_slice)
    }

    pub fn num_devices(&self) -> Result<usize> {
        Ok(self.devices()?.len())
    }

    pub fn device(&self, index: usize) -> Result<Device> {
        let devs = self.devices()?;
        devs.get(index)
            .cloned()
            .ok_or_else(|| ClError::InvalidArgument(format!("device index {index} out of range ({} devices)", devs.len())))
    }

    pub fn platform(&self) -> Result<Platform> {
        self.state()
            .platform
            .get_or_try_init(|| self.device(0)?.platform())
            .cloned()
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.platform()?.opencl_version()
    }
}
