use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
    driver::Driver,
    error::Result,
    platform::Platform,
    types::*,
    wrapper::{cl_wrapper, wrap_borrowed},
};

#[derive(Default)]
pub(crate) struct DeviceState {
    platform: OnceCell<Platform>,
}

cl_wrapper!(
    /// A root compute device.
    Device, DeviceState, ObjectKind::Device, InfoClass::Device
);

impl Device {
    pub(crate) fn wrap(driver: &Arc<dyn Driver>, handle: RawHandle) -> Result<Device> {
        wrap_borrowed(driver, ObjectKind::Device, handle, DeviceState::default).map(Device)
    }

    pub fn platform(&self) -> Result<Platform> {
        self.state()
            .platform
            .get_or_try_init(|| {
                let h: RawHandle = self.info(CL_DEVICE_PLATFORM)?.scalar()?;
                Platform::wrap(self.driver(), h)
            })
            .cloned()
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.info(CL_DEVICE_NAME)?.string())
    }

    pub fn vendor(&self) -> Result<String> {
        Ok(self.info(CL_DEVICE_VENDOR)?.string())
    }

    pub fn device_type(&self) -> Result<DeviceType> {
        self.info(CL_DEVICE_TYPE)?.scalar()
    }

    pub fn max_work_item_sizes(&self) -> Result<Vec<usize>> {
        Ok(self.info(CL_DEVICE_MAX_WORK_ITEM_SIZES)?.array())
    }

    pub fn max_work_group_size(&self) -> Result<usize> {
        self.info(CL_DEVICE_MAX_WORK_GROUP_SIZE)?.scalar()
    }

    pub fn queue_properties(&self) -> Result<QueueProperties> {
        self.info(CL_DEVICE_QUEUE_PROPERTIES)?.scalar()
    }

    pub fn is_available(&self) -> Result<bool> {
        Ok(self.info(CL_DEVICE_AVAILABLE)?.scalar::<u32>()? != 0)
    }

    /// Version of the platform the device belongs to.
    pub fn opencl_version(&self) -> Result<u32> {
        self.platform()?.opencl_version()
    }
}
