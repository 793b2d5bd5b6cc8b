use std::sync::Arc;

use crate::{
    device::Device,
    driver::Driver,
    error::{ClError, Result, cl_try},
    types::*,
    wrapper::{cl_wrapper, wrap_borrowed},
};

cl_wrapper!(
    /// An OpenCL platform. Platforms carry no driver reference count.
    Platform, (), ObjectKind::Platform, InfoClass::Platform
);

/// Parses `"OpenCL <major>.<minor> ..."` into `major * 100 + minor * 10`.
pub fn parse_version(text: &str) -> Option<u32> {
    let rest = text.trim().strip_prefix("OpenCL")?.trim_start();
    let token = rest.split_whitespace().next()?;
    let (major, minor) = token.split_once('.')?;
    let major: u32 = major.parse().ok()?;
    let minor: u32 = minor.chars().take_while(char::is_ascii_digit).collect::<String>().parse().ok()?;
    Some(major * 100 + minor * 10)
}

impl Platform {
    pub(crate) fn wrap(driver: &Arc<dyn Driver>, handle: RawHandle) -> Result<Platform> {
        wrap_borrowed(driver, ObjectKind::Platform, handle, || ()).map(Platform)
    }

    /// Every platform the driver reports, in driver order.
    pub fn all(driver: &Arc<dyn Driver>) -> Result<Vec<Platform>> {
        let ids = cl_try!(driver.platform_ids(), "unable to get platform IDs");
        ids.into_iter().map(|h| Platform::wrap(driver, h)).collect()
    }

    /// Platform of `device`.
    pub fn from_device(device: &Device) -> Result<Platform> {
        device.platform()
    }

    /// All devices on this platform. A platform without devices yields an
    /// empty list.
    pub fn devices(&self) -> Result<Vec<Device>> {
        let ids = match self.driver().device_ids(self.handle(), CL_DEVICE_TYPE_ALL) {
            Ok(ids) => ids,
            Err(CL_DEVICE_NOT_FOUND) => return Ok(Vec::new()),
            Err(code) => {
                return Err(ClError::driver(code, format!("unable to get devices of platform {:#x}", self.handle().0)));
            }
        };
        ids.into_iter().map(|h| Device::wrap(self.driver(), h)).collect()
    }

    pub fn num_devices(&self) -> Result<usize> {
        Ok(self.devices()?.len())
    }

    pub fn device(&self, index: usize) -> Result<Device> {
        let mut devs = self.devices()?;
        if index >= devs.len() {
            return Err(ClError::InvalidArgument(format!("device index {index} out of range ({} devices)", devs.len())));
        }
        Ok(devs.swap_remove(index))
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.info(CL_PLATFORM_NAME)?.string())
    }

    pub fn vendor(&self) -> Result<String> {
        Ok(self.info(CL_PLATFORM_VENDOR)?.string())
    }

    pub fn version(&self) -> Result<String> {
        Ok(self.info(CL_PLATFORM_VERSION)?.string())
    }

    /// OpenCL version as `major * 100 + minor * 10`, e.g. 120 for 1.2.
    pub fn opencl_version(&self) -> Result<u32> {
        let text = self.version()?;
        parse_version(&text).ok_or_else(|| ClError::InvalidArgument(format!("unparsable platform version '{text}'")))
    }

    /// Fails with `UnsupportedVersion` if the platform is older than `required`.
    pub(crate) fn require_version(&self, required: u32, what: &'static str) -> Result<()> {
        let found = self.opencl_version()?;
        if found < required {
            return Err(ClError::UnsupportedVersion { required, found, what });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::parse_version;

    #[test]
    fn parses_version_strings() {
        assert_eq!(parse_version("OpenCL 1.2 CUDA 11.4"), Some(120));
        assert_eq!(parse_version("OpenCL 2.0 AMD-APP (3004.6)"), Some(200));
        assert_eq!(parse_version("OpenCL 3.0"), Some(300));
        assert_eq!(parse_version("OpenCL 1.1beta"), Some(110));
        assert_eq!(parse_version("Vulkan 1.3"), None);
        assert_eq!(parse_version("OpenCL"), None);
    }
}
