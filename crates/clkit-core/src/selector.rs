//! Device selection pipeline.
//!
//! A selector is an ordered list of filters run over every device of every
//! platform. Independent filters look at one device at a time, dependent
//! filters see (and may replace) the whole surviving list.

use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use crate::{
    device::Device,
    driver::Driver,
    error::{ClError, Result},
    platform::Platform,
};

type Predicate = Box<dyn Fn(&Device) -> Result<bool> + Send + Sync>;
type Transform = Box<dyn Fn(Vec<Device>) -> Result<Vec<Device>> + Send + Sync>;

pub enum Filter {
    Independent(Predicate),
    Dependent(Transform),
}

impl Filter {
    pub fn independent(f: impl Fn(&Device) -> Result<bool> + Send + Sync + 'static) -> Self {
        Filter::Independent(Box::new(f))
    }

    pub fn dependent(f: impl Fn(Vec<Device>) -> Result<Vec<Device>> + Send + Sync + 'static) -> Self {
        Filter::Dependent(Box::new(f))
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Filter::Independent(_) => "Filter::Independent",
            Filter::Dependent(_) => "Filter::Dependent",
        })
    }
}

#[derive(Debug, Default)]
pub struct DeviceSelector {
    filters: Vec<Filter>,
}

impl DeviceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn independent(&mut self, f: impl Fn(&Device) -> Result<bool> + Send + Sync + 'static) -> &mut Self {
        self.filter(Filter::independent(f))
    }

    pub fn dependent(&mut self, f: impl Fn(Vec<Device>) -> Result<Vec<Device>> + Send + Sync + 'static) -> &mut Self {
        self.filter(Filter::dependent(f))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs the filters in order over all devices. Stops as soon as the
    /// list is empty; a failing filter aborts the selection.
    pub fn select(&self, driver: &Arc<dyn Driver>) -> Result<Vec<Device>> {
        let mut devices = all_devices(driver)?;
        for filter in &self.filters {
            if devices.is_empty() {
                break;
            }
            devices = match filter {
                Filter::Independent(pred) => {
                    let mut kept = Vec::with_capacity(devices.len());
                    for d in devices {
                        if pred(&d)? {
                            kept.push(d);
                        } else {
                            log::info!("device {:#x} rejected by filter", d.handle().0);
                        }
                    }
                    kept
                }
                Filter::Dependent(transform) => transform(devices)?,
            };
        }
        Ok(devices)
    }
}

/// Every device of every platform, platform-major in driver order.
pub fn all_devices(driver: &Arc<dyn Driver>) -> Result<Vec<Device>> {
    let mut all = Vec::new();
    for platform in Platform::all(driver)? {
        all.extend(platform.devices()?);
    }
    Ok(all)
}

fn describe(devices: &[Device]) -> Result<Vec<String>> {
    devices
        .iter()
        .enumerate()
        .map(|(i, d)| Ok(format!("{i}. {} [{}]", d.name()?, d.vendor()?)))
        .collect()
}

/// One `"<index>. <name> [<vendor>]"` line per device.
pub fn device_strings(driver: &Arc<dyn Driver>) -> Result<Vec<String>> {
    describe(&all_devices(driver)?)
}

pub fn print_device_strings(driver: &Arc<dyn Driver>) -> Result<()> {
    for line in device_strings(driver)? {
        println!("{line}");
    }
    Ok(())
}

/// Picks one device: `hint` if in range, otherwise whatever the user
/// enters on `input`. A single device is taken without asking; an empty
/// list fails with `NotFound` before anything is printed.
pub fn menu_select<R: BufRead, W: Write>(
    mut devices: Vec<Device>,
    hint: Option<usize>,
    input: &mut R,
    output: &mut W,
) -> Result<Vec<Device>> {
    if devices.is_empty() {
        return Err(ClError::NotFound("no devices to choose from".into()));
    }
    let lines = describe(&devices)?;
    let index = match hint {
        Some(i) if i < devices.len() => {
            writeln!(output)?;
            for (k, line) in lines.iter().enumerate() {
                writeln!(output, " {} {line}", if k == i { "(*)" } else { "   " })?;
            }
            i
        }
        _ => {
            if let Some(i) = hint {
                writeln!(output, "\n   (!) No device at index {i}!")?;
            }
            writeln!(output, "\nList of available OpenCL devices:\n")?;
            for line in &lines {
                writeln!(output, "     {line}")?;
            }
            if devices.len() == 1 { 0 } else { prompt(devices.len(), input, output)? }
        }
    };
    let chosen = devices.swap_remove(index);
    Ok(vec![chosen])
}

fn prompt<R: BufRead, W: Write>(count: usize, input: &mut R, output: &mut W) -> Result<usize> {
    let mut line = String::new();
    loop {
        write!(output, "\n (?) Select device (0-{}) > ", count - 1)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(ClError::NotFound("no device chosen before end of input".into()));
        }
        match line.trim().parse::<usize>() {
            Ok(i) if i < count => return Ok(i),
            _ => writeln!(output, " (!) Invalid choice, please insert a value between 0 and {}.", count - 1)?,
        }
    }
}

/// Built-in filters.
pub mod filters {
    use super::*;
    use crate::types::{CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU, DeviceType, RawHandle};

    /// Accepts devices whose type intersects `mask`.
    pub fn type_mask(mask: DeviceType) -> Filter {
        Filter::independent(move |d| Ok(d.device_type()? & mask != 0))
    }

    pub fn gpu() -> Filter {
        type_mask(CL_DEVICE_TYPE_GPU)
    }

    pub fn cpu() -> Filter {
        type_mask(CL_DEVICE_TYPE_CPU)
    }

    pub fn accel() -> Filter {
        type_mask(CL_DEVICE_TYPE_ACCELERATOR)
    }

    /// Case-insensitive substring match on device name, device vendor or
    /// platform name.
    pub fn by_string(needle: &str) -> Filter {
        let needle = needle.to_lowercase();
        Filter::independent(move |d| {
            Ok(d.name()?.to_lowercase().contains(&needle)
                || d.vendor()?.to_lowercase().contains(&needle)
                || d.platform()?.name()?.to_lowercase().contains(&needle))
        })
    }

    /// Accepts the devices of `platform` only.
    pub fn by_platform(platform: &Platform) -> Filter {
        let handle: RawHandle = platform.handle();
        Filter::independent(move |d| Ok(d.platform()?.handle() == handle))
    }

    /// Keeps the devices sharing the platform of the first one.
    pub fn same_platform() -> Filter {
        Filter::dependent(|devices| {
            let Some(first) = devices.first() else {
                return Ok(devices);
            };
            let platform = first.platform()?.handle();
            let mut kept = Vec::with_capacity(devices.len());
            for d in devices {
                if d.platform()?.handle() == platform {
                    kept.push(d);
                }
            }
            Ok(kept)
        })
    }

    /// Interactive choice on the terminal, preselecting `hint` when it is
    /// in range.
    pub fn menu(hint: Option<usize>) -> Filter {
        Filter::dependent(move |devices| {
            let stdin = std::io::stdin();
            menu_select(devices, hint, &mut stdin.lock(), &mut std::io::stdout())
        })
    }

    /// Keeps only the device at `index`.
    pub fn index(index: usize) -> Filter {
        Filter::dependent(move |mut devices| {
            if index >= devices.len() {
                return Err(ClError::NotFound(format!("no device at index {index} ({} candidates)", devices.len())));
            }
            Ok(vec![devices.swap_remove(index)])
        })
    }
}
