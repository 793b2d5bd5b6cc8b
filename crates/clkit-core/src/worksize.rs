//! Local/global work-size derivation for N-dimensional dispatches.
//!
//! `derive` is pure; `suggest_worksizes` feeds it the limits reported by a
//! device and, optionally, a kernel.

use crate::{
    device::Device,
    error::{ClError, Result},
    kernel::{Kernel, NdRange},
};

/// Limits the derivation has to respect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkLimits {
    /// Per-dimension maximum work-item sizes (`M`).
    pub max_item_sizes: Vec<usize>,
    /// Maximum work-group size (`W_max`).
    pub max_group_size: usize,
    /// Preferred work-group size multiple (`W_mul`); 0 means `W_max`.
    pub preferred_multiple: usize,
}

impl WorkLimits {
    /// Limits of `device` alone.
    pub fn for_device(device: &Device) -> Result<WorkLimits> {
        let max_group_size = device.max_work_group_size()?;
        Ok(WorkLimits { max_item_sizes: device.max_work_item_sizes()?, max_group_size, preferred_multiple: max_group_size })
    }

    /// Limits of `kernel` on `device`. Platforms before 1.1 have no
    /// preferred multiple, so it falls back to the work-group maximum.
    pub fn for_kernel(kernel: &Kernel, device: &Device) -> Result<WorkLimits> {
        let max_group_size = kernel.work_group_size(device)?;
        let preferred_multiple = if device.opencl_version()? >= 110 {
            kernel.preferred_work_group_size_multiple(device)?
        } else {
            max_group_size
        };
        Ok(WorkLimits { max_item_sizes: device.max_work_item_sizes()?, max_group_size, preferred_multiple })
    }
}

/// Derived sizes. `global` is present when padding was requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkSizes {
    pub local: Vec<usize>,
    pub global: Option<Vec<usize>>,
}

impl WorkSizes {
    pub fn dims(&self) -> usize {
        self.local.len()
    }

    pub fn group_size(&self) -> usize {
        self.local.iter().product()
    }

    /// Launch geometry for `real` items: the padded global size when there
    /// is one, `real` otherwise.
    pub fn range(&self, real: &[usize]) -> NdRange {
        let global = self.global.as_deref().unwrap_or(real);
        NdRange::new(global).local(&self.local)
    }
}

/// Derives a local size for `real` work items.
///
/// `caps` (zero entries ignored) further bound each local dimension. With
/// `pad_global`, the result carries a global size rounded up to multiples
/// of the local size; without it, every local dimension divides the real
/// size instead.
pub fn derive(limits: &WorkLimits, real: &[usize], caps: Option<&[usize]>, pad_global: bool) -> Result<WorkSizes> {
    let dims = real.len();
    if !(1..=3).contains(&dims) {
        return Err(ClError::InvalidArgument(format!("work dimension {dims} not in 1..=3")));
    }
    if let Some(i) = real.iter().position(|&r| r == 0) {
        return Err(ClError::InvalidArgument(format!("real work size is zero in dimension {i}")));
    }
    if let Some(c) = caps {
        if c.len() != dims {
            return Err(ClError::InvalidArgument(format!("{} local caps for {dims} dimension(s)", c.len())));
        }
    }
    if dims > limits.max_item_sizes.len() {
        return Err(ClError::Unsatisfiable(format!(
            "{dims} dimension(s) requested, device supports {}",
            limits.max_item_sizes.len()
        )));
    }
    let w_max = limits.max_group_size;
    if w_max == 0 {
        return Err(ClError::Unsatisfiable("maximum work-group size is zero".into()));
    }
    let w_mul = if limits.preferred_multiple == 0 { w_max } else { limits.preferred_multiple };

    let max: Vec<usize> = (0..dims)
        .map(|i| {
            let m = limits.max_item_sizes[i].max(1);
            match caps.map(|c| c[i]) {
                Some(cap) if cap != 0 => m.min(cap),
                _ => m,
            }
        })
        .collect();

    let mut local: Vec<usize> = max.iter().map(|&m| w_mul.min(m)).collect();
    for (l, &r) in local.iter_mut().zip(real) {
        while *l > r {
            *l /= 2;
        }
    }

    while local.iter().product::<usize>() > w_max {
        let Some(l) = local.iter_mut().rev().find(|l| **l > 1) else {
            return Err(ClError::Unsatisfiable(format!("no local size fits a work-group maximum of {w_max}")));
        };
        *l /= 2;
    }

    if !pad_global {
        for i in 0..dims {
            if real[i] % local[i] == 0 {
                continue;
            }
            let others: usize = local.iter().enumerate().filter(|&(k, _)| k != i).map(|(_, l)| l).product();
            let j = (1..=real[i] / 2)
                .rev()
                .find(|&j| real[i] % j == 0 && others * j <= w_max && j <= max[i])
                .unwrap_or(1);
            local[i] = j;
        }
    }

    let global = pad_global.then(|| real.iter().zip(&local).map(|(&r, &l)| r.div_ceil(l) * l).collect());
    log::debug!("work sizes for {real:?}: local {local:?}, global {global:?}");
    Ok(WorkSizes { local, global })
}

/// Suggests work sizes for `real` on `device`, using the kernel's limits
/// when one is given and the device's otherwise.
pub fn suggest_worksizes(
    kernel: Option<&Kernel>,
    device: &Device,
    real: &[usize],
    caps: Option<&[usize]>,
    pad_global: bool,
) -> Result<WorkSizes> {
    let limits = match kernel {
        Some(k) => WorkLimits::for_kernel(k, device)?,
        None => WorkLimits::for_device(device)?,
    };
    derive(&limits, real, caps, pad_global)
}
