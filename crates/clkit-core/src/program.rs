use std::path::Path;

use once_cell::sync::OnceCell;

use crate::{
    context::Context,
    device::Device,
    error::{ClError, Result, cl_try},
    kernel::Kernel,
    types::*,
    wrapper::{adopt, cl_wrapper},
};

pub(crate) struct ProgramState {
    context: Context,
    devices: OnceCell<Vec<Device>>,
}

cl_wrapper!(
    /// A program built from sources or binaries.
    Program, ProgramState, ObjectKind::Program, InfoClass::Program
);

fn device_handles(devices: &[Device]) -> Vec<RawHandle> {
    devices.iter().map(Device::handle).collect()
}

impl Program {
    fn adopt_new(ctx: &Context, h: RawHandle, devices: &[Device]) -> Program {
        let context = ctx.clone();
        let devices = if devices.is_empty() { OnceCell::new() } else { OnceCell::with_value(devices.to_vec()) };
        Program(adopt(ctx.driver(), ObjectKind::Program, h, || ProgramState { context, devices }))
    }

    /// Program from the concatenation of `sources`.
    pub fn from_sources(ctx: &Context, sources: &[&str]) -> Result<Program> {
        if sources.is_empty() {
            return Err(ClError::InvalidArgument("program needs at least one source".into()));
        }
        let h = cl_try!(
            ctx.driver().create_program_with_source(ctx.handle(), sources),
            "unable to create program from {} source(s)",
            sources.len()
        );
        Ok(Program::adopt_new(ctx, h, &[]))
    }

    pub fn from_source(ctx: &Context, source: &str) -> Result<Program> {
        Program::from_sources(ctx, &[source])
    }

    /// Program from one pre-compiled binary per device.
    pub fn from_binaries(ctx: &Context, devices: &[Device], binaries: &[&[u8]]) -> Result<Program> {
        if devices.is_empty() || devices.len() != binaries.len() {
            return Err(ClError::InvalidArgument(format!(
                "{} device(s) but {} binar{}",
                devices.len(),
                binaries.len(),
                if binaries.len() == 1 { "y" } else { "ies" }
            )));
        }
        let h = cl_try!(
            ctx.driver().create_program_with_binary(ctx.handle(), &device_handles(devices), binaries),
            "unable to create program from binaries"
        );
        Ok(Program::adopt_new(ctx, h, devices))
    }

    /// Program from binary files, one per device, as written by
    /// `save_binary`.
    pub fn from_binary_files<P: AsRef<Path>>(ctx: &Context, files: &[(Device, P)]) -> Result<Program> {
        let devices: Vec<Device> = files.iter().map(|(d, _)| d.clone()).collect();
        let binaries = files.iter().map(|(_, path)| std::fs::read(path)).collect::<std::io::Result<Vec<_>>>()?;
        let slices: Vec<&[u8]> = binaries.iter().map(Vec::as_slice).collect();
        Program::from_binaries(ctx, &devices, &slices)
    }

    /// Program of kernels the devices provide themselves (OpenCL 1.2).
    /// `names` is semicolon separated; the program needs no build.
    pub fn from_built_in_kernels(ctx: &Context, devices: &[Device], names: &str) -> Result<Program> {
        ctx.platform()?.require_version(120, "built-in kernel programs")?;
        if devices.is_empty() {
            return Err(ClError::InvalidArgument("built-in kernel program needs at least one device".into()));
        }
        let h = cl_try!(
            ctx.driver().create_program_with_built_in_kernels(ctx.handle(), &device_handles(devices), names),
            "unable to create program with built-in kernels '{names}'"
        );
        Ok(Program::adopt_new(ctx, h, devices))
    }

    /// Links compiled programs into a new executable program for `devices`
    /// (all context devices when empty). OpenCL 1.2.
    pub fn link(ctx: &Context, devices: &[Device], options: &str, programs: &[&Program]) -> Result<Program> {
        ctx.platform()?.require_version(120, "program link")?;
        if programs.is_empty() {
            return Err(ClError::InvalidArgument("nothing to link".into()));
        }
        let inputs: Vec<RawHandle> = programs.iter().map(|p| p.handle()).collect();
        let h = cl_try!(
            ctx.driver().link_program(ctx.handle(), &device_handles(devices), options, &inputs),
            "unable to link {} program(s)",
            programs.len()
        );
        Ok(Program::adopt_new(ctx, h, devices))
    }

    /// Builds for every device of the program.
    pub fn build(&self, options: &str) -> Result<()> {
        self.build_for(&[], options)
    }

    /// Builds for `devices`; an empty slice means all program devices.
    /// A failed build keeps its logs available through `build_log`.
    pub fn build_for(&self, devices: &[Device], options: &str) -> Result<()> {
        self.driver()
            .build_program(self.handle(), &device_handles(devices), options)
            .map_err(|code| self.failure(code, "build"))
    }

    /// Compiles for `devices` (all program devices when empty) without
    /// linking (OpenCL 1.2). `headers` pairs each header program with the
    /// name sources include it by.
    pub fn compile(&self, devices: &[Device], options: &str, headers: &[(&Program, &str)]) -> Result<()> {
        self.context().platform()?.require_version(120, "program compile")?;
        let headers: Vec<(RawHandle, &str)> = headers.iter().map(|(p, name)| (p.handle(), *name)).collect();
        self.driver()
            .compile_program(self.handle(), &device_handles(devices), options, &headers)
            .map_err(|code| self.failure(code, "compile"))
    }

    /// Driver error carrying the first non-empty build log.
    fn failure(&self, code: Status, what: &str) -> ClError {
        let logs = self.build_logs().unwrap_or_default();
        match logs.iter().map(|(_, l)| l.trim()).find(|l| !l.is_empty()) {
            Some(log) => ClError::driver(code, format!("unable to {what} program: {log}")),
            None => ClError::driver(code, format!("unable to {what} program")),
        }
    }

    pub fn build_status(&self, device: &Device) -> Result<i32> {
        self.core()
            .query(InfoClass::ProgramBuild, Some(device.handle()), CL_PROGRAM_BUILD_STATUS, false)?
            .scalar()
    }

    /// Build log for `device`; never cached since builds replace it.
    pub fn build_log(&self, device: &Device) -> Result<String> {
        Ok(self
            .core()
            .query(InfoClass::ProgramBuild, Some(device.handle()), CL_PROGRAM_BUILD_LOG, false)?
            .string())
    }

    pub fn build_logs(&self) -> Result<Vec<(Device, String)>> {
        self.devices()?
            .iter()
            .map(|d| Ok((d.clone(), self.build_log(d)?)))
            .collect()
    }

    /// One binary per program device, in `devices()` order. Devices the
    /// program was not built for get an empty binary.
    pub fn binaries(&self) -> Result<Vec<Vec<u8>>> {
        Ok(cl_try!(self.driver().program_binaries(self.handle()), "unable to get binaries of program {:#x}", self.handle().0))
    }

    pub fn binary(&self, device: &Device) -> Result<Vec<u8>> {
        let index = self
            .devices()?
            .iter()
            .position(|d| d == device)
            .ok_or_else(|| ClError::NotFound(format!("device {:#x} is not a device of this program", device.handle().0)))?;
        let mut all = self.binaries()?;
        if index >= all.len() {
            return Err(ClError::NotFound(format!("no binary slot for device {:#x}", device.handle().0)));
        }
        Ok(all.swap_remove(index))
    }

    /// Writes the binary for `device` to `path`.
    pub fn save_binary(&self, device: &Device, path: impl AsRef<Path>) -> Result<()> {
        let binary = self.binary(device)?;
        if binary.is_empty() {
            return Err(ClError::NotFound(format!("program has no binary for device {:#x}", device.handle().0)));
        }
        std::fs::write(path, binary)?;
        Ok(())
    }

    pub fn create_kernel(&self, name: &str) -> Result<Kernel> {
        Kernel::new(self, name)
    }

    pub fn context(&self) -> &Context {
        &self.state().context
    }

    pub fn devices(&self) -> Result<&[Device]> {
        self.state()
            .devices
            .get_or_try_init(|| {
                self.info(CL_PROGRAM_DEVICES)?
                    .array::<RawHandle>()
                    .into_iter()
                    .map(|h| Device::wrap(self.driver(), h))
                    .collect()
            })
            .map(Vec::as_slice)
    }

    pub fn source(&self) -> Result<String> {
        Ok(self.info(CL_PROGRAM_SOURCE)?.string())
    }

    /// Kernels in the built program (OpenCL 1.2).
    pub fn num_kernels(&self) -> Result<usize> {
        self.context().platform()?.require_version(120, "program kernel count")?;
        self.info_fresh(CL_PROGRAM_NUM_KERNELS)?.scalar()
    }

    /// Names of the kernels in the built program (OpenCL 1.2).
    pub fn kernel_names(&self) -> Result<Vec<String>> {
        self.context().platform()?.require_version(120, "program kernel names")?;
        let names = self.info_fresh(CL_PROGRAM_KERNEL_NAMES)?.string();
        Ok(names.split(';').filter(|n| !n.is_empty()).map(str::to_owned).collect())
    }

    pub fn opencl_version(&self) -> Result<u32> {
        self.context().opencl_version()
    }
}
