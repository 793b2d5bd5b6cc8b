use std::sync::Arc;

use clkit_core::{ClError, Context, Driver, Program, StubDriver, driver::stub::DeviceSpec, types::*};

const SRC: &str = "__kernel void scale(__global int* a, float f) {}\n__kernel void noop() {}";

fn context(stub: Arc<StubDriver>) -> Context {
    let driver: Arc<dyn Driver> = stub;
    Context::new_gpu(&driver).unwrap()
}

fn legacy_driver() -> Arc<StubDriver> {
    StubDriver::builder()
        .platform("Old Platform", "Old Vendor", "OpenCL 1.1 legacy")
        .device(DeviceSpec::gpu("Old GPU").built_in_kernels(&["fft"]))
        .build()
}

#[test]
fn compile_with_header_then_link() {
    let ctx = context(StubDriver::single_gpu());
    let dev = ctx.device(0).unwrap();
    let header = Program::from_source(&ctx, "#define FACTOR 2").unwrap();
    let main = Program::from_source(&ctx, "#include \"factor.h\"\n__kernel void scale(__global int* a) {}").unwrap();
    main.compile(&[], "-DX=1", &[(&header, "factor.h")]).unwrap();
    assert_eq!(main.build_status(&dev).unwrap(), CL_BUILD_SUCCESS);
    // Compiled objects hold no kernels until linked.
    assert!(main.create_kernel("scale").unwrap_err().is_driver(CL_INVALID_PROGRAM_EXECUTABLE));

    let util = Program::from_source(&ctx, "int twice(int x) { return 2 * x; }").unwrap();
    util.compile(&[dev.clone()], "", &[]).unwrap();
    let linked = Program::link(&ctx, &[], "-cl-denorms-are-zero", &[&main, &util]).unwrap();
    assert_eq!(linked.devices().unwrap(), ctx.devices().unwrap());
    assert_eq!(linked.build_status(&dev).unwrap(), CL_BUILD_SUCCESS);
    assert_eq!(linked.create_kernel("scale").unwrap().num_args().unwrap(), 1);
    assert_eq!(linked.kernel_names().unwrap(), vec!["scale"]);
}

#[test]
fn missing_header_fails_compile_with_its_log() {
    let ctx = context(StubDriver::single_gpu());
    let dev = ctx.device(0).unwrap();
    let prog = Program::from_source(&ctx, "#include \"missing.h\"\n__kernel void k() {}").unwrap();
    let err = prog.compile(&[], "", &[]).unwrap_err();
    assert!(err.is_driver(CL_COMPILE_PROGRAM_FAILURE), "{err}");
    assert!(err.to_string().contains("'missing.h' file not found"), "{err}");
    assert_eq!(prog.build_status(&dev).unwrap(), CL_BUILD_ERROR);
}

#[test]
fn link_takes_only_compiled_objects() {
    let ctx = context(StubDriver::single_gpu());
    let fresh = Program::from_source(&ctx, SRC).unwrap();
    assert!(Program::link(&ctx, &[], "", &[&fresh]).unwrap_err().is_driver(CL_INVALID_OPERATION));

    let built = Program::from_source(&ctx, SRC).unwrap();
    built.build("").unwrap();
    assert!(Program::link(&ctx, &[], "", &[&built]).unwrap_err().is_driver(CL_INVALID_OPERATION));

    assert!(matches!(Program::link(&ctx, &[], "", &[]), Err(ClError::InvalidArgument(_))));
}

#[test]
fn compile_link_and_built_ins_need_opencl_1_2() {
    let ctx = context(legacy_driver());
    let devices = ctx.devices().unwrap().to_vec();
    let prog = Program::from_source(&ctx, SRC).unwrap();
    assert!(matches!(prog.compile(&[], "", &[]), Err(ClError::UnsupportedVersion { required: 120, found: 110, .. })));
    assert!(matches!(
        Program::link(&ctx, &[], "", &[&prog]),
        Err(ClError::UnsupportedVersion { required: 120, found: 110, .. })
    ));
    assert!(matches!(
        Program::from_built_in_kernels(&ctx, &devices, "fft"),
        Err(ClError::UnsupportedVersion { required: 120, found: 110, .. })
    ));
    // Full builds stay available.
    prog.build("").unwrap();
}

#[test]
fn binaries_save_and_reload() {
    let ctx = context(StubDriver::single_gpu());
    let dev = ctx.device(0).unwrap();
    let path = std::env::temp_dir().join(format!("clkit-binary-{}.bin", std::process::id()));
    let prog = Program::from_source(&ctx, SRC).unwrap();
    assert_eq!(prog.binaries().unwrap(), vec![Vec::<u8>::new()]);
    assert!(matches!(prog.save_binary(&dev, &path), Err(ClError::NotFound(_))));
    assert!(!path.exists());

    prog.build("").unwrap();
    assert_eq!(prog.binary(&dev).unwrap(), SRC.as_bytes());
    prog.save_binary(&dev, &path).unwrap();
    let reloaded = Program::from_binary_files(&ctx, &[(dev.clone(), &path)]);
    std::fs::remove_file(&path).unwrap();
    let reloaded = reloaded.unwrap();
    reloaded.build("").unwrap();
    assert_eq!(reloaded.create_kernel("noop").unwrap().num_args().unwrap(), 0);

    let gone = Program::from_binary_files(&ctx, &[(dev, &path)]);
    assert!(matches!(gone, Err(ClError::Io(_))));
}

#[test]
fn binary_of_a_device_outside_the_program_is_not_found() {
    let stub = StubDriver::builder()
        .platform("Stub Platform", "Stub Vendor", "OpenCL 1.2 stub")
        .device(DeviceSpec::gpu("First GPU"))
        .device(DeviceSpec::gpu("Second GPU"))
        .build();
    let ctx = context(stub);
    let (first, second) = (ctx.device(0).unwrap(), ctx.device(1).unwrap());
    let prog = Program::from_binaries(&ctx, &[first.clone()], &[SRC.as_bytes()]).unwrap();
    prog.build("").unwrap();
    assert_eq!(prog.binary(&first).unwrap(), SRC.as_bytes());
    assert!(matches!(prog.binary(&second), Err(ClError::NotFound(_))));
}

#[test]
fn built_in_kernels_need_no_build() {
    let stub = StubDriver::builder()
        .platform("Stub Platform", "Stub Vendor", "OpenCL 1.2 stub")
        .device(DeviceSpec::gpu("DSP").built_in_kernels(&["fft", "dct"]))
        .build();
    let ctx = context(stub);
    let devices = ctx.devices().unwrap().to_vec();
    let prog = Program::from_built_in_kernels(&ctx, &devices, "fft").unwrap();
    assert_eq!(prog.kernel_names().unwrap(), vec!["fft"]);
    assert!(prog.source().unwrap().is_empty());
    assert_eq!(prog.create_kernel("fft").unwrap().num_args().unwrap(), 0);
    assert!(prog.create_kernel("dct").unwrap_err().is_driver(CL_INVALID_KERNEL_NAME));
    assert!(prog.build("").unwrap_err().is_driver(CL_INVALID_OPERATION));
    assert!(prog.binaries().unwrap().iter().all(Vec::is_empty));

    assert!(Program::from_built_in_kernels(&ctx, &devices, "conv").unwrap_err().is_driver(CL_INVALID_VALUE));
    assert!(matches!(Program::from_built_in_kernels(&ctx, &[], "fft"), Err(ClError::InvalidArgument(_))));
}
