use clkit_core::{ClDriver, Platform, selector};

fn main() -> Result<(), clkit_core::ClError> {
    if opencl3::platform::get_platforms()?.is_empty() {
        println!("no OpenCL platforms found");
        return Ok(());
    }
    let driver = ClDriver::shared();

    for platform in Platform::all(&driver)? {
        println!("{} ({})", platform.name()?, platform.version()?);
    }
    println!();
    selector::print_device_strings(&driver)?;
    Ok(())
}
