//! Typed, reference-counted host framework over OpenCL.
//!
//! Every OpenCL object is held by a cheap-to-clone wrapper that owns one
//! driver reference and caches its info queries. On top of the wrappers sit
//! kernel argument binding with work-size derivation, a device selection
//! pipeline and an event profiler.
//!
//! All driver traffic goes through the [`Driver`] trait. Tests and benches
//! run against [`StubDriver`]; real hardware needs the `opencl` feature.

// ─── Core ──────────────────────────────────────────────────────────────
pub mod driver;
pub mod error;
pub mod types;
mod wrapper;

// ─── Objects ───────────────────────────────────────────────────────────
pub mod buffer;
pub mod context;
pub mod device;
pub mod event;
pub mod image;
pub mod kernel;
pub mod memobj;
pub mod platform;
pub mod program;
pub mod queue;
pub mod sampler;

// ─── Utilities ─────────────────────────────────────────────────────────
pub mod profiler;
pub mod selector;
pub mod worksize;

pub use buffer::Buffer;
pub use context::Context;
pub use device::Device;
pub use driver::{Driver, ImageRegion, Rect, RectSide, stub::StubDriver};
#[cfg(feature = "opencl")]
pub use driver::opencl::ClDriver;
pub use error::{ClError, Result, status_name};
pub use event::{Event, EventWaitList};
pub use image::Image;
pub use kernel::{Kernel, KernelArg, NdRange, enqueue_native};
pub use memobj::{Mapped, MemObject};
pub use platform::Platform;
pub use profiler::{Profile, Profiler};
pub use program::Program;
pub use queue::Queue;
pub use sampler::Sampler;
pub use selector::{DeviceSelector, Filter, filters};
pub use types::{ImageDesc, ImageFormat, RawHandle};
pub use worksize::{WorkLimits, WorkSizes, suggest_worksizes};
pub use wrapper::{InfoValue, live_wrappers, memcheck};
