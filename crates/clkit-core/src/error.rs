// ─── Error type & cl_try! ───────────────────────────────────────────

use crate::types::Status;

/// Every fallible operation in the crate reports one of these.
#[derive(thiserror::Error, Debug)]
pub enum ClError {
    /// The driver returned a non-success status.
    #[error("{summary} (OpenCL error {code}: {})", status_name(*.code))]
    Driver { code: Status, summary: String },

    /// The platform advertises an older OpenCL than the call needs.
    #[error("{what} requires OpenCL {}.{}, platform provides {}.{}",
        .required / 100, (.required % 100) / 10, .found / 100, (.found % 100) / 10)]
    UnsupportedVersion { required: u32, found: u32, what: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Work sizes cannot satisfy the device and kernel limits.
    #[error("unsatisfiable work size: {0}")]
    Unsatisfiable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("accumulator overflow: {0}")]
    Overflow(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClError>;

impl ClError {
    pub fn driver(code: Status, summary: impl Into<String>) -> Self {
        ClError::Driver { code, summary: summary.into() }
    }

    /// Driver status carried by the error, if any.
    pub fn code(&self) -> Option<Status> {
        match self {
            ClError::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_driver(&self, status: Status) -> bool {
        self.code() == Some(status)
    }

    pub fn is_profiling_unavailable(&self) -> bool {
        self.is_driver(crate::types::CL_PROFILING_INFO_NOT_AVAILABLE)
    }
}

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for ClError {
    fn from(err: opencl3::error_codes::ClError) -> Self {
        ClError::driver(err.0, "opencl3 call failed")
    }
}

/// Turns a `DriverResult` into an early `Err(ClError::Driver)` with a
/// formatted summary.
macro_rules! cl_try {
    ($expr:expr, $($fmt:tt)+) => {
        match $expr {
            Ok(v) => v,
            Err(code) => {
                return Err($crate::error::ClError::Driver {
                    code,
                    summary: format!($($fmt)+),
                })
            }
        }
    };
}
pub(crate) use cl_try;

/// Symbolic name of a driver status code.
pub fn status_name(code: Status) -> &'static str {
    match code {
        0 => "CL_SUCCESS",
        -1 => "CL_DEVICE_NOT_FOUND",
        -2 => "CL_DEVICE_NOT_AVAILABLE",
        -3 => "CL_COMPILER_NOT_AVAILABLE",
        -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
        -5 => "CL_OUT_OF_RESOURCES",
        -6 => "CL_OUT_OF_HOST_MEMORY",
        -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
        -8 => "CL_MEM_COPY_OVERLAP",
        -9 => "CL_IMAGE_FORMAT_MISMATCH",
        -10 => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
        -11 => "CL_BUILD_PROGRAM_FAILURE",
        -12 => "CL_MAP_FAILURE",
        -13 => "CL_MISALIGNED_SUB_BUFFER_OFFSET",
        -14 => "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
        -15 => "CL_COMPILE_PROGRAM_FAILURE",
        -16 => "CL_LINKER_NOT_AVAILABLE",
        -17 => "CL_LINK_PROGRAM_FAILURE",
        -18 => "CL_DEVICE_PARTITION_FAILED",
        -19 => "CL_KERNEL_ARG_INFO_NOT_AVAILABLE",
        -30 => "CL_INVALID_VALUE",
        -31 => "CL_INVALID_DEVICE_TYPE",
        -32 => "CL_INVALID_PLATFORM",
        -33 => "CL_INVALID_DEVICE",
        -34 => "CL_INVALID_CONTEXT",
        -35 => "CL_INVALID_QUEUE_PROPERTIES",
        -36 => "CL_INVALID_COMMAND_QUEUE",
        -37 => "CL_INVALID_HOST_PTR",
        -38 => "CL_INVALID_MEM_OBJECT",
        -39 => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
        -40 => "CL_INVALID_IMAGE_SIZE",
        -41 => "CL_INVALID_SAMPLER",
        -42 => "CL_INVALID_BINARY",
        -43 => "CL_INVALID_BUILD_OPTIONS",
        -44 => "CL_INVALID_PROGRAM",
        -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
        -46 => "CL_INVALID_KERNEL_NAME",
        -47 => "CL_INVALID_KERNEL_DEFINITION",
        -48 => "CL_INVALID_KERNEL",
        -49 => "CL_INVALID_ARG_INDEX",
        -50 => "CL_INVALID_ARG_VALUE",
        -51 => "CL_INVALID_ARG_SIZE",
        -52 => "CL_INVALID_KERNEL_ARGS",
        -53 => "CL_INVALID_WORK_DIMENSION",
        -54 => "CL_INVALID_WORK_GROUP_SIZE",
        -55 => "CL_INVALID_WORK_ITEM_SIZE",
        -56 => "CL_INVALID_GLOBAL_OFFSET",
        -57 => "CL_INVALID_EVENT_WAIT_LIST",
        -58 => "CL_INVALID_EVENT",
        -59 => "CL_INVALID_OPERATION",
        -60 => "CL_INVALID_GL_OBJECT",
        -61 => "CL_INVALID_BUFFER_SIZE",
        -62 => "CL_INVALID_MIP_LEVEL",
        -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
        -64 => "CL_INVALID_PROPERTY",
        -65 => "CL_INVALID_IMAGE_DESCRIPTOR",
        -66 => "CL_INVALID_COMPILER_OPTIONS",
        -67 => "CL_INVALID_LINKER_OPTIONS",
        -68 => "CL_INVALID_DEVICE_PARTITION_COUNT",
        -69 => "CL_INVALID_PIPE_SIZE",
        -70 => "CL_INVALID_DEVICE_QUEUE",
        -1001 => "CL_PLATFORM_NOT_FOUND_KHR",
        _ => "CL_UNKNOWN_ERROR_CODE",
    }
}

#[cfg(all(test, feature = "opencl"))]
mod tests {
    use super::*;

    #[test]
    fn opencl3_errors_keep_their_status() {
        let err = ClError::from(opencl3::error_codes::ClError(-1001));
        assert!(err.is_driver(-1001));
        assert!(err.to_string().contains("CL_PLATFORM_NOT_FOUND_KHR"));
    }
}
