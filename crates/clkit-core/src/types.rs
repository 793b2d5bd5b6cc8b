//! Raw driver vocabulary: handles, object kinds, info classes and the
//! OpenCL constants the crate talks in.

use bytemuck::{Pod, Zeroable};

/// Raw driver status code (`cl_int`).
pub type Status = i32;

pub type DeviceType = u64;
pub type QueueProperties = u64;
pub type MemFlags = u64;
pub type MapFlags = u64;

/// Opaque driver object handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct RawHandle(pub usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Which retain/release pair a handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Platform,
    Device,
    Context,
    Queue,
    Buffer,
    Image,
    Sampler,
    Program,
    Kernel,
    Event,
}

impl ObjectKind {
    /// Platforms and root devices have no driver-level reference count.
    pub fn is_refcounted(self) -> bool {
        !matches!(self, ObjectKind::Platform | ObjectKind::Device)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Platform => "platform",
            ObjectKind::Device => "device",
            ObjectKind::Context => "context",
            ObjectKind::Queue => "queue",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Image => "image",
            ObjectKind::Sampler => "sampler",
            ObjectKind::Program => "program",
            ObjectKind::Kernel => "kernel",
            ObjectKind::Event => "event",
        }
    }
}

/// The "get info" function family a query goes through. The dual classes
/// take a secondary handle (a device, or an argument index for
/// `KernelArg`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InfoClass {
    Platform,
    Device,
    Context,
    Queue,
    MemObject,
    Image,
    Sampler,
    Program,
    ProgramBuild,
    Kernel,
    KernelWorkGroup,
    KernelArg,
    Event,
    EventProfiling,
}

/// `cl_image_format`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ImageFormat {
    pub channel_order: u32,
    pub channel_data_type: u32,
}

impl ImageFormat {
    pub fn new(channel_order: u32, channel_data_type: u32) -> Self {
        Self { channel_order, channel_data_type }
    }
}

/// Host-side image description; mirrors `cl_image_desc` minus the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ImageDesc {
    pub image_type: u32,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub array_size: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl ImageDesc {
    pub fn image2d(width: usize, height: usize) -> Self {
        Self { image_type: CL_MEM_OBJECT_IMAGE2D, width, height, depth: 1, array_size: 1, ..Self::default() }
    }

    pub fn image3d(width: usize, height: usize, depth: usize) -> Self {
        Self { image_type: CL_MEM_OBJECT_IMAGE3D, width, height, depth, array_size: 1, ..Self::default() }
    }
}

/* ───────────── status codes ────────────────────────────── */

pub const CL_SUCCESS: Status = 0;
pub const CL_DEVICE_NOT_FOUND: Status = -1;
pub const CL_DEVICE_NOT_AVAILABLE: Status = -2;
pub const CL_OUT_OF_RESOURCES: Status = -5;
pub const CL_OUT_OF_HOST_MEMORY: Status = -6;
pub const CL_PROFILING_INFO_NOT_AVAILABLE: Status = -7;
pub const CL_BUILD_PROGRAM_FAILURE: Status = -11;
pub const CL_MISALIGNED_SUB_BUFFER_OFFSET: Status = -13;
pub const CL_COMPILE_PROGRAM_FAILURE: Status = -15;
pub const CL_KERNEL_ARG_INFO_NOT_AVAILABLE: Status = -19;
pub const CL_INVALID_VALUE: Status = -30;
pub const CL_INVALID_DEVICE: Status = -33;
pub const CL_INVALID_CONTEXT: Status = -34;
pub const CL_INVALID_COMMAND_QUEUE: Status = -36;
pub const CL_INVALID_MEM_OBJECT: Status = -38;
pub const CL_INVALID_BUILD_OPTIONS: Status = -43;
pub const CL_INVALID_PROGRAM: Status = -44;
pub const CL_INVALID_PROGRAM_EXECUTABLE: Status = -45;
pub const CL_INVALID_KERNEL_NAME: Status = -46;
pub const CL_INVALID_KERNEL: Status = -48;
pub const CL_INVALID_ARG_INDEX: Status = -49;
pub const CL_INVALID_ARG_VALUE: Status = -50;
pub const CL_INVALID_ARG_SIZE: Status = -51;
pub const CL_INVALID_WORK_DIMENSION: Status = -53;
pub const CL_INVALID_WORK_GROUP_SIZE: Status = -54;
pub const CL_INVALID_EVENT_WAIT_LIST: Status = -57;
pub const CL_INVALID_EVENT: Status = -58;
pub const CL_INVALID_OPERATION: Status = -59;
pub const CL_INVALID_BUFFER_SIZE: Status = -61;

/* ───────────── device types ────────────────────────────── */

pub const CL_DEVICE_TYPE_DEFAULT: DeviceType = 1 << 0;
pub const CL_DEVICE_TYPE_CPU: DeviceType = 1 << 1;
pub const CL_DEVICE_TYPE_GPU: DeviceType = 1 << 2;
pub const CL_DEVICE_TYPE_ACCELERATOR: DeviceType = 1 << 3;
pub const CL_DEVICE_TYPE_CUSTOM: DeviceType = 1 << 4;
pub const CL_DEVICE_TYPE_ALL: DeviceType = 0xFFFF_FFFF;

/* ───────────── platform / device info ──────────────────── */

pub const CL_PLATFORM_PROFILE: u32 = 0x0900;
pub const CL_PLATFORM_VERSION: u32 = 0x0901;
pub const CL_PLATFORM_NAME: u32 = 0x0902;
pub const CL_PLATFORM_VENDOR: u32 = 0x0903;
pub const CL_PLATFORM_EXTENSIONS: u32 = 0x0904;

pub const CL_DEVICE_TYPE: u32 = 0x1000;
pub const CL_DEVICE_VENDOR_ID: u32 = 0x1001;
pub const CL_DEVICE_MAX_COMPUTE_UNITS: u32 = 0x1002;
pub const CL_DEVICE_MAX_WORK_ITEM_DIMENSIONS: u32 = 0x1003;
pub const CL_DEVICE_MAX_WORK_GROUP_SIZE: u32 = 0x1004;
pub const CL_DEVICE_MAX_WORK_ITEM_SIZES: u32 = 0x1005;
pub const CL_DEVICE_MEM_BASE_ADDR_ALIGN: u32 = 0x1019;
pub const CL_DEVICE_GLOBAL_MEM_SIZE: u32 = 0x101F;
pub const CL_DEVICE_LOCAL_MEM_SIZE: u32 = 0x1023;
pub const CL_DEVICE_AVAILABLE: u32 = 0x1027;
pub const CL_DEVICE_QUEUE_PROPERTIES: u32 = 0x102A;
pub const CL_DEVICE_NAME: u32 = 0x102B;
pub const CL_DEVICE_VENDOR: u32 = 0x102C;
pub const CL_DRIVER_VERSION: u32 = 0x102D;
pub const CL_DEVICE_VERSION: u32 = 0x102F;
pub const CL_DEVICE_PLATFORM: u32 = 0x1031;
pub const CL_DEVICE_BUILT_IN_KERNELS: u32 = 0x103F;

/* ───────────── context / queue info ────────────────────── */

pub const CL_CONTEXT_REFERENCE_COUNT: u32 = 0x1080;
pub const CL_CONTEXT_DEVICES: u32 = 0x1081;
pub const CL_CONTEXT_PROPERTIES: u32 = 0x1082;
pub const CL_CONTEXT_NUM_DEVICES: u32 = 0x1083;
pub const CL_CONTEXT_PLATFORM: u32 = 0x1084;

pub const CL_QUEUE_CONTEXT: u32 = 0x1090;
pub const CL_QUEUE_DEVICE: u32 = 0x1091;
pub const CL_QUEUE_REFERENCE_COUNT: u32 = 0x1092;
pub const CL_QUEUE_PROPERTIES: u32 = 0x1093;

pub const CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE: QueueProperties = 1 << 0;
pub const CL_QUEUE_PROFILING_ENABLE: QueueProperties = 1 << 1;

/* ───────────── memory objects ──────────────────────────── */

pub const CL_MEM_READ_WRITE: MemFlags = 1 << 0;
pub const CL_MEM_WRITE_ONLY: MemFlags = 1 << 1;
pub const CL_MEM_READ_ONLY: MemFlags = 1 << 2;
pub const CL_MEM_USE_HOST_PTR: MemFlags = 1 << 3;
pub const CL_MEM_ALLOC_HOST_PTR: MemFlags = 1 << 4;
pub const CL_MEM_COPY_HOST_PTR: MemFlags = 1 << 5;

pub const CL_MAP_READ: MapFlags = 1 << 0;
pub const CL_MAP_WRITE: MapFlags = 1 << 1;

pub const CL_MIGRATE_MEM_OBJECT_HOST: u64 = 1 << 0;
pub const CL_MIGRATE_MEM_OBJECT_CONTENT_UNDEFINED: u64 = 1 << 1;

pub const CL_MEM_OBJECT_BUFFER: u32 = 0x10F0;
pub const CL_MEM_OBJECT_IMAGE2D: u32 = 0x10F1;
pub const CL_MEM_OBJECT_IMAGE3D: u32 = 0x10F2;
pub const CL_MEM_OBJECT_IMAGE2D_ARRAY: u32 = 0x10F3;
pub const CL_MEM_OBJECT_IMAGE1D: u32 = 0x10F4;
pub const CL_MEM_OBJECT_IMAGE1D_ARRAY: u32 = 0x10F5;
pub const CL_MEM_OBJECT_IMAGE1D_BUFFER: u32 = 0x10F6;

pub const CL_MEM_TYPE: u32 = 0x1100;
pub const CL_MEM_FLAGS: u32 = 0x1101;
pub const CL_MEM_SIZE: u32 = 0x1102;
pub const CL_MEM_HOST_PTR: u32 = 0x1103;
pub const CL_MEM_MAP_COUNT: u32 = 0x1104;
pub const CL_MEM_REFERENCE_COUNT: u32 = 0x1105;
pub const CL_MEM_CONTEXT: u32 = 0x1106;
pub const CL_MEM_ASSOCIATED_MEMOBJECT: u32 = 0x1107;
pub const CL_MEM_OFFSET: u32 = 0x1108;

pub const CL_BUFFER_CREATE_TYPE_REGION: u32 = 0x1220;

pub const CL_IMAGE_FORMAT: u32 = 0x1110;
pub const CL_IMAGE_ELEMENT_SIZE: u32 = 0x1111;
pub const CL_IMAGE_ROW_PITCH: u32 = 0x1112;
pub const CL_IMAGE_SLICE_PITCH: u32 = 0x1113;
pub const CL_IMAGE_WIDTH: u32 = 0x1114;
pub const CL_IMAGE_HEIGHT: u32 = 0x1115;
pub const CL_IMAGE_DEPTH: u32 = 0x1116;

pub const CL_R: u32 = 0x10B0;
pub const CL_A: u32 = 0x10B1;
pub const CL_RG: u32 = 0x10B2;
pub const CL_RGB: u32 = 0x10B4;
pub const CL_RGBA: u32 = 0x10B5;
pub const CL_BGRA: u32 = 0x10B6;

pub const CL_UNORM_INT8: u32 = 0x10D2;
pub const CL_SIGNED_INT32: u32 = 0x10D9;
pub const CL_UNSIGNED_INT8: u32 = 0x10DA;
pub const CL_UNSIGNED_INT32: u32 = 0x10DC;
pub const CL_FLOAT: u32 = 0x10DE;

/* ───────────── samplers ────────────────────────────────── */

pub const CL_ADDRESS_NONE: u32 = 0x1130;
pub const CL_ADDRESS_CLAMP_TO_EDGE: u32 = 0x1131;
pub const CL_ADDRESS_CLAMP: u32 = 0x1132;
pub const CL_ADDRESS_REPEAT: u32 = 0x1133;

pub const CL_FILTER_NEAREST: u32 = 0x1140;
pub const CL_FILTER_LINEAR: u32 = 0x1141;

pub const CL_SAMPLER_REFERENCE_COUNT: u32 = 0x1150;
pub const CL_SAMPLER_CONTEXT: u32 = 0x1151;
pub const CL_SAMPLER_NORMALIZED_COORDS: u32 = 0x1152;
pub const CL_SAMPLER_ADDRESSING_MODE: u32 = 0x1153;
pub const CL_SAMPLER_FILTER_MODE: u32 = 0x1154;

/* ───────────── programs / kernels ──────────────────────── */

pub const CL_PROGRAM_REFERENCE_COUNT: u32 = 0x1160;
pub const CL_PROGRAM_CONTEXT: u32 = 0x1161;
pub const CL_PROGRAM_NUM_DEVICES: u32 = 0x1162;
pub const CL_PROGRAM_DEVICES: u32 = 0x1163;
pub const CL_PROGRAM_SOURCE: u32 = 0x1164;
pub const CL_PROGRAM_BINARY_SIZES: u32 = 0x1165;
pub const CL_PROGRAM_BINARIES: u32 = 0x1166;
pub const CL_PROGRAM_NUM_KERNELS: u32 = 0x1167;
pub const CL_PROGRAM_KERNEL_NAMES: u32 = 0x1168;

pub const CL_PROGRAM_BUILD_STATUS: u32 = 0x1181;
pub const CL_PROGRAM_BUILD_OPTIONS: u32 = 0x1182;
pub const CL_PROGRAM_BUILD_LOG: u32 = 0x1183;
pub const CL_PROGRAM_BINARY_TYPE: u32 = 0x1184;

pub const CL_PROGRAM_BINARY_TYPE_NONE: u32 = 0x0;
pub const CL_PROGRAM_BINARY_TYPE_COMPILED_OBJECT: u32 = 0x1;
pub const CL_PROGRAM_BINARY_TYPE_LIBRARY: u32 = 0x2;
pub const CL_PROGRAM_BINARY_TYPE_EXECUTABLE: u32 = 0x4;

pub const CL_BUILD_SUCCESS: i32 = 0;
pub const CL_BUILD_NONE: i32 = -1;
pub const CL_BUILD_ERROR: i32 = -2;
pub const CL_BUILD_IN_PROGRESS: i32 = -3;

pub const CL_KERNEL_FUNCTION_NAME: u32 = 0x1190;
pub const CL_KERNEL_NUM_ARGS: u32 = 0x1191;
pub const CL_KERNEL_REFERENCE_COUNT: u32 = 0x1192;
pub const CL_KERNEL_CONTEXT: u32 = 0x1193;
pub const CL_KERNEL_PROGRAM: u32 = 0x1194;

pub const CL_KERNEL_ARG_ADDRESS_QUALIFIER: u32 = 0x1196;
pub const CL_KERNEL_ARG_ACCESS_QUALIFIER: u32 = 0x1197;
pub const CL_KERNEL_ARG_TYPE_NAME: u32 = 0x1198;
pub const CL_KERNEL_ARG_TYPE_QUALIFIER: u32 = 0x1199;
pub const CL_KERNEL_ARG_NAME: u32 = 0x119A;

pub const CL_KERNEL_WORK_GROUP_SIZE: u32 = 0x11B0;
pub const CL_KERNEL_COMPILE_WORK_GROUP_SIZE: u32 = 0x11B1;
pub const CL_KERNEL_LOCAL_MEM_SIZE: u32 = 0x11B2;
pub const CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE: u32 = 0x11B3;
pub const CL_KERNEL_PRIVATE_MEM_SIZE: u32 = 0x11B4;

/* ───────────── events ──────────────────────────────────── */

pub const CL_EVENT_COMMAND_QUEUE: u32 = 0x11D0;
pub const CL_EVENT_COMMAND_TYPE: u32 = 0x11D1;
pub const CL_EVENT_REFERENCE_COUNT: u32 = 0x11D2;
pub const CL_EVENT_COMMAND_EXECUTION_STATUS: u32 = 0x11D3;
pub const CL_EVENT_CONTEXT: u32 = 0x11D4;

pub const CL_COMPLETE: i32 = 0x0;
pub const CL_RUNNING: i32 = 0x1;
pub const CL_SUBMITTED: i32 = 0x2;
pub const CL_QUEUED: i32 = 0x3;

pub const CL_PROFILING_COMMAND_QUEUED: u32 = 0x1280;
pub const CL_PROFILING_COMMAND_SUBMIT: u32 = 0x1281;
pub const CL_PROFILING_COMMAND_START: u32 = 0x1282;
pub const CL_PROFILING_COMMAND_END: u32 = 0x1283;

pub const CL_COMMAND_NDRANGE_KERNEL: u32 = 0x11F0;
pub const CL_COMMAND_TASK: u32 = 0x11F1;
pub const CL_COMMAND_NATIVE_KERNEL: u32 = 0x11F2;
pub const CL_COMMAND_READ_BUFFER: u32 = 0x11F3;
pub const CL_COMMAND_WRITE_BUFFER: u32 = 0x11F4;
pub const CL_COMMAND_COPY_BUFFER: u32 = 0x11F5;
pub const CL_COMMAND_READ_IMAGE: u32 = 0x11F6;
pub const CL_COMMAND_WRITE_IMAGE: u32 = 0x11F7;
pub const CL_COMMAND_COPY_IMAGE: u32 = 0x11F8;
pub const CL_COMMAND_COPY_IMAGE_TO_BUFFER: u32 = 0x11F9;
pub const CL_COMMAND_COPY_BUFFER_TO_IMAGE: u32 = 0x11FA;
pub const CL_COMMAND_MAP_BUFFER: u32 = 0x11FB;
pub const CL_COMMAND_MAP_IMAGE: u32 = 0x11FC;
pub const CL_COMMAND_UNMAP_MEM_OBJECT: u32 = 0x11FD;
pub const CL_COMMAND_MARKER: u32 = 0x11FE;
pub const CL_COMMAND_ACQUIRE_GL_OBJECTS: u32 = 0x11FF;
pub const CL_COMMAND_RELEASE_GL_OBJECTS: u32 = 0x1200;
pub const CL_COMMAND_READ_BUFFER_RECT: u32 = 0x1201;
pub const CL_COMMAND_WRITE_BUFFER_RECT: u32 = 0x1202;
pub const CL_COMMAND_COPY_BUFFER_RECT: u32 = 0x1203;
pub const CL_COMMAND_USER: u32 = 0x1204;
pub const CL_COMMAND_BARRIER: u32 = 0x1205;
pub const CL_COMMAND_MIGRATE_MEM_OBJECTS: u32 = 0x1206;
pub const CL_COMMAND_FILL_BUFFER: u32 = 0x1207;
pub const CL_COMMAND_FILL_IMAGE: u32 = 0x1208;
pub const CL_COMMAND_SVM_FREE: u32 = 0x1209;
pub const CL_COMMAND_SVM_MEMCPY: u32 = 0x120A;
pub const CL_COMMAND_SVM_MEMFILL: u32 = 0x120B;
pub const CL_COMMAND_SVM_MAP: u32 = 0x120C;
pub const CL_COMMAND_SVM_UNMAP: u32 = 0x120D;

pub const CL_COMMAND_GL_FENCE_SYNC_OBJECT_KHR: u32 = 0x200D;
pub const CL_COMMAND_ACQUIRE_DX9_MEDIA_SURFACES_KHR: u32 = 0x202B;
pub const CL_COMMAND_RELEASE_DX9_MEDIA_SURFACES_KHR: u32 = 0x202C;
pub const CL_COMMAND_ACQUIRE_EGL_OBJECTS_KHR: u32 = 0x202D;
pub const CL_COMMAND_RELEASE_EGL_OBJECTS_KHR: u32 = 0x202E;
pub const CL_COMMAND_EGL_FENCE_SYNC_OBJECT_KHR: u32 = 0x202F;
pub const CL_COMMAND_ACQUIRE_D3D10_OBJECTS_KHR: u32 = 0x4017;
pub const CL_COMMAND_RELEASE_D3D10_OBJECTS_KHR: u32 = 0x4018;
pub const CL_COMMAND_ACQUIRE_D3D11_OBJECTS_KHR: u32 = 0x4020;
pub const CL_COMMAND_RELEASE_D3D11_OBJECTS_KHR: u32 = 0x4021;
