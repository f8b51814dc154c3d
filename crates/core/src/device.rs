//! The seam between the planner and a device runtime.
//!
//! The planner never talks to a driver directly; it resolves buffers to
//! opaque device addresses and hands fully-described launches to a
//! [`DeviceQueue`]. Backends (HIP, or the host reference runtime used by the
//! tests) implement these traits. Launch argument layout mirrors what the
//! device entry points consume: two pointers per side for planar arrays,
//! the two twiddle tables, and the node geometry.

use std::sync::Arc;

use crate::describe::{ArrayType, Direction, Precision};
use crate::error::Result;
use crate::scheme::{SbrcVariant, Scheme, TransposeVariant};

/// An opaque device address. Zero is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    pub const NULL: DevicePtr = DevicePtr(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn offset(self, bytes: usize) -> DevicePtr {
        DevicePtr(self.0 + bytes as u64)
    }
}

/// A caller-supplied load or store callback, passed through to the kernel
/// argument list without wrapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackSpec {
    pub fn_ptr: DevicePtr,
    pub data: DevicePtr,
    pub lds_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LaunchShape {
    pub grid: [u32; 3],
    pub block: [u32; 3],
    pub lds_bytes: u32,
}

/// Everything a leaf kernel needs at dispatch.
#[derive(Debug, Clone)]
pub struct KernelArgs {
    /// Input pointers; the second entry is the imaginary plane for planar
    /// arrays, null otherwise.
    pub buf_in: [DevicePtr; 2],
    pub buf_out: [DevicePtr; 2],
    pub twiddles: DevicePtr,
    pub twiddles_large: DevicePtr,
    /// Bluestein chirp storage, when the kernel consumes it.
    pub chirp: DevicePtr,

    pub lengths: Vec<usize>,
    pub in_stride: Vec<usize>,
    pub out_stride: Vec<usize>,
    pub in_dist: usize,
    pub out_dist: usize,
    pub batch: usize,

    pub precision: Precision,
    pub direction: Direction,
    pub in_type: ArrayType,
    pub out_type: ArrayType,
    pub scheme: Scheme,
    pub transpose_variant: TransposeVariant,
    pub sbrc_variant: SbrcVariant,
    /// Full length of the enclosing large-1D decomposition (or the
    /// Bluestein logical length), 0 when unused.
    pub large1d: usize,

    pub load_cb: Option<CallbackSpec>,
    pub store_cb: Option<CallbackSpec>,
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Device entry point name, as the catalog/generator named it.
    pub kernel_name: String,
    pub shape: LaunchShape,
    pub args: KernelArgs,
}

/// An in-order submission queue. Launches return immediately; ordering
/// between consecutive launches on one queue is the only guarantee.
pub trait DeviceQueue: Send + Sync {
    fn launch(&self, req: &LaunchRequest) -> Result<()>;

    /// Block the host until everything submitted so far has completed.
    fn wait(&self) -> Result<()>;
}

/// Device memory and module services used during plan construction.
pub trait DeviceRuntime: Send + Sync {
    fn alloc(&self, bytes: usize) -> Result<DevicePtr>;
    fn free(&self, ptr: DevicePtr);
    fn upload(&self, dst: DevicePtr, bytes: &[u8]) -> Result<()>;
    fn download(&self, src: DevicePtr, bytes: usize) -> Result<Vec<u8>>;

    fn default_queue(&self) -> Arc<dyn DeviceQueue>;

    /// Compile generated kernel source to a device code object.
    fn compile(&self, kernel_name: &str, source: &str) -> Result<Vec<u8>>;

    /// Make a compiled code object launchable under `kernel_name`.
    fn load_code_object(&self, kernel_name: &str, code: &[u8]) -> Result<()>;

    /// GPU architecture string (e.g. `gfx90a`), part of the RTC cache key.
    fn arch(&self) -> String;

    /// Driver runtime version, part of the RTC cache key.
    fn driver_version(&self) -> u32;
}
