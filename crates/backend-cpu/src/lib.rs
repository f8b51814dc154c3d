//! Host reference runtime built on rustfft.
//!
//! Implements the planner's device traits entirely in host memory: buffers
//! are byte vectors, the queue executes each launch synchronously, and every
//! leaf kernel's semantics are interpreted with rustfft doing the butterfly
//! math. This is the backend the integration tests run against, and the
//! fallback when no GPU is present.
//!
//! All arithmetic happens in f64 regardless of the transform precision;
//! single-precision data is widened on load and narrowed on store, so the
//! reference stays at least as accurate as any device path.

use std::sync::{Arc, Mutex, Weak};

use num_complex::Complex64;
use rustfft::FftPlanner;

use rotorfft_core::describe::{ArrayType, Direction, Precision};
use rotorfft_core::device::{DevicePtr, DeviceQueue, DeviceRuntime, LaunchRequest};
use rotorfft_core::error::{FftError, Result};
use rotorfft_core::scheme::Scheme;

mod ops;

#[cfg(test)]
mod _tests_lib;

const SLOT_SHIFT: u32 = 40;
const OFFSET_MASK: u64 = (1 << SLOT_SHIFT) - 1;

/// Host-memory device: allocations are vectors, addresses encode a slot and
/// a byte offset.
pub struct HostRuntime {
    buffers: Mutex<Vec<Option<Vec<u8>>>>,
    planner: Mutex<FftPlanner<f64>>,
    this: Weak<HostRuntime>,
}

impl HostRuntime {
    pub fn new() -> Arc<HostRuntime> {
        Arc::new_cyclic(|this| HostRuntime {
            buffers: Mutex::new(Vec::new()),
            planner: Mutex::new(FftPlanner::new()),
            this: this.clone(),
        })
    }

    fn decode(ptr: DevicePtr) -> Result<(usize, usize)> {
        if ptr.is_null() {
            return Err(FftError::DeviceFailure("null device pointer".into()));
        }
        let slot = (ptr.0 >> SLOT_SHIFT) as usize - 1;
        Ok((slot, (ptr.0 & OFFSET_MASK) as usize))
    }

    /// Copy of the allocation behind `ptr`, from its offset to the end.
    pub(crate) fn snapshot(&self, ptr: DevicePtr) -> Result<Vec<u8>> {
        let (slot, offset) = Self::decode(ptr)?;
        let buffers = self.buffers.lock().expect("buffer registry poisoned");
        let buf = buffers
            .get(slot)
            .and_then(|b| b.as_ref())
            .ok_or_else(|| FftError::DeviceFailure(format!("stale device pointer {ptr:?}")))?;
        Ok(buf[offset..].to_vec())
    }

    /// Run `f` with a mutable view of the allocation behind `ptr`, starting
    /// at its offset.
    pub(crate) fn with_dst<R>(&self, ptr: DevicePtr, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let (slot, offset) = Self::decode(ptr)?;
        let mut buffers = self.buffers.lock().expect("buffer registry poisoned");
        let buf = buffers
            .get_mut(slot)
            .and_then(|b| b.as_mut())
            .ok_or_else(|| FftError::DeviceFailure(format!("stale device pointer {ptr:?}")))?;
        Ok(f(&mut buf[offset..]))
    }

    pub(crate) fn fft(&self, len: usize, direction: Direction) -> Arc<dyn rustfft::Fft<f64>> {
        let mut planner = self.planner.lock().expect("fft planner poisoned");
        match direction {
            Direction::Forward => planner.plan_fft_forward(len),
            Direction::Inverse => planner.plan_fft_inverse(len),
        }
    }
}

impl DeviceRuntime for HostRuntime {
    fn alloc(&self, bytes: usize) -> Result<DevicePtr> {
        let mut buffers = self.buffers.lock().expect("buffer registry poisoned");
        buffers.push(Some(vec![0u8; bytes]));
        let slot = buffers.len() - 1;
        Ok(DevicePtr(((slot as u64) + 1) << SLOT_SHIFT))
    }

    fn free(&self, ptr: DevicePtr) {
        if let Ok((slot, 0)) = Self::decode(ptr) {
            let mut buffers = self.buffers.lock().expect("buffer registry poisoned");
            if let Some(entry) = buffers.get_mut(slot) {
                entry.take();
            }
        }
    }

    fn upload(&self, dst: DevicePtr, bytes: &[u8]) -> Result<()> {
        self.with_dst(dst, |buf| {
            buf[..bytes.len()].copy_from_slice(bytes);
        })
    }

    fn download(&self, src: DevicePtr, bytes: usize) -> Result<Vec<u8>> {
        let mut data = self.snapshot(src)?;
        data.truncate(bytes);
        Ok(data)
    }

    fn default_queue(&self) -> Arc<dyn DeviceQueue> {
        Arc::new(HostQueue {
            runtime: self.this.upgrade().expect("runtime dropped"),
        })
    }

    fn compile(&self, kernel_name: &str, _source: &str) -> Result<Vec<u8>> {
        // The host interprets schemes directly; the code object is a stamp.
        Ok(format!("host-object:{kernel_name}").into_bytes())
    }

    fn load_code_object(&self, _kernel_name: &str, _code: &[u8]) -> Result<()> {
        Ok(())
    }

    fn arch(&self) -> String {
        "host".into()
    }

    fn driver_version(&self) -> u32 {
        0
    }
}

/// Queue over the host runtime: launches execute synchronously, which makes
/// the in-order guarantee trivial.
pub struct HostQueue {
    runtime: Arc<HostRuntime>,
}

impl DeviceQueue for HostQueue {
    fn launch(&self, req: &LaunchRequest) -> Result<()> {
        dispatch(&self.runtime, req)
    }

    fn wait(&self) -> Result<()> {
        Ok(())
    }
}

fn dispatch(runtime: &HostRuntime, req: &LaunchRequest) -> Result<()> {
    log::trace!("host dispatch {} {:?}", req.kernel_name, req.args.lengths);
    match req.args.scheme {
        Scheme::KernelStockham
        | Scheme::KernelStockhamBlockCc
        | Scheme::KernelStockhamBlockRc
        | Scheme::KernelStockhamTranspose => ops::strided_fft(runtime, req),
        Scheme::Kernel2dSingle => ops::fft_2d_tile(runtime, req),
        Scheme::KernelTranspose => ops::transpose_copy(runtime, req),
        Scheme::KernelR2cPost | Scheme::KernelR2cPostTranspose => ops::r2c_post(runtime, req),
        Scheme::KernelC2rPre | Scheme::KernelTransposeC2rPre => ops::c2r_pre(runtime, req),
        Scheme::KernelChirp => ops::chirp_fill(runtime, req),
        Scheme::KernelPadMul => ops::pad_mul(runtime, req),
        Scheme::KernelFftMul => ops::fft_mul(runtime, req),
        Scheme::KernelResMul => ops::res_mul(runtime, req),
        other => Err(FftError::DeviceFailure(format!(
            "host runtime cannot interpret {other}"
        ))),
    }
}

// ============================================================================
// Element access shared with ops
// ============================================================================

/// Read one logical element at element index `idx` (complex elements for
/// complex types, real elements for real arrays).
pub(crate) fn load_elem(
    plane0: &[u8],
    plane1: Option<&[u8]>,
    precision: Precision,
    ty: ArrayType,
    idx: usize,
) -> Complex64 {
    let real_bytes = precision.real_bytes();
    let read = |bytes: &[u8], at: usize| -> f64 {
        match precision {
            Precision::Single => {
                f32::from_le_bytes(bytes[at..at + 4].try_into().expect("4 bytes")) as f64
            }
            Precision::Double => {
                f64::from_le_bytes(bytes[at..at + 8].try_into().expect("8 bytes"))
            }
        }
    };
    match ty {
        ArrayType::Real => Complex64::new(read(plane0, idx * real_bytes), 0.0),
        ArrayType::ComplexInterleaved | ArrayType::HermitianInterleaved => {
            let at = idx * 2 * real_bytes;
            Complex64::new(read(plane0, at), read(plane0, at + real_bytes))
        }
        ArrayType::ComplexPlanar | ArrayType::HermitianPlanar => {
            let im_plane = plane1.expect("planar arrays carry two planes");
            Complex64::new(
                read(plane0, idx * real_bytes),
                read(im_plane, idx * real_bytes),
            )
        }
    }
}

pub(crate) fn store_elem(
    plane0: &mut [u8],
    plane1: Option<&mut [u8]>,
    precision: Precision,
    ty: ArrayType,
    idx: usize,
    v: Complex64,
) {
    let real_bytes = precision.real_bytes();
    let write = |bytes: &mut [u8], at: usize, x: f64| match precision {
        Precision::Single => bytes[at..at + 4].copy_from_slice(&(x as f32).to_le_bytes()),
        Precision::Double => bytes[at..at + 8].copy_from_slice(&x.to_le_bytes()),
    };
    match ty {
        ArrayType::Real => write(plane0, idx * real_bytes, v.re),
        ArrayType::ComplexInterleaved | ArrayType::HermitianInterleaved => {
            let at = idx * 2 * real_bytes;
            write(plane0, at, v.re);
            write(plane0, at + real_bytes, v.im);
        }
        ArrayType::ComplexPlanar | ArrayType::HermitianPlanar => {
            let im_plane = plane1.expect("planar arrays carry two planes");
            write(plane0, idx * real_bytes, v.re);
            write(im_plane, idx * real_bytes, v.im);
        }
    }
}
