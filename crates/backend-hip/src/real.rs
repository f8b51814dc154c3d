//! The real ROCm path: device memory, module cache, and hiprtc compilation
//! behind the planner's runtime traits. Compiled with the `hip-real`
//! feature; everything here assumes a working HIP installation.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::sync::{Arc, Mutex, Weak};

use rotorfft_core::device::{DevicePtr, DeviceQueue, DeviceRuntime, LaunchRequest};
use rotorfft_core::error::{FftError, Result};

use crate::hip_sys::{self, hipError_t, hipMemcpyKind};

fn device_err(what: &str, e: hipError_t) -> FftError {
    match e {
        hipError_t::hipErrorOutOfMemory => FftError::AllocationFailed(format!("{what}: {e:?}")),
        _ => FftError::DeviceFailure(format!("{what}: {e:?}")),
    }
}

struct LoadedKernel {
    module: hip_sys::hipModule_t,
    function: hip_sys::hipFunction_t,
}

// Raw module handles move between threads under the runtime's lock.
unsafe impl Send for LoadedKernel {}

pub struct HipDevice {
    device_id: i32,
    arch: String,
    driver_version: u32,
    kernels: Mutex<HashMap<String, LoadedKernel>>,
    this: Weak<HipDevice>,
}

impl HipDevice {
    /// Bind to one visible device.
    pub fn open(device_id: i32) -> Result<Arc<HipDevice>> {
        unsafe {
            hip_sys::hipSetDevice(device_id)
                .ok()
                .map_err(|e| device_err("hipSetDevice", e))?;
            let mut prop = std::mem::zeroed::<hip_sys::hipDeviceProp_t>();
            hip_sys::hipGetDevicePropertiesR0600(&mut prop, device_id)
                .ok()
                .map_err(|e| device_err("hipGetDeviceProperties", e))?;
            let arch = std::ffi::CStr::from_ptr(prop.gcn_arch_name.as_ptr())
                .to_string_lossy()
                .into_owned();
            let mut version = 0i32;
            hip_sys::hipRuntimeGetVersion(&mut version)
                .ok()
                .map_err(|e| device_err("hipRuntimeGetVersion", e))?;
            Ok(Arc::new_cyclic(|this| HipDevice {
                device_id,
                arch,
                driver_version: version as u32,
                kernels: Mutex::new(HashMap::new()),
                this: this.clone(),
            }))
        }
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }
}

impl Drop for HipDevice {
    fn drop(&mut self) {
        let mut kernels = self.kernels.lock().expect("kernel table poisoned");
        for (_, k) in kernels.drain() {
            unsafe {
                let _ = hip_sys::hipModuleUnload(k.module);
            }
        }
    }
}

impl DeviceRuntime for HipDevice {
    fn alloc(&self, bytes: usize) -> Result<DevicePtr> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        unsafe {
            hip_sys::hipMalloc(&mut ptr, bytes.max(1))
                .ok()
                .map_err(|e| device_err("hipMalloc", e))?;
        }
        Ok(DevicePtr(ptr as u64))
    }

    fn free(&self, ptr: DevicePtr) {
        if !ptr.is_null() {
            unsafe {
                let _ = hip_sys::hipFree(ptr.0 as *mut c_void);
            }
        }
    }

    fn upload(&self, dst: DevicePtr, bytes: &[u8]) -> Result<()> {
        unsafe {
            hip_sys::hipMemcpy(
                dst.0 as *mut c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                hipMemcpyKind::hipMemcpyHostToDevice,
            )
            .ok()
            .map_err(|e| device_err("hipMemcpy H2D", e))
        }
    }

    fn download(&self, src: DevicePtr, bytes: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; bytes];
        unsafe {
            hip_sys::hipMemcpy(
                out.as_mut_ptr() as *mut c_void,
                src.0 as *const c_void,
                bytes,
                hipMemcpyKind::hipMemcpyDeviceToHost,
            )
            .ok()
            .map_err(|e| device_err("hipMemcpy D2H", e))?;
        }
        Ok(out)
    }

    fn default_queue(&self) -> Arc<dyn DeviceQueue> {
        Arc::new(HipStream::null(
            self.this.upgrade().expect("device dropped"),
        ))
    }

    fn compile(&self, kernel_name: &str, source: &str) -> Result<Vec<u8>> {
        let src = CString::new(source)
            .map_err(|_| FftError::invalid("kernel source contains NUL"))?;
        let name = CString::new(format!("{kernel_name}.cpp")).expect("name has no NUL");
        let arch_opt = CString::new(format!("--offload-arch={}", self.arch)).expect("no NUL");

        unsafe {
            let mut prog: hip_sys::hiprtcProgram = std::ptr::null_mut();
            let rc = hip_sys::hiprtcCreateProgram(
                &mut prog,
                src.as_ptr(),
                name.as_ptr(),
                0,
                std::ptr::null(),
                std::ptr::null(),
            );
            if rc != hip_sys::hiprtcResult::HIPRTC_SUCCESS {
                return Err(FftError::DeviceFailure(format!(
                    "hiprtcCreateProgram: {rc:?}"
                )));
            }

            let options = [arch_opt.as_ptr()];
            let rc = hip_sys::hiprtcCompileProgram(prog, options.len() as i32, options.as_ptr());
            if rc != hip_sys::hiprtcResult::HIPRTC_SUCCESS {
                let mut log_size = 0usize;
                let _ = hip_sys::hiprtcGetProgramLogSize(prog, &mut log_size);
                let mut log = vec![0u8; log_size.max(1)];
                let _ = hip_sys::hiprtcGetProgramLog(prog, log.as_mut_ptr() as *mut _);
                let _ = hip_sys::hiprtcDestroyProgram(&mut prog);
                return Err(FftError::unsupported(format!(
                    "hiprtc failed for {kernel_name}: {}",
                    String::from_utf8_lossy(&log)
                )));
            }

            let mut size = 0usize;
            hip_sys::hiprtcGetCodeSize(prog, &mut size);
            let mut code = vec![0u8; size];
            hip_sys::hiprtcGetCode(prog, code.as_mut_ptr() as *mut _);
            let _ = hip_sys::hiprtcDestroyProgram(&mut prog);
            Ok(code)
        }
    }

    fn load_code_object(&self, kernel_name: &str, code: &[u8]) -> Result<()> {
        let mut kernels = self.kernels.lock().expect("kernel table poisoned");
        if kernels.contains_key(kernel_name) {
            return Ok(());
        }
        unsafe {
            let mut module: hip_sys::hipModule_t = std::ptr::null_mut();
            hip_sys::hipModuleLoadData(&mut module, code.as_ptr() as *const c_void)
                .ok()
                .map_err(|e| device_err("hipModuleLoadData", e))?;
            let cname = CString::new(kernel_name).expect("kernel name has no NUL");
            let mut function: hip_sys::hipFunction_t = std::ptr::null_mut();
            if let Err(e) = hip_sys::hipModuleGetFunction(&mut function, module, cname.as_ptr()).ok()
            {
                let _ = hip_sys::hipModuleUnload(module);
                return Err(device_err("hipModuleGetFunction", e));
            }
            kernels.insert(kernel_name.to_string(), LoadedKernel { module, function });
        }
        Ok(())
    }

    fn arch(&self) -> String {
        self.arch.clone()
    }

    fn driver_version(&self) -> u32 {
        self.driver_version
    }
}

/// One HIP stream; launches preserve submission order on the device.
pub struct HipStream {
    device: Arc<HipDevice>,
    stream: hip_sys::hipStream_t,
    owned: bool,
}

unsafe impl Send for HipStream {}
unsafe impl Sync for HipStream {}

impl HipStream {
    fn null(device: Arc<HipDevice>) -> HipStream {
        HipStream {
            device,
            stream: std::ptr::null_mut(),
            owned: false,
        }
    }

    pub fn create(device: Arc<HipDevice>) -> Result<HipStream> {
        let mut stream: hip_sys::hipStream_t = std::ptr::null_mut();
        unsafe {
            hip_sys::hipStreamCreate(&mut stream)
                .ok()
                .map_err(|e| device_err("hipStreamCreate", e))?;
        }
        Ok(HipStream {
            device,
            stream,
            owned: true,
        })
    }
}

impl Drop for HipStream {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                let _ = hip_sys::hipStreamDestroy(self.stream);
            }
        }
    }
}

impl DeviceQueue for HipStream {
    fn launch(&self, req: &LaunchRequest) -> Result<()> {
        let kernels = self.device.kernels.lock().expect("kernel table poisoned");
        let kernel = kernels.get(&req.kernel_name).ok_or_else(|| {
            FftError::DeviceFailure(format!("kernel {} not loaded", req.kernel_name))
        })?;

        // Argument block layout matches the generated entry point signature.
        let a = &req.args;
        let mut lengths = a.lengths.clone();
        let mut in_stride = a.in_stride.clone();
        let mut out_stride = a.out_stride.clone();
        let direction: i32 = match a.direction {
            rotorfft_core::describe::Direction::Forward => -1,
            rotorfft_core::describe::Direction::Inverse => 1,
        };
        let batch = a.batch;
        let mut params: Vec<*mut c_void> = vec![
            &a.twiddles.0 as *const _ as *mut c_void,
            &a.twiddles_large.0 as *const _ as *mut c_void,
            &a.buf_in[0].0 as *const _ as *mut c_void,
            &a.buf_out[0].0 as *const _ as *mut c_void,
            lengths.as_mut_ptr() as *mut c_void,
            in_stride.as_mut_ptr() as *mut c_void,
            out_stride.as_mut_ptr() as *mut c_void,
            &direction as *const _ as *mut c_void,
            &batch as *const _ as *mut c_void,
        ];

        unsafe {
            hip_sys::hipModuleLaunchKernel(
                kernel.function,
                req.shape.grid[0],
                req.shape.grid[1],
                req.shape.grid[2],
                req.shape.block[0],
                req.shape.block[1],
                req.shape.block[2],
                req.shape.lds_bytes,
                self.stream,
                params.as_mut_ptr(),
                std::ptr::null_mut(),
            )
            .ok()
            .map_err(|e| device_err("hipModuleLaunchKernel", e))
        }
    }

    fn wait(&self) -> Result<()> {
        unsafe {
            hip_sys::hipStreamSynchronize(self.stream)
                .ok()
                .map_err(|e| device_err("hipStreamSynchronize", e))
        }
    }
}
