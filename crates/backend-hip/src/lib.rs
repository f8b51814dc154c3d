//! ROCm/HIP device runtime for the planner. Default build: probing stubs
//! only, so dependent crates compile on machines without ROCm. Enable
//! `hip-real` for the driver-backed path.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

#[cfg(feature = "hip-real")]
mod hip_sys;
#[cfg(feature = "hip-real")]
pub mod real;

#[derive(Debug, Error)]
pub enum HipError {
    #[error("HIP support not enabled (build with feature 'hip-real')")]
    NotEnabled,
    #[error("HIP runtime not detected; install ROCm or set ROTORFFT_FORCE_HIP=1")]
    NotDetected,
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
}

fn runtime_slot() -> &'static Mutex<Option<Arc<dyn rotorfft_core::DeviceRuntime>>> {
    static SLOT: OnceLock<Mutex<Option<Arc<dyn rotorfft_core::DeviceRuntime>>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// The process's HIP runtime, opened on first call.
pub fn runtime() -> Result<Arc<dyn rotorfft_core::DeviceRuntime>, HipError> {
    let mut guard = runtime_slot().lock().expect("runtime slot poisoned");
    if let Some(rt) = guard.as_ref() {
        return Ok(rt.clone());
    }
    let rt = open_runtime()?;
    *guard = Some(rt.clone());
    Ok(rt)
}

#[cfg(feature = "hip-real")]
fn open_runtime() -> Result<Arc<dyn rotorfft_core::DeviceRuntime>, HipError> {
    if !hip_available() {
        return Err(HipError::NotDetected);
    }
    real::HipDevice::open(0)
        .map(|d| d as Arc<dyn rotorfft_core::DeviceRuntime>)
        .map_err(|e| HipError::Runtime(e.to_string()))
}

#[cfg(not(feature = "hip-real"))]
fn open_runtime() -> Result<Arc<dyn rotorfft_core::DeviceRuntime>, HipError> {
    Err(HipError::NotEnabled)
}

/// Whether the process appears to have a ROCm runtime to talk to. Checks the
/// explicit override, then ROCm install roots, library search paths, and
/// PATH entries for the usual markers.
pub fn hip_available() -> bool {
    if std::env::var("ROTORFFT_FORCE_HIP")
        .map(|flag| matches!(flag.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false)
    {
        return true;
    }

    for root in rocm_roots() {
        for lib_dir in [root.join("lib"), root.join("lib64"), root.join("hip/lib")] {
            if lib_dir.join("libamdhip64.so").exists() || lib_dir.join("libhiprtc.so").exists() {
                return true;
            }
        }
        if root.join("bin/rocminfo").exists() {
            return true;
        }
    }

    for dir in search_paths("LD_LIBRARY_PATH") {
        if dir.join("libamdhip64.so").exists() {
            return true;
        }
    }
    for dir in search_paths("PATH") {
        if dir.join("hipcc").exists() || dir.join("rocminfo").exists() {
            return true;
        }
    }
    false
}

/// Devices hinted through the environment, for reporting before the runtime
/// is opened.
pub fn device_info() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    if let Some(list) = std::env::var("ROCR_VISIBLE_DEVICES")
        .ok()
        .or_else(|| std::env::var("HIP_VISIBLE_DEVICES").ok())
    {
        for (slot, token) in list.split(',').enumerate() {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let id = token.parse::<u32>().unwrap_or(slot as u32);
            devices.push(DeviceInfo {
                id,
                name: format!("hip-device-{token}"),
            });
        }
    }
    if devices.is_empty() && hip_available() {
        devices.push(DeviceInfo {
            id: 0,
            name: "hip-device-0".into(),
        });
    }
    devices
}

fn rocm_roots() -> Vec<PathBuf> {
    let mut roots = HashSet::new();
    for key in ["ROCM_PATH", "ROCM_HOME", "HIP_PATH", "HIP_HOME"] {
        if let Some(path) = std::env::var_os(key) {
            roots.insert(PathBuf::from(path));
        }
    }
    roots.insert(PathBuf::from("/opt/rocm"));
    if let Ok(entries) = std::fs::read_dir("/opt") {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with("rocm"))
            {
                roots.insert(path);
            }
        }
    }
    roots.into_iter().collect()
}

fn search_paths(key: &str) -> Vec<PathBuf> {
    std::env::var_os(key)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default()
}
