//! The flat host API, mirroring the C-style entry points.
//!
//! Thin wrappers over [`Plan`] and the process cache for callers that want
//! the handle-and-status shape; Rust callers can use the types directly.

use std::sync::Arc;

use crate::cache;
use crate::describe::TransformDesc;
use crate::device::{DevicePtr, DeviceRuntime};
use crate::error::Result;
use crate::exec::ExecutionInfo;
use crate::plan::Plan;

/// Library setup: opens the process-wide kernel cache. Call once before the
/// first plan; idempotent.
pub fn setup() {
    cache::cache_init();
}

/// Library cleanup: drops the process-wide kernel cache.
pub fn cleanup() {
    cache::cache_teardown();
}

pub fn plan_create(desc: TransformDesc, runtime: Arc<dyn DeviceRuntime>) -> Result<Plan> {
    Plan::create(desc, runtime)
}

pub fn plan_get_work_buffer_size(plan: &Plan) -> usize {
    plan.work_buffer_bytes()
}

pub fn plan_execute(
    plan: &mut Plan,
    in_ptrs: &[DevicePtr],
    out_ptrs: &[DevicePtr],
    info: &ExecutionInfo,
) -> Result<()> {
    plan.execute(in_ptrs, out_ptrs, info)
}

pub fn plan_destroy(plan: Plan) {
    drop(plan);
}

pub fn execution_info_create() -> ExecutionInfo {
    ExecutionInfo::new()
}

pub fn execution_info_set_work_buffer(info: &mut ExecutionInfo, ptr: DevicePtr, bytes: usize) {
    info.set_work_buffer(ptr, bytes);
}

pub fn execution_info_set_load_callback(
    info: &mut ExecutionInfo,
    fn_ptr: DevicePtr,
    data: DevicePtr,
    lds_bytes: usize,
) {
    info.set_load_callback(fn_ptr, data, lds_bytes);
}

pub fn execution_info_set_store_callback(
    info: &mut ExecutionInfo,
    fn_ptr: DevicePtr,
    data: DevicePtr,
) {
    info.set_store_callback(fn_ptr, data);
}

pub fn execution_info_set_stream(
    info: &mut ExecutionInfo,
    queue: Arc<dyn crate::device::DeviceQueue>,
) {
    info.set_queue(queue);
}

pub fn cache_serialize() -> Result<Vec<u8>> {
    cache::cache_serialize()
}

pub fn cache_deserialize(bytes: &[u8]) -> Result<()> {
    cache::cache_deserialize(bytes)
}
