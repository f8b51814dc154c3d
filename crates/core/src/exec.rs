//! Execution of a finalized plan tree.
//!
//! The walk is post-order; internal nodes contribute no launches. Per leaf,
//! the executor maps buffer identities onto device addresses, fills the
//! launch arguments the way the device entry points expect them, computes
//! the grid from the catalog entry, and submits in order to one queue. The
//! queue's in-order semantics carry the data dependencies between
//! consecutive leaves; the only host wait is the optional terminal one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::assign::Assignment;
use crate::catalog::KernelPool;
use crate::describe::Placement;
use crate::device::{
    CallbackSpec, DevicePtr, DeviceQueue, KernelArgs, LaunchRequest, LaunchShape,
};
use crate::error::{FftError, Result};
use crate::node::{BufferId, NodeId, PlanTree};
use crate::rtc::KernelSpec;
use crate::scheme::Scheme;
use crate::twiddle::TwiddleSpec;

/// Plan lifetime states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Built,
    BuffersAssigned,
    TwiddlesMaterialized,
    Ready,
    Executing,
    Failed,
}

/// Per-execution knobs, the `exec_info` of the host API.
#[derive(Default, Clone)]
pub struct ExecutionInfo {
    pub(crate) work: Option<(DevicePtr, usize)>,
    pub(crate) load_cb: Option<CallbackSpec>,
    pub(crate) store_cb: Option<CallbackSpec>,
    pub(crate) queue: Option<Arc<dyn DeviceQueue>>,
    /// Block the host until the plan's last kernel completes.
    pub(crate) wait: bool,
}

impl ExecutionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_work_buffer(&mut self, ptr: DevicePtr, bytes: usize) {
        self.work = Some((ptr, bytes));
    }

    pub fn set_load_callback(&mut self, fn_ptr: DevicePtr, data: DevicePtr, lds_bytes: usize) {
        self.load_cb = Some(CallbackSpec {
            fn_ptr,
            data,
            lds_bytes,
        });
    }

    pub fn set_store_callback(&mut self, fn_ptr: DevicePtr, data: DevicePtr) {
        self.store_cb = Some(CallbackSpec {
            fn_ptr,
            data,
            lds_bytes: 0,
        });
    }

    pub fn set_queue(&mut self, queue: Arc<dyn DeviceQueue>) {
        self.queue = Some(queue);
    }

    pub fn set_wait(&mut self, wait: bool) {
        self.wait = wait;
    }
}

/// Everything execute() needs besides the caller's pointers.
pub(crate) struct ExecContext<'p> {
    pub tree: &'p PlanTree,
    pub pool: &'p KernelPool<'static>,
    pub assignment: &'p Assignment,
    pub placement: Placement,
    pub twiddles: &'p HashMap<TwiddleSpec, DevicePtr>,
    pub chirp: DevicePtr,
}

pub(crate) fn execute(
    ctx: &ExecContext<'_>,
    in_ptrs: &[DevicePtr],
    out_ptrs: &[DevicePtr],
    work: Option<(DevicePtr, usize)>,
    info: &ExecutionInfo,
    queue: &Arc<dyn DeviceQueue>,
) -> Result<()> {
    let need = ctx.assignment.work_bytes();
    let work_base = match work {
        Some((ptr, bytes)) => {
            if bytes < need {
                return Err(FftError::InvalidWorkBuffer {
                    needed: need,
                    supplied: bytes,
                });
            }
            ptr
        }
        None if need == 0 => DevicePtr::NULL,
        None => {
            return Err(FftError::InvalidWorkBuffer {
                needed: need,
                supplied: 0,
            });
        }
    };

    // Work buffer partition: A, then B, then C.
    let a_base = work_base;
    let b_base = a_base.offset(ctx.assignment.temp_bytes[0]);
    let c_base = b_base.offset(ctx.assignment.temp_bytes[1]);

    let resolve = |buf: BufferId, want_out: bool| -> Result<[DevicePtr; 2]> {
        let pick = |ptrs: &[DevicePtr]| -> [DevicePtr; 2] {
            [
                ptrs.first().copied().unwrap_or(DevicePtr::NULL),
                ptrs.get(1).copied().unwrap_or(DevicePtr::NULL),
            ]
        };
        Ok(match buf {
            BufferId::UserIn => pick(in_ptrs),
            BufferId::UserOut => {
                if ctx.placement == Placement::InPlace || out_ptrs.is_empty() {
                    pick(in_ptrs)
                } else {
                    pick(out_ptrs)
                }
            }
            BufferId::TempA => [a_base, DevicePtr::NULL],
            BufferId::TempB => [b_base, DevicePtr::NULL],
            BufferId::TempC => [c_base, DevicePtr::NULL],
            BufferId::TempBluestein => [ctx.chirp, DevicePtr::NULL],
            BufferId::Unset => {
                let side = if want_out { "output" } else { "input" };
                return Err(FftError::DeviceFailure(format!(
                    "leaf dispatched with unassigned {side} buffer"
                )));
            }
        })
    };

    for id in ctx.tree.leaves() {
        let req = build_launch(ctx, id, &resolve, info)?;
        log::debug!(
            "launch {} grid={:?} block={:?}",
            req.kernel_name,
            req.shape.grid,
            req.shape.block
        );
        queue.launch(&req)?;
    }

    if info.wait {
        queue.wait()?;
    }
    Ok(())
}

fn build_launch(
    ctx: &ExecContext<'_>,
    id: NodeId,
    resolve: &dyn Fn(BufferId, bool) -> Result<[DevicePtr; 2]>,
    info: &ExecutionInfo,
) -> Result<LaunchRequest> {
    let node = ctx.tree.get(id);
    let key = node
        .kernel
        .ok_or_else(|| FftError::DeviceFailure(format!("{} leaf has no kernel", node.scheme)))?;
    let entry = ctx
        .pool
        .lookup(&key)
        .ok_or_else(|| FftError::DeviceFailure(format!("no catalog entry for {}", node.scheme)))?;

    let twiddle_ptr = |spec: &Option<TwiddleSpec>| -> DevicePtr {
        spec.as_ref()
            .and_then(|s| ctx.twiddles.get(s).copied())
            .unwrap_or(DevicePtr::NULL)
    };

    // Transforms this launch covers: every non-transform dim times batch.
    let transforms = node.lengths[1..].iter().product::<usize>().max(1) * node.batch;
    let tpb = entry.transforms_per_block.max(1);
    let shape = match node.scheme {
        Scheme::KernelTranspose => {
            // Tiled 2D grid over the two fastest dims.
            const TILE: usize = 64;
            let tiles_x = node.lengths[0].div_ceil(TILE);
            let rest = node.lengths[1..].iter().product::<usize>().max(1) * node.batch;
            let tiles_y = node.lengths.get(1).copied().unwrap_or(1).div_ceil(TILE);
            let planes = rest / node.lengths.get(1).copied().unwrap_or(1).max(1);
            LaunchShape {
                grid: [tiles_x as u32, tiles_y as u32, planes.max(1) as u32],
                block: [entry.workgroup_size as u32, 1, 1],
                lds_bytes: 0,
            }
        }
        _ => LaunchShape {
            grid: [transforms.div_ceil(tpb) as u32, 1, 1],
            block: [entry.workgroup_size as u32, 1, 1],
            lds_bytes: entry.lds_bytes().min(crate::catalog::LDS_BYTE_BUDGET) as u32,
        },
    };

    let spec_name = KernelSpec::from_entry(entry)
        .map(|s| s.kernel_name())
        .unwrap_or_else(|| format!("dfn_builtin_{}_{}", node.scheme, node.lengths[0]));

    Ok(LaunchRequest {
        kernel_name: spec_name,
        shape,
        args: KernelArgs {
            buf_in: resolve(node.in_buf, false)?,
            buf_out: resolve(node.out_buf, true)?,
            twiddles: twiddle_ptr(&node.small_twiddle),
            twiddles_large: twiddle_ptr(&node.large_twiddle),
            chirp: if node.bluestein_aux {
                ctx.chirp
            } else {
                DevicePtr::NULL
            },
            lengths: node.lengths.clone(),
            in_stride: node.in_stride.clone(),
            out_stride: node.out_stride.clone(),
            in_dist: node.in_dist,
            out_dist: node.out_dist,
            batch: node.batch,
            precision: node.precision,
            direction: node.direction,
            in_type: node.in_type,
            out_type: node.out_type,
            scheme: node.scheme,
            transpose_variant: node.transpose_variant,
            sbrc_variant: node.sbrc_variant,
            large1d: node.large1d,
            load_cb: info.load_cb,
            store_cb: info.store_cb,
        },
    })
}
