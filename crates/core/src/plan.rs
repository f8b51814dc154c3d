//! Plan construction pipeline and plan lifetime.
//!
//! `Plan::create` runs the whole pipeline: validate the description, build
//! the node tree, fuse shims, assign buffers, materialize twiddle tables on
//! the device, and compile any runtime-generated kernels through the cache.
//! A failure at any stage returns the error and hands nothing back; a
//! successful plan owns its twiddle and chirp storage and frees them on
//! drop.

use std::collections::HashMap;
use std::sync::Arc;

use crate::assign::{assign_buffers, Assignment};
use crate::builder::build_tree;
use crate::catalog::{Catalog, KernelPool};
use crate::describe::TransformDesc;
use crate::device::{DevicePtr, DeviceRuntime};
use crate::error::{FftError, Result};
use crate::exec::{self, ExecContext, ExecutionInfo, PlanState};
use crate::fuse::fuse_shims;
use crate::node::PlanTree;
use crate::rtc::KernelSpec;
use crate::scheme::Scheme;
use crate::twiddle::{TwiddleSpec, TwiddleTable};

pub struct Plan {
    desc: TransformDesc,
    tree: PlanTree,
    pool: KernelPool<'static>,
    assignment: Assignment,
    state: PlanState,
    twiddles: HashMap<TwiddleSpec, DevicePtr>,
    chirp: DevicePtr,
    allocs: Vec<DevicePtr>,
    runtime: Arc<dyn DeviceRuntime>,
}

impl Plan {
    pub fn create(desc: TransformDesc, runtime: Arc<dyn DeviceRuntime>) -> Result<Plan> {
        let desc = desc.validated()?;
        let mut pool = KernelPool::new(Catalog::builtin());
        let mut tree = build_tree(&desc, &mut pool)?;

        fuse_shims(&mut tree, &pool);

        let out_elem_bytes = if desc.out_type.is_real() {
            desc.precision.real_bytes()
        } else {
            desc.precision.complex_bytes()
        };
        let user_out_bytes = desc.out_dist * desc.batch * out_elem_bytes;
        let assignment = assign_buffers(&mut tree, desc.placement, user_out_bytes)?;

        let mut plan = Plan {
            desc,
            tree,
            pool,
            assignment,
            state: PlanState::BuffersAssigned,
            twiddles: HashMap::new(),
            chirp: DevicePtr::NULL,
            allocs: Vec::new(),
            runtime,
        };
        plan.materialize_twiddles()?;
        plan.compile_kernels()?;
        plan.state = PlanState::Ready;
        Ok(plan)
    }

    pub fn description(&self) -> &TransformDesc {
        &self.desc
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    /// Bytes of scratch the caller must (or the library will) provide per
    /// execution.
    pub fn work_buffer_bytes(&self) -> usize {
        self.assignment.work_bytes()
    }

    /// Number of kernel launches one execution performs.
    pub fn launch_count(&self) -> usize {
        self.tree.leaves().len()
    }

    fn alloc(&mut self, bytes: usize) -> Result<DevicePtr> {
        let ptr = self
            .runtime
            .alloc(bytes)
            .map_err(|e| FftError::AllocationFailed(e.to_string()))?;
        self.allocs.push(ptr);
        Ok(ptr)
    }

    /// Generate, upload, and deduplicate every table the leaves reference;
    /// size and allocate the Bluestein chirp storage.
    fn materialize_twiddles(&mut self) -> Result<()> {
        let mut wanted: Vec<TwiddleSpec> = Vec::new();
        for id in self.tree.leaves() {
            let node = self.tree.get(id);
            for spec in [&node.small_twiddle, &node.large_twiddle] {
                if let Some(spec) = spec {
                    if !wanted.contains(spec) {
                        wanted.push(spec.clone());
                    }
                }
            }
        }
        for spec in wanted {
            if self.twiddles.contains_key(&spec) {
                continue;
            }
            let table = TwiddleTable::generate(&spec);
            let bytes = table.to_bytes();
            let ptr = self.alloc(bytes.len())?;
            self.runtime
                .upload(ptr, &bytes)
                .map_err(|e| FftError::DeviceFailure(e.to_string()))?;
            self.twiddles.insert(spec, ptr);
        }

        // Chirp storage: M padded slots for the convolution sequence plus N
        // raw chirp phases, written on-device by the chirp kernel.
        let mut chirp_bytes = 0usize;
        for id in self.tree.post_order() {
            let node = self.tree.get(id);
            if matches!(
                node.scheme,
                Scheme::Bluestein | Scheme::RealTransformUsingCmplx
            ) {
                let m = self
                    .tree
                    .get(node.children[0])
                    .lengths
                    .first()
                    .copied()
                    .unwrap_or(0);
                let n = self.tree.get(node.children[0]).large1d;
                chirp_bytes =
                    chirp_bytes.max((m + n) * node.precision.complex_bytes());
            }
        }
        if chirp_bytes > 0 {
            self.chirp = self.alloc(chirp_bytes)?;
        }

        self.state = PlanState::TwiddlesMaterialized;
        Ok(())
    }

    /// Compile every runtime-generated kernel the leaves use, through the
    /// process cache, and hand the code objects to the driver.
    fn compile_kernels(&mut self) -> Result<()> {
        let mut compiled: Vec<String> = Vec::new();
        for id in self.tree.leaves() {
            let node = self.tree.get(id);
            let Some(key) = node.kernel else { continue };
            let Some(entry) = self.pool.lookup(&key) else {
                continue;
            };
            if !entry.runtime_compile {
                continue;
            }
            let Some(spec) = KernelSpec::from_entry(entry) else {
                continue;
            };
            let name = spec.kernel_name();
            if compiled.contains(&name) {
                continue;
            }
            let code = crate::rtc::compile_with_cache(&spec, &*self.runtime)?;
            self.runtime
                .load_code_object(&name, &code)
                .map_err(|e| FftError::DeviceFailure(e.to_string()))?;
            compiled.push(name);
        }
        Ok(())
    }

    /// Run the plan. `in_ptrs`/`out_ptrs` carry one address per plane
    /// (planar arrays use two); for in-place plans `out_ptrs` may be empty.
    pub fn execute(
        &mut self,
        in_ptrs: &[DevicePtr],
        out_ptrs: &[DevicePtr],
        info: &ExecutionInfo,
    ) -> Result<()> {
        if self.state != PlanState::Ready {
            return Err(FftError::invalid(format!(
                "plan cannot execute in state {:?}",
                self.state
            )));
        }
        self.state = PlanState::Executing;

        // Transparent work buffer: allocated here, freed when the execution
        // completes.
        let need = self.assignment.work_bytes();
        let mut transient: Option<DevicePtr> = None;
        let work = match info.work {
            Some(w) => Some(w),
            None if need > 0 => {
                let ptr = match self.runtime.alloc(need) {
                    Ok(p) => p,
                    Err(e) => {
                        self.state = PlanState::Failed;
                        return Err(FftError::AllocationFailed(e.to_string()));
                    }
                };
                transient = Some(ptr);
                Some((ptr, need))
            }
            None => None,
        };

        let queue = info
            .queue
            .clone()
            .unwrap_or_else(|| self.runtime.default_queue());
        let ctx = ExecContext {
            tree: &self.tree,
            pool: &self.pool,
            assignment: &self.assignment,
            placement: self.desc.placement,
            twiddles: &self.twiddles,
            chirp: self.chirp,
        };
        let mut result = exec::execute(&ctx, in_ptrs, out_ptrs, work, info, &queue);

        if let Some(ptr) = transient {
            // The transient buffer cannot outlive the launches that use it.
            if result.is_ok() {
                result = queue.wait();
            }
            self.runtime.free(ptr);
        }

        match &result {
            Ok(()) => self.state = PlanState::Ready,
            // An undersized work buffer is recoverable; the caller can retry
            // with a proper one.
            Err(FftError::InvalidWorkBuffer { .. }) => self.state = PlanState::Ready,
            Err(_) => self.state = PlanState::Failed,
        }
        result
    }
}

impl Drop for Plan {
    fn drop(&mut self) {
        for ptr in self.allocs.drain(..) {
            self.runtime.free(ptr);
        }
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("lengths", &self.desc.lengths)
            .field("state", &self.state)
            .field("work_bytes", &self.assignment.work_bytes())
            .field("launches", &self.launch_count())
            .finish()
    }
}
