//! Plan construction and execution core for batched FFTs on GPUs.
//!
//! The pipeline: a declarative [`describe::TransformDesc`] becomes a tree of
//! execution nodes ([`builder`]), the tree is rewritten for fewer launches
//! ([`fuse`]), every node gets its buffer identities ([`assign`]), twiddle
//! tables are materialized and runtime kernels compiled ([`plan`]), and the
//! [`exec`] walk dispatches the leaves in order through a backend's
//! [`device::DeviceQueue`].

pub mod api;
pub mod assign;
pub mod builder;
pub mod cache;
pub mod catalog;
pub mod describe;
pub mod device;
pub mod error;
pub mod exec;
pub mod factor;
pub mod fuse;
pub mod node;
pub mod plan;
pub mod rtc;
pub mod scheme;
pub mod twiddle;

pub use describe::{ArrayType, Direction, Placement, Precision, TransformDesc};
pub use device::{DevicePtr, DeviceQueue, DeviceRuntime};
pub use error::{FftError, Result};
pub use exec::{ExecutionInfo, PlanState};
pub use plan::Plan;

#[cfg(test)]
mod _tests_cache;
#[cfg(test)]
mod _tests_catalog;
#[cfg(test)]
mod _tests_describe;
#[cfg(test)]
mod _tests_fuse;
#[cfg(test)]
mod _tests_rtc;
