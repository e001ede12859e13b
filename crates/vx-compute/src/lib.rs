//! # vx-compute
//!
//! Compute layer for voxelfit: device enumeration/selection, the bounded
//! L-BFGS point optimizer, and the per-voxel Metropolis sampler.
//!
//! This crate depends only on `vx-core` abstractions; orchestration lives
//! in `vx-sampling`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Compute device enumeration and selection.
pub mod devices;
/// Bounded L-BFGS point optimization.
pub mod optimizer;
/// Adaptive Metropolis voxel sampler.
pub mod sampler;

pub use devices::{enumerate_devices, resolve_devices, DeviceInfo, DeviceType};
pub use optimizer::{FitResult, LbfgsOptimizer, ObjectiveFunction, OptimizerConfig};
pub use sampler::{sample_voxel, SamplerConfig, VoxelChain};
