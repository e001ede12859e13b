//! Synthetic data generation for the voxelfit pipeline.
//!
//! Parameter-grid sweeps, forward signal evaluation, Rician noise injection
//! and noise-level estimation, for validating the sampling pipeline against
//! data with known ground truth.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod grid;
pub mod noise;
pub mod signals;

pub use grid::{linspace, permutate_parameters, permuted_indices, GridSize};
pub use noise::{estimate_noise_std, get_unweighted_volumes};
pub use signals::{make_rician_distributed, signals_to_problem_data, simulate_signals};
