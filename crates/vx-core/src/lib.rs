//! # vx-core
//!
//! Core types for voxelfit: the acquisition [`Protocol`], per-run
//! [`ProblemData`] bundle, [`Mask`]/[`Volume`] projection, the composite vs
//! cascade [`Model`] split, and the shared error taxonomy.
//!
//! Higher layers (`vx-compute`, `vx-sampling`, `vx-sim`) depend on this
//! crate only; it has no knowledge of samplers, optimizers or devices.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Problem data bundle and voxel masks.
pub mod data;
/// Error taxonomy and `Result` alias.
pub mod error;
/// Model abstraction: composite, cascade, initialization maps.
pub mod model;
/// Built-in model registry.
pub mod models;
/// Acquisition protocol table and derived queries.
pub mod protocol;
/// Core traits shared across crates.
pub mod traits;
/// Scalar volumes and the on-disk volume-map format.
pub mod volume;

pub use data::{Mask, ProblemData};
pub use error::{Error, ProtocolProblem, Result};
pub use model::{CascadeSpec, CompositeModel, InitValue, InitializationMap, Model, ModelKind};
pub use models::get_model;
pub use protocol::{Protocol, Shell};
pub use traits::LogDensity;
pub use volume::Volume;
