//! Voxel masks and the per-run problem data bundle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::volume::Volume;

/// Boolean 3-D volume selecting the voxels to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    /// Spatial dimensions.
    pub dims: [usize; 3],
    /// Flat voxel selection flags, `dims[0] * dims[1] * dims[2]` entries.
    pub data: Vec<bool>,
}

impl Mask {
    /// Create a mask, validating the flag count against the dimensions.
    pub fn new(dims: [usize; 3], data: Vec<bool>) -> Result<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(Error::ShapeMismatch(format!(
                "mask with dims {dims:?} needs {expected} flag(s), got {}",
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// A mask selecting every voxel of the given dimensions.
    pub fn all(dims: [usize; 3]) -> Self {
        let n = dims[0] * dims[1] * dims[2];
        Self { dims, data: vec![true; n] }
    }

    /// Total number of voxels (active or not).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the mask covers zero voxels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of active voxels.
    pub fn n_active(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Flat indices of the active voxels, ascending.
    pub fn active_indices(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(|(i, _)| i)
            .collect()
    }

    /// Project a volume through the mask into a flat per-active-voxel array.
    pub fn project(&self, volume: &Volume) -> Result<Vec<f64>> {
        if volume.dims != self.dims {
            return Err(Error::ShapeMismatch(format!(
                "volume dims {:?} do not match mask dims {:?}",
                volume.dims, self.dims
            )));
        }
        Ok(self.active_indices().into_iter().map(|i| volume.data[i]).collect())
    }

    /// Expand a per-active-voxel array back into a full volume, filling
    /// inactive voxels with `fill`.
    pub fn unproject(&self, values: &[f64], fill: f64) -> Result<Volume> {
        let active = self.active_indices();
        if values.len() != active.len() {
            return Err(Error::ShapeMismatch(format!(
                "got {} value(s) for mask with {} active voxel(s)",
                values.len(),
                active.len()
            )));
        }
        let mut data = vec![fill; self.len()];
        for (value, index) in values.iter().zip(active) {
            data[index] = *value;
        }
        Volume::new(self.dims, data)
    }
}

/// Immutable-for-a-run bundle of protocol, voxel signals and mask.
///
/// Owned by exactly one orchestrator invocation; shared read-only with the
/// processing strategy via [`Arc`].
#[derive(Debug, Clone)]
pub struct ProblemData {
    /// The acquisition protocol.
    pub protocol: Protocol,
    /// Per-voxel signals, indexed `(voxel, measurement)` over the full grid.
    /// `None` for protocol-only data used in forward simulation.
    pub signals: Option<Vec<Vec<f64>>>,
    /// Selection of the voxels to fit.
    pub mask: Mask,
}

impl ProblemData {
    /// Create problem data, validating signal dimensions against the
    /// protocol row count and the mask voxel count.
    pub fn new(protocol: Protocol, signals: Vec<Vec<f64>>, mask: Mask) -> Result<Self> {
        if signals.len() != mask.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} signal row(s) for a mask with {} voxel(s)",
                signals.len(),
                mask.len()
            )));
        }
        let n_measurements = protocol.number_of_rows();
        for (i, row) in signals.iter().enumerate() {
            if row.len() != n_measurements {
                return Err(Error::ShapeMismatch(format!(
                    "signal row {i} has {} measurement(s), protocol has {n_measurements}",
                    row.len()
                )));
            }
        }
        Ok(Self { protocol, signals: Some(signals), mask })
    }

    /// Protocol-only problem data for forward simulation: no signals, a
    /// single-voxel mask.
    pub fn from_protocol(protocol: Protocol) -> Self {
        Self { protocol, signals: None, mask: Mask::all([1, 1, 1]) }
    }

    /// The signal row for one voxel (flat index over the full grid).
    pub fn signal(&self, voxel: usize) -> Result<&[f64]> {
        let signals = self
            .signals
            .as_ref()
            .ok_or_else(|| Error::Validation("problem data carries no signals".to_string()))?;
        signals
            .get(voxel)
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::Validation(format!("no signal for voxel {voxel}")))
    }

    /// Wrap into an [`Arc`] for sharing with the processing strategy.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
