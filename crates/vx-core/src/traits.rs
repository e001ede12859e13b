//! Core traits shared across the voxelfit crates.
//!
//! Defined here so samplers and optimizers can target an abstraction
//! instead of concrete model types.

use crate::error::Result;

/// An unnormalized log target density over a parameter vector.
///
/// Implemented per voxel by the sampling worker; consumed by the
/// Metropolis sampler in `vx-compute`.
pub trait LogDensity: Sync {
    /// Log density (up to an additive constant) at the given parameters.
    fn log_density(&self, params: &[f64]) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StandardNormal;

    impl LogDensity for StandardNormal {
        fn log_density(&self, params: &[f64]) -> Result<f64> {
            Ok(-0.5 * params.iter().map(|x| x * x).sum::<f64>())
        }
    }

    #[test]
    fn log_density_object_safe() {
        let target: &dyn LogDensity = &StandardNormal;
        assert_eq!(target.log_density(&[0.0]).unwrap(), 0.0);
    }
}
