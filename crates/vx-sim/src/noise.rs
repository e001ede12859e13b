//! Noise standard-deviation estimation from unweighted measurements.

use vx_compute::{LbfgsOptimizer, ObjectiveFunction};
use vx_core::error::Error;
use vx_core::{Protocol, Result};

/// Restrict a signal batch and its protocol to the unweighted rows.
pub fn get_unweighted_volumes(
    signals: &[Vec<f64>],
    protocol: &Protocol,
) -> Result<(Vec<Vec<f64>>, Protocol)> {
    let indices = protocol.unweighted_indices();
    if indices.is_empty() {
        return Err(Error::Validation(
            "protocol has no unweighted measurements".to_string(),
        ));
    }
    let restricted = signals
        .iter()
        .map(|row| indices.iter().map(|&i| row[i]).collect())
        .collect();
    Ok((restricted, protocol.with_rows(&indices)?))
}

/// Half sum-of-squares of the residuals against a constant baseline, the
/// Gaussian negative log-likelihood with the noise scale fixed at 1.
struct BaselineFit<'a> {
    observed: &'a [f64],
}

impl ObjectiveFunction for BaselineFit<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        let s0 = params[0];
        Ok(self.observed.iter().map(|o| (o - s0).powi(2)).sum::<f64>() / 2.0)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let s0 = params[0];
        Ok(vec![self.observed.iter().map(|o| s0 - o).sum()])
    }
}

/// Estimate the noise standard deviation of a signal batch.
///
/// Fits a per-voxel baseline intensity to the unweighted rows by point
/// optimization, then applies the second-moment estimator
/// `mean(sqrt(mean(residual^2) / 2))` across the batch. The division by two
/// is the Rice high-SNR approximation: at large baseline-to-noise ratios the
/// magnitude residuals carry roughly half the variance of the underlying
/// complex noise.
pub fn estimate_noise_std(noisy_signals: &[Vec<f64>], protocol: &Protocol) -> Result<f64> {
    let (unweighted, _) = get_unweighted_volumes(noisy_signals, protocol)?;
    if unweighted.is_empty() {
        return Err(Error::Validation("no voxels to estimate noise from".to_string()));
    }

    tracing::debug!(n_voxels = unweighted.len(), "estimating noise std");
    let objectives: Vec<BaselineFit> =
        unweighted.iter().map(|observed| BaselineFit { observed }).collect();
    let inits: Vec<Vec<f64>> = unweighted
        .iter()
        .map(|observed| vec![observed.iter().sum::<f64>() / observed.len() as f64])
        .collect();

    let fits = LbfgsOptimizer::default().minimize_batch(&objectives, &inits, &[(0.0, 1.0e10)])?;

    let sum: f64 = unweighted
        .iter()
        .zip(&fits)
        .map(|(observed, fit)| {
            let s0 = fit.parameters[0];
            let mean_sq =
                observed.iter().map(|o| (o - s0).powi(2)).sum::<f64>() / observed.len() as f64;
            (mean_sq / 2.0).sqrt()
        })
        .sum();
    Ok(sum / unweighted.len() as f64)
}
