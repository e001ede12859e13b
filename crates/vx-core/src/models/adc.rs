//! Mono-exponential apparent-diffusion model.

use std::sync::Arc;

use crate::data::ProblemData;
use crate::error::{Error, ProtocolProblem, Result};
use crate::model::{seeded_point, CompositeModel, InitializationMap};
use crate::protocol::{Protocol, B_COLUMN};

/// The `Adc` model: `signal(b) = s0 * exp(-b * d)`.
///
/// Parameters: `S0.s0` (baseline intensity) and `Adc.d` (apparent diffusion
/// coefficient, m^2/s). Needs at least one unweighted measurement to anchor
/// the baseline and one weighted shell to constrain the decay.
pub struct AdcModel {
    data: Option<Arc<ProblemData>>,
    seeds: InitializationMap,
    double_precision: bool,
    noise_std: f64,
}

impl AdcModel {
    /// Create the model with default settings (double precision, unit noise).
    pub fn new() -> Self {
        Self {
            data: None,
            seeds: InitializationMap::new(),
            double_precision: true,
            noise_std: 1.0,
        }
    }

    /// Fix the noise standard deviation used by the likelihood.
    pub fn set_noise_std(&mut self, sigma: f64) {
        self.noise_std = sigma;
    }
}

impl Default for AdcModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeModel for AdcModel {
    fn name(&self) -> &str {
        "Adc"
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["S0.s0".to_string(), "Adc.d".to_string()]
    }

    fn default_parameters(&self) -> Vec<f64> {
        vec![1.0e4, 1.0e-9]
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        vec![(0.0, 1.0e10), (0.0, 1.0e-8)]
    }

    fn required_protocol_columns(&self) -> Vec<String> {
        vec![B_COLUMN.to_string()]
    }

    fn protocol_problems(&self, protocol: &Protocol) -> Vec<ProtocolProblem> {
        let mut problems = Vec::new();
        if !protocol.has_column(B_COLUMN) {
            problems.push(ProtocolProblem::MissingColumn { column: B_COLUMN.to_string() });
            return problems;
        }
        let n_unweighted = protocol.unweighted_indices().len();
        if n_unweighted < 1 {
            problems.push(ProtocolProblem::TooFewUnweighted { required: 1, found: n_unweighted });
        }
        let n_shells = protocol.b_value_shells().len();
        if n_shells < 1 {
            problems.push(ProtocolProblem::TooFewShells { required: 1, found: n_shells });
        }
        problems
    }

    fn set_double_precision(&mut self, enabled: bool) {
        self.double_precision = enabled;
    }

    fn set_problem_data(&mut self, data: Arc<ProblemData>) -> Result<()> {
        self.data = Some(data);
        Ok(())
    }

    fn problem_data(&self) -> Option<&Arc<ProblemData>> {
        self.data.as_ref()
    }

    fn set_initial_parameters(&mut self, seeds: InitializationMap) {
        self.seeds = seeds;
    }

    fn initial_point(&self, roi_voxel: usize) -> Vec<f64> {
        seeded_point(
            &self.parameter_names(),
            &self.default_parameters(),
            &self.parameter_bounds(),
            &self.seeds,
            roi_voxel,
        )
    }

    fn signal(&self, params: &[f64]) -> Result<Vec<f64>> {
        if params.len() != 2 {
            return Err(Error::ShapeMismatch(format!(
                "Adc model takes 2 parameter(s), got {}",
                params.len()
            )));
        }
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::Validation("no problem data bound to Adc model".to_string()))?;
        let b = data.protocol.column(B_COLUMN)?;
        let (s0, d) = (params[0], params[1]);
        let signal = b.iter().map(|&b| {
            let value = s0 * (-b * d).exp();
            if self.double_precision {
                value
            } else {
                value as f32 as f64
            }
        });
        Ok(signal.collect())
    }

    fn noise_std(&self) -> f64 {
        self.noise_std
    }
}
