//! Baseline-intensity model.

use std::sync::Arc;

use crate::data::ProblemData;
use crate::error::{ProtocolProblem, Result};
use crate::model::{seeded_point, CompositeModel, InitializationMap};
use crate::protocol::{Protocol, B_COLUMN};

/// The `S0` model: a single baseline intensity, constant across all
/// measurements. Used by the noise estimator on unweighted rows.
pub struct S0Model {
    data: Option<Arc<ProblemData>>,
    seeds: InitializationMap,
    double_precision: bool,
    noise_std: f64,
}

impl S0Model {
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

impl Default for S0Model {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeModel for S0Model {
    fn name(&self) -> &str {
        "S0"
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["S0.s0".to_string()]
    }

    fn default_parameters(&self) -> Vec<f64> {
        vec![1.0e4]
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        vec![(0.0, 1.0e10)]
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
        if params.len() != 1 {
            return Err(crate::error::Error::ShapeMismatch(format!(
                "S0 model takes 1 parameter(s), got {}",
                params.len()
            )));
        }
        let data = self.data.as_ref().ok_or_else(|| {
            crate::error::Error::Validation("no problem data bound to S0 model".to_string())
        })?;
        let s0 = if self.double_precision { params[0] } else { params[0] as f32 as f64 };
        Ok(vec![s0; data.protocol.number_of_rows()])
    }

    fn noise_std(&self) -> f64 {
        self.noise_std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    fn unweighted_protocol() -> Protocol {
        Protocol::new(vec!["b".to_string()], vec![vec![0.0], vec![0.0], vec![0.0]]).unwrap()
    }

    #[test]
    fn signal_is_constant_baseline() {
        let mut model = S0Model::new();
        model
            .set_problem_data(Arc::new(ProblemData::from_protocol(unweighted_protocol())))
            .unwrap();
        assert_eq!(model.signal(&[250.0]).unwrap(), vec![250.0; 3]);
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let mut model = S0Model::new();
        model
            .set_problem_data(Arc::new(ProblemData::from_protocol(unweighted_protocol())))
            .unwrap();
        assert!(matches!(model.signal(&[]), Err(crate::error::Error::ShapeMismatch(_))));
        assert!(matches!(model.signal(&[1.0, 2.0]), Err(crate::error::Error::ShapeMismatch(_))));
    }

    #[test]
    fn requires_an_unweighted_measurement() {
        let model = S0Model::new();
        let weighted_only =
            Protocol::new(vec!["b".to_string()], vec![vec![1e9], vec![3e9]]).unwrap();
        let problems = model.protocol_problems(&weighted_only);
        assert_eq!(problems, vec![ProtocolProblem::TooFewUnweighted { required: 1, found: 0 }]);
    }
}
