//! Model abstraction: composite (sampleable) vs cascade (pipeline-only).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::ProblemData;
use crate::error::{Error, ProtocolProblem, Result};
use crate::protocol::Protocol;

/// Capability tag distinguishing the two model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// A single model that can be optimized or sampled directly.
    Composite,
    /// An ordered pipeline of composite models, used for sequential
    /// initialization only. Never sampleable.
    Cascade,
}

/// A seed value for one model parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum InitValue {
    /// One value for every voxel.
    Scalar(f64),
    /// One value per active voxel, in mask projection order.
    PerVoxel(Vec<f64>),
}

/// Mapping from fully qualified parameter name (`"Compartment.param"`) to
/// seed values. Built fresh per run; immutable once handed to the strategy.
pub type InitializationMap = BTreeMap<String, InitValue>;

/// A single fittable/sampleable model.
///
/// Lifecycle: constructed via [`crate::models::get_model`], bound to one
/// [`ProblemData`] with [`set_problem_data`](CompositeModel::set_problem_data),
/// then consumed by one run.
pub trait CompositeModel: Send + Sync {
    /// Model name, unique within the registry.
    fn name(&self) -> &str;

    /// Fully qualified parameter names (`"Compartment.param"`).
    fn parameter_names(&self) -> Vec<String>;

    /// Default parameter values, aligned with [`parameter_names`](CompositeModel::parameter_names).
    fn default_parameters(&self) -> Vec<f64>;

    /// Box bounds per parameter.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Protocol columns this model requires.
    fn required_protocol_columns(&self) -> Vec<String>;

    /// Every deficiency of the given protocol with respect to this model.
    fn protocol_problems(&self, protocol: &Protocol) -> Vec<ProtocolProblem>;

    /// Whether the protocol satisfies all of this model's requirements.
    fn is_protocol_sufficient(&self, protocol: &Protocol) -> bool {
        self.protocol_problems(protocol).is_empty()
    }

    /// Select single or double precision for forward evaluation.
    fn set_double_precision(&mut self, enabled: bool);

    /// Bind the problem data for this run. The protocol must be sufficient.
    fn set_problem_data(&mut self, data: Arc<ProblemData>) -> Result<()>;

    /// The bound problem data, if any.
    fn problem_data(&self) -> Option<&Arc<ProblemData>>;

    /// Install per-parameter seed values for optimization/sampling starts.
    fn set_initial_parameters(&mut self, seeds: InitializationMap);

    /// Starting point for one voxel (index into the mask's active list):
    /// seeds where present, defaults otherwise, clamped to bounds.
    fn initial_point(&self, roi_voxel: usize) -> Vec<f64>;

    /// Forward signal: one predicted value per row of the bound protocol.
    fn signal(&self, params: &[f64]) -> Result<Vec<f64>>;

    /// Gaussian noise standard deviation used by the likelihood.
    fn noise_std(&self) -> f64 {
        1.0
    }

    /// Gaussian log-likelihood of `params` for one voxel (flat grid index),
    /// up to an additive constant.
    fn log_likelihood(&self, voxel: usize, params: &[f64]) -> Result<f64> {
        let data = self
            .problem_data()
            .ok_or_else(|| Error::Validation("no problem data bound to model".to_string()))?;
        let observed = data.signal(voxel)?;
        let predicted = self.signal(params)?;
        if predicted.len() != observed.len() {
            return Err(Error::ShapeMismatch(format!(
                "model predicted {} value(s), observed {}",
                predicted.len(),
                observed.len()
            )));
        }
        let sigma = self.noise_std();
        let mut sum_sq = 0.0;
        for (o, p) in observed.iter().zip(&predicted) {
            let r = (o - p) / sigma;
            sum_sq += r * r;
        }
        Ok(-0.5 * sum_sq - observed.len() as f64 * sigma.ln())
    }
}

/// An ordered pipeline of composite model names.
///
/// Cascades exist so one model's optimization output can seed the next;
/// they cannot be bound to data or sampled themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeSpec {
    /// Cascade name, unique within the registry.
    pub name: String,
    /// Composite model names, in execution order.
    pub steps: Vec<String>,
}

/// A registry entry: either a sampleable composite or a cascade pipeline.
pub enum Model {
    /// A single sampleable model.
    Composite(Box<dyn CompositeModel>),
    /// A sequential-initialization pipeline.
    Cascade(CascadeSpec),
}

impl Model {
    /// The model's name.
    pub fn name(&self) -> &str {
        match self {
            Model::Composite(m) => m.name(),
            Model::Cascade(c) => &c.name,
        }
    }

    /// The capability tag of this variant.
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Composite(_) => ModelKind::Composite,
            Model::Cascade(_) => ModelKind::Cascade,
        }
    }

    /// Unwrap the composite variant, rejecting cascades.
    pub fn into_composite(self) -> Result<Box<dyn CompositeModel>> {
        match self {
            Model::Composite(m) => Ok(m),
            Model::Cascade(c) => Err(Error::UnsupportedModelKind(c.name)),
        }
    }
}

impl std::fmt::Debug for dyn CompositeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompositeModel({})", self.name())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Composite(m) => write!(f, "Model::Composite({})", m.name()),
            Model::Cascade(c) => write!(f, "Model::Cascade({})", c.name),
        }
    }
}

/// Resolve the starting point for one voxel from seeds, defaults and bounds.
///
/// Shared by the built-in models' `initial_point` implementations.
pub fn seeded_point(
    names: &[String],
    defaults: &[f64],
    bounds: &[(f64, f64)],
    seeds: &InitializationMap,
    roi_voxel: usize,
) -> Vec<f64> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = match seeds.get(name) {
                Some(InitValue::Scalar(v)) => *v,
                Some(InitValue::PerVoxel(values)) => {
                    values.get(roi_voxel).copied().unwrap_or(defaults[i])
                }
                None => defaults[i],
            };
            let (lo, hi) = bounds[i];
            value.clamp(lo, hi)
        })
        .collect()
}
