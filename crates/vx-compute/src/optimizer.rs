//! Bounded point optimization for per-voxel fits.
//!
//! Wraps argmin's L-BFGS behind the [`ObjectiveFunction`] trait with box
//! bounds enforced by clamping into the feasible region and projecting the
//! gradient at active bounds. [`minimize_batch`](LbfgsOptimizer::minimize_batch)
//! runs independent per-voxel fits in parallel; the noise estimator's
//! baseline fit is the main consumer.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use rayon::prelude::*;

use vx_core::error::Error;
use vx_core::Result;

/// Configuration for the L-BFGS point optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations per fit.
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm.
    pub grad_tol: f64,
    /// Convergence tolerance for the change in objective value.
    pub cost_tol: f64,
    /// Number of corrections kept for the inverse-Hessian approximation.
    pub memory: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 500, grad_tol: 1e-8, cost_tol: 1e-10, memory: 7 }
    }
}

/// Outcome of one point fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Best-fit parameters, clamped to bounds.
    pub parameters: Vec<f64>,
    /// Objective value at the minimum.
    pub objective_value: f64,
    /// Iterations used.
    pub iterations: u64,
    /// Whether the solver converged (vs hitting the iteration cap).
    pub converged: bool,
}

/// Objective function for point optimization.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at the given parameters.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at the given parameters. Central differences by default.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut probe = params.to_vec();
        let mut grad = Vec::with_capacity(params.len());
        for i in 0..params.len() {
            let h = 1e-8 * params[i].abs().max(1.0);
            probe[i] = params[i] + h;
            let ahead = self.eval(&probe)?;
            probe[i] = params[i] - h;
            let behind = self.eval(&probe)?;
            probe[i] = params[i];
            grad.push((ahead - behind) / (2.0 * h));
        }
        Ok(grad)
    }
}

/// Box constraints, one `(lo, hi)` interval per parameter.
struct BoxBounds<'a>(&'a [(f64, f64)]);

impl BoxBounds<'_> {
    fn clamp(&self, params: &[f64]) -> Vec<f64> {
        params.iter().zip(self.0).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
    }

    /// Zero gradient components that point out of the feasible region at an
    /// active bound, so the line search does not keep stepping into the
    /// clamped region.
    fn project(&self, params: &[f64], grad: &mut [f64]) {
        const EDGE: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in params.iter().zip(self.0).enumerate() {
            if (x <= lo + EDGE && grad[i] > 0.0) || (x >= hi - EDGE && grad[i] < 0.0) {
                grad[i] = 0.0;
            }
        }
    }
}

/// Adapter exposing a clamped [`ObjectiveFunction`] to argmin.
struct BoundedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: BoxBounds<'a>,
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let feasible = self.bounds.clamp(params);
        self.objective.eval(&feasible).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let feasible = self.bounds.clamp(params);
        let mut grad = self
            .objective
            .gradient(&feasible)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        self.bounds.project(&feasible, &mut grad);
        Ok(grad)
    }
}

/// L-BFGS point optimizer with clamp-based box constraints.
pub struct LbfgsOptimizer {
    config: OptimizerConfig,
}

impl LbfgsOptimizer {
    /// Create an optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` starting from `init` within `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<FitResult> {
        if init.len() != bounds.len() {
            return Err(Error::ShapeMismatch(format!(
                "starting point has {} parameter(s), bounds have {}",
                init.len(),
                bounds.len()
            )));
        }

        let start = BoxBounds(bounds).clamp(init);
        let problem = BoundedProblem { objective, bounds: BoxBounds(bounds) };

        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.memory)
            .with_tolerance_grad(self.config.grad_tol)
            .and_then(|s| s.with_tolerance_cost(self.config.cost_tol))
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerances: {e}")))?;

        let run = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("point fit failed: {e}")))?;

        let state = run.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("point fit produced no parameters".to_string()))?;
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(FitResult {
            parameters: BoxBounds(bounds).clamp(best),
            objective_value: state.get_best_cost(),
            iterations: state.get_iter(),
            converged,
        })
    }

    /// Run one independent fit per objective, in parallel.
    ///
    /// All fits share the same bounds; `inits` supplies one starting point
    /// per objective. Output order matches input order.
    pub fn minimize_batch<O: ObjectiveFunction>(
        &self,
        objectives: &[O],
        inits: &[Vec<f64>],
        bounds: &[(f64, f64)],
    ) -> Result<Vec<FitResult>> {
        if objectives.len() != inits.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} objective(s) with {} starting point(s)",
                objectives.len(),
                inits.len()
            )));
        }
        objectives
            .par_iter()
            .zip(inits)
            .map(|(objective, init)| self.minimize(objective, init, bounds))
            .collect()
    }
}

impl Default for LbfgsOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
