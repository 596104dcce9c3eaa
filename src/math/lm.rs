//! Least squares through the `levenberg-marquardt` crate.
//!
//! The fitter talks to the optimizer only through the [`Optimizer`] trait, so a
//! different minimizer can be plugged in without touching the orchestration.
//! [`LevenbergMarquardt`] is the default implementation. It adapts a
//! [`LeastSquaresProblem`] over named parameters to the crate's MINPACK-style
//! solver:
//!
//! - only varying parameters enter the solver's parameter vector
//! - box bounds are enforced by clamping whenever the solver sets parameters
//! - the Jacobian is a forward difference over the varying parameters
//! - standard errors come from `(JᵀJ)⁻¹` at the minimum, optionally scaled
//!   by the reduced chi-square
//!
//! Parameter scales in resonator fits differ by many orders of magnitude
//! (a resonance frequency near 1e9 next to losses near 1e-5). The solver's
//! diagonal scaling handles this during the search, and the covariance
//! inversion is done in the basis that normalizes the diagonal of `JᵀJ`.

use std::cell::{Cell, RefCell};

use levenberg_marquardt::TerminationReason;
use log::{debug, warn};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::domain::{FitDiagnostics, FitResult, Parameters};
use crate::error::ResonatorError;

/// Options passed through to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Iteration budget; the solver stops after `max_iterations * (n + 1)`
    /// residual evaluations for `n` varying parameters.
    pub max_iterations: usize,
    /// Relative chi-square reduction below which the fit is converged.
    pub ftol: f64,
    /// Relative parameter step below which the fit is converged.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns below which the
    /// fit is converged.
    pub gtol: f64,
    /// Factor bounding the initial step.
    pub stepbound: f64,
    /// Scale the covariance by the reduced chi-square.
    pub scale_covariance: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 0.0,
            stepbound: 100.0,
            scale_covariance: true,
        }
    }
}

/// A real-valued least squares problem over named parameters.
pub trait LeastSquaresProblem {
    /// Length of the residual vector.
    fn residual_len(&self) -> usize;

    /// Residual channels that carry weight; used for degrees of freedom.
    fn active_residuals(&self) -> usize {
        self.residual_len()
    }

    /// Write the weighted residuals for `params` into `out`.
    fn residuals(&self, params: &Parameters, out: &mut [f64]) -> Result<(), ResonatorError>;
}

/// A least squares minimizer.
pub trait Optimizer: Send + Sync {
    fn minimize(
        &self,
        problem: &dyn LeastSquaresProblem,
        initial: &Parameters,
        options: &FitOptions,
    ) -> Result<FitResult, ResonatorError>;
}

/// Relative finite-difference step (≈ √ε).
const FD_STEP: f64 = 1.49e-8;

/// Attempts at enlarging an unresolvable finite-difference step.
const FD_GROWTH_STEPS: usize = 4;

/// Default optimizer, backed by `levenberg_marquardt::LevenbergMarquardt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl Optimizer for LevenbergMarquardt {
    fn minimize(
        &self,
        problem: &dyn LeastSquaresProblem,
        initial: &Parameters,
        options: &FitOptions,
    ) -> Result<FitResult, ResonatorError> {
        let names: Vec<String> = initial
            .iter()
            .filter(|(_, p)| p.vary && p.min.zip(p.max).is_none_or(|(lo, hi)| lo < hi))
            .map(|(name, _)| name.to_string())
            .collect();
        if names.is_empty() {
            return Err(ResonatorError::Optimizer("no varying parameters".into()));
        }
        if initial.iter().any(|(_, p)| !p.value.is_finite()) {
            return Err(ResonatorError::Optimizer("initial parameter values must be finite".into()));
        }

        // Start inside the bounds.
        let mut start = initial.clone();
        for name in &names {
            if let Some(p) = start.get_mut(name) {
                p.value = p.clamp(p.value);
            }
        }
        let adapter = NamedProblem::new(problem, &names, start);
        adapter.take_failure()?;
        if !adapter.chi_square().is_some_and(f64::is_finite) {
            return Err(ResonatorError::Optimizer(
                "residuals are not finite at the initial parameters".into(),
            ));
        }

        let solver = levenberg_marquardt::LevenbergMarquardt::<f64>::new()
            .with_ftol(options.ftol)
            .with_xtol(options.xtol)
            .with_gtol(options.gtol)
            .with_stepbound(options.stepbound)
            .with_patience(options.max_iterations.max(1));
        let (adapter, report) = solver.minimize(adapter);
        adapter.take_failure()?;

        let n = names.len();
        let chi2 = adapter.chi_square().unwrap_or(f64::INFINITY);
        let dof = problem.active_residuals().saturating_sub(n);
        let redchi = (dof > 0 && chi2.is_finite()).then(|| chi2 / dof as f64);
        let mut message = termination_message(&report.termination);

        let errors = adapter
            .forward_difference()
            .and_then(|jac| standard_errors(&jac, redchi.filter(|_| options.scale_covariance)));
        adapter.take_failure()?;
        if errors.is_none() {
            warn!("covariance matrix is singular; standard errors are unavailable");
            message.push_str("; covariance matrix is singular");
        }

        let iterations = adapter.jacobians.get();
        let function_evaluations = adapter.evaluations.get();
        let mut params = adapter.params;
        for (j, name) in names.iter().enumerate() {
            if let Some(p) = params.get_mut(name) {
                p.stderr = errors.as_ref().and_then(|e| e[j]);
            }
        }

        debug!(
            "levenberg-marquardt finished after {iterations} iterations ({function_evaluations} evaluations): chi2={chi2:.6e}, {message}"
        );

        Ok(FitResult {
            params,
            init_params: initial.clone(),
            diagnostics: FitDiagnostics {
                success: report.termination.was_successful() && chi2.is_finite(),
                message,
                iterations,
                function_evaluations,
                chi_square: chi2,
                reduced_chi_square: redchi,
                data_points: problem.active_residuals(),
                varying_parameters: n,
            },
        })
    }
}

fn termination_message(reason: &TerminationReason) -> String {
    match reason {
        TerminationReason::ResidualsZero => "exact fit".into(),
        TerminationReason::Converged { ftol: true, .. } => {
            "relative reduction in chi-square below ftol".into()
        }
        TerminationReason::Converged { .. } => "relative parameter step below xtol".into(),
        TerminationReason::Orthogonal => "residuals orthogonal to the Jacobian".into(),
        TerminationReason::LostPatience => "maximum number of iterations reached".into(),
        other => format!("{other:?}"),
    }
}

/// The solver's view of a [`LeastSquaresProblem`]: a vector over the varying
/// parameters, with everything else held at its current value.
///
/// The solver cannot carry errors, so the first failed evaluation is kept and
/// reported once minimization returns.
struct NamedProblem<'a> {
    problem: &'a dyn LeastSquaresProblem,
    names: &'a [String],
    params: Parameters,
    current: Option<DVector<f64>>,
    evaluations: Cell<usize>,
    jacobians: Cell<usize>,
    failure: RefCell<Option<ResonatorError>>,
}

impl<'a> NamedProblem<'a> {
    fn new(problem: &'a dyn LeastSquaresProblem, names: &'a [String], params: Parameters) -> Self {
        let mut adapter = Self {
            problem,
            names,
            params,
            current: None,
            evaluations: Cell::new(0),
            jacobians: Cell::new(0),
            failure: RefCell::new(None),
        };
        adapter.current = adapter.evaluate(&adapter.params);
        adapter
    }

    fn values(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.names.len(),
            self.names.iter().map(|k| self.params.get(k).map_or(0.0, |p| p.value)),
        )
    }

    fn with_values(&self, x: &DVector<f64>) -> Parameters {
        let mut out = self.params.clone();
        for (name, &v) in self.names.iter().zip(x.iter()) {
            if let Some(p) = out.get_mut(name) {
                p.value = v;
            }
        }
        out
    }

    fn evaluate(&self, params: &Parameters) -> Option<DVector<f64>> {
        self.evaluations.set(self.evaluations.get() + 1);
        let mut r = DVector::<f64>::zeros(self.problem.residual_len());
        match self.problem.residuals(params, r.as_mut_slice()) {
            Ok(()) => Some(r),
            Err(err) => {
                self.failure.borrow_mut().get_or_insert(err);
                None
            }
        }
    }

    fn chi_square(&self) -> Option<f64> {
        self.current.as_ref().map(|r| r.norm_squared())
    }

    fn take_failure(&self) -> Result<(), ResonatorError> {
        match self.failure.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forward-difference Jacobian at the current parameters.
    ///
    /// Steps that would leave the bounds are taken backwards instead. A step
    /// too small to change the residuals (a parameter guessed as exactly zero,
    /// say) is enlarged a few times before the column is accepted.
    fn forward_difference(&self) -> Option<DMatrix<f64>> {
        let r0 = self.current.as_ref()?;
        let x = self.values();
        let m = r0.len();
        let resolution = 1e-10 * r0.amax().max(1e-300);
        let mut jac = DMatrix::<f64>::zeros(m, self.names.len());
        for (j, name) in self.names.iter().enumerate() {
            let mut h = FD_STEP * x[j].abs();
            if h == 0.0 {
                h = FD_STEP;
            }
            for _ in 0..FD_GROWTH_STEPS {
                if self.params.get(name).and_then(|p| p.max).is_some_and(|hi| x[j] + h > hi) {
                    h = -h.abs();
                }
                let mut shifted = x.clone();
                shifted[j] += h;
                let r = self.evaluate(&self.with_values(&shifted))?;
                let step = shifted[j] - x[j];
                let mut change = 0.0_f64;
                for i in 0..m {
                    let d = r[i] - r0[i];
                    change = change.max(d.abs());
                    jac[(i, j)] = d / step;
                }
                if change > resolution {
                    break;
                }
                h *= 1e3;
            }
        }
        Some(jac)
    }
}

impl levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn> for NamedProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (name, &v) in self.names.iter().zip(x.iter()) {
            if let Some(p) = self.params.get_mut(name) {
                p.value = p.clamp(v);
            }
        }
        self.current = self.evaluate(&self.params);
    }

    fn params(&self) -> DVector<f64> {
        self.values()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.current.clone()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobians.set(self.jacobians.get() + 1);
        self.forward_difference()
    }
}

/// Per-parameter standard errors, `None` when `JᵀJ` cannot be inverted.
fn standard_errors(jac: &DMatrix<f64>, redchi: Option<f64>) -> Option<Vec<Option<f64>>> {
    let jtj = jac.transpose() * jac;
    let n = jtj.nrows();
    let mut scale = Vec::with_capacity(n);
    for j in 0..n {
        let d = jtj[(j, j)];
        if !(d > 0.0 && d.is_finite()) {
            return None;
        }
        scale.push(1.0 / d.sqrt());
    }
    let scaled = DMatrix::from_fn(n, n, |i, j| jtj[(i, j)] * scale[i] * scale[j]);
    let inverse = scaled.try_inverse()?;
    let factor = redchi.unwrap_or(1.0);
    Some(
        (0..n)
            .map(|j| {
                let var = inverse[(j, j)] * scale[j] * scale[j] * factor;
                (var.is_finite() && var >= 0.0).then(|| var.sqrt())
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parameter;
    use approx::assert_relative_eq;

    /// y = a * exp(-x / tau), sampled without noise.
    struct Decay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for Decay {
        fn residual_len(&self) -> usize {
            self.x.len()
        }

        fn residuals(&self, params: &Parameters, out: &mut [f64]) -> Result<(), ResonatorError> {
            let a = params.value("a")?;
            let tau = params.value("tau")?;
            for (i, (&x, &y)) in self.x.iter().zip(&self.y).enumerate() {
                out[i] = a * (-x / tau).exp() - y;
            }
            Ok(())
        }
    }

    fn decay() -> Decay {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y = x.iter().map(|x| 3.0 * (-x / 1.5).exp()).collect();
        Decay { x, y }
    }

    #[test]
    fn recovers_exponential_decay() {
        let initial = Parameters::new()
            .with("a", Parameter::new(1.0))
            .with("tau", Parameter::new(0.5).with_min(1e-3));
        let result = LevenbergMarquardt
            .minimize(&decay(), &initial, &FitOptions::default())
            .unwrap();

        let d = &result.diagnostics;
        assert!(d.success, "{}", d.message);
        assert_relative_eq!(result.params.value("a").unwrap(), 3.0, max_relative = 1e-6);
        assert_relative_eq!(result.params.value("tau").unwrap(), 1.5, max_relative = 1e-6);
        assert_eq!(result.init_params, initial);
        assert!(d.iterations > 0);
        assert!(d.function_evaluations > d.iterations);
        assert_eq!(d.reduced_chi_square.map(|r| r >= 0.0), Some(true));
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let initial = Parameters::new()
            .with("a", Parameter::fixed(3.0))
            .with("tau", Parameter::new(1.0));
        let result = LevenbergMarquardt
            .minimize(&decay(), &initial, &FitOptions::default())
            .unwrap();
        assert_eq!(result.params.value("a").unwrap(), 3.0);
        assert_eq!(result.diagnostics.varying_parameters, 1);
        assert!(result.params.get("a").unwrap().stderr.is_none());
    }

    #[test]
    fn bounds_are_respected() {
        let initial = Parameters::new()
            .with("a", Parameter::new(1.0).with_max(2.0))
            .with("tau", Parameter::new(1.0));
        let result = LevenbergMarquardt
            .minimize(&decay(), &initial, &FitOptions::default())
            .unwrap();
        assert!(result.params.value("a").unwrap() <= 2.0);
    }

    #[test]
    fn nothing_to_vary_is_an_error() {
        let initial = Parameters::new()
            .with("a", Parameter::fixed(3.0))
            .with("tau", Parameter::fixed(1.5));
        let err = LevenbergMarquardt
            .minimize(&decay(), &initial, &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, ResonatorError::Optimizer(_)));
    }

    #[test]
    fn failed_evaluation_is_returned() {
        let initial = Parameters::new().with("a", Parameter::new(1.0));
        let err = LevenbergMarquardt
            .minimize(&decay(), &initial, &FitOptions::default())
            .unwrap_err();
        assert_eq!(err, ResonatorError::UnknownParameter("tau".into()));
    }

    #[test]
    fn no_degrees_of_freedom_leaves_reduced_chi_square_empty() {
        let problem = Decay {
            x: vec![0.0, 1.0],
            y: vec![3.0, 3.0 * (-1.0_f64 / 1.5).exp()],
        };
        let initial = Parameters::new()
            .with("a", Parameter::new(2.0))
            .with("tau", Parameter::new(1.0));
        let result = LevenbergMarquardt
            .minimize(&problem, &initial, &FitOptions::default())
            .unwrap();
        assert_eq!(result.diagnostics.reduced_chi_square, None);
    }
}
