//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - handed to plotting code outside this crate

use clap::ValueEnum;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::domain::Parameters;
use crate::error::ResonatorError;

/// Resonator topology to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ForegroundKind {
    /// Shunt-coupled to a transmission line, measured in S21.
    Shunt,
    /// Single-port reflection, measured in S11.
    Reflection,
}

/// Background shape to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundKind {
    /// Data is already normalized.
    Unit,
    /// Constant complex gain.
    MagnitudePhase,
    /// Linear magnitude with cable delay about the sweep center.
    SlopeDelay,
}

/// A frequency sweep (or continuous-wave record) of complex scattering data.
///
/// Invariants, checked on construction:
/// - `frequency` and `data` have equal, non-zero length
/// - every frequency is finite and positive
/// - `errors`, if present, match the length and have strictly positive
///   real and imaginary parts (`+inf` excludes a point from the fit)
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    frequency: Vec<f64>,
    data: Vec<Complex64>,
    errors: Option<Vec<Complex64>>,
}

impl Measurement {
    pub fn new(frequency: Vec<f64>, data: Vec<Complex64>) -> Result<Self, ResonatorError> {
        if frequency.is_empty() {
            return Err(ResonatorError::InvalidInput("frequency array is empty".into()));
        }
        if frequency.len() != data.len() {
            return Err(ResonatorError::InvalidInput(format!(
                "frequency has {} points but data has {}",
                frequency.len(),
                data.len()
            )));
        }
        if let Some((i, f)) = frequency
            .iter()
            .enumerate()
            .find(|(_, f)| !(f.is_finite() && **f > 0.0))
        {
            return Err(ResonatorError::InvalidInput(format!(
                "frequency[{i}] = {f} is not a finite positive value"
            )));
        }
        if let Some(i) = data.iter().position(|z| !(z.re.is_finite() && z.im.is_finite())) {
            return Err(ResonatorError::InvalidInput(format!("data[{i}] is not finite")));
        }
        Ok(Self {
            frequency,
            data,
            errors: None,
        })
    }

    /// Build from separate real and imaginary columns.
    ///
    /// Real-only data (no imaginary column) is a usage error.
    pub fn from_parts(
        frequency: Vec<f64>,
        real: &[f64],
        imag: Option<&[f64]>,
    ) -> Result<Self, ResonatorError> {
        let imag = imag.ok_or(ResonatorError::NotComplex("data"))?;
        Self::new(frequency, zip_complex(real, imag, "data")?)
    }

    /// Attach per-point standard errors of the real and imaginary parts.
    pub fn with_errors(mut self, errors: Vec<Complex64>) -> Result<Self, ResonatorError> {
        if errors.len() != self.data.len() {
            return Err(ResonatorError::InvalidInput(format!(
                "errors has {} points but data has {}",
                errors.len(),
                self.data.len()
            )));
        }
        if let Some(i) = errors
            .iter()
            .position(|e| !(e.re > 0.0 && e.im > 0.0))
        {
            return Err(ResonatorError::InvalidInput(format!(
                "errors[{i}] = {} must have positive real and imaginary parts (use +inf to exclude a point)",
                errors[i]
            )));
        }
        self.errors = Some(errors);
        Ok(self)
    }

    /// Attach errors given as separate real and imaginary columns.
    pub fn with_error_parts(self, real: &[f64], imag: Option<&[f64]>) -> Result<Self, ResonatorError> {
        let imag = imag.ok_or(ResonatorError::NotComplex("errors"))?;
        let errors = zip_complex(real, imag, "errors")?;
        self.with_errors(errors)
    }

    pub fn frequency(&self) -> &[f64] {
        &self.frequency
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn errors(&self) -> Option<&[Complex64]> {
        self.errors.as_deref()
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    /// Smallest and largest measurement frequency.
    pub fn frequency_range(&self) -> (f64, f64) {
        self.frequency
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &f| {
                (lo.min(f), hi.max(f))
            })
    }
}

fn zip_complex(real: &[f64], imag: &[f64], what: &str) -> Result<Vec<Complex64>, ResonatorError> {
    if real.len() != imag.len() {
        return Err(ResonatorError::InvalidInput(format!(
            "{what}: {} real values but {} imaginary values",
            real.len(),
            imag.len()
        )));
    }
    Ok(real
        .iter()
        .zip(imag)
        .map(|(&re, &im)| Complex64::new(re, im))
        .collect())
}

/// Measured data, model data and the resonance point, all either raw or with
/// the fitted background divided out.
///
/// Built on demand from the fitter's current state; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementModelResonance {
    pub measurement_frequency: Vec<f64>,
    pub measurement_data: Vec<Complex64>,
    pub model_frequency: Vec<f64>,
    pub model_data: Vec<Complex64>,
    pub resonance_frequency: f64,
    pub resonance_data: Complex64,
}

/// Detuning and internal loss recovered from normalized scattering data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inversion {
    pub detuning: Vec<f64>,
    pub internal_loss: Vec<f64>,
}

impl Inversion {
    pub fn len(&self) -> usize {
        self.detuning.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detuning.is_empty()
    }
}

/// Convergence information reported by the optimizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub success: bool,
    pub message: String,
    pub iterations: usize,
    pub function_evaluations: usize,
    pub chi_square: f64,
    /// `None` when the fit has no degrees of freedom.
    #[serde(default)]
    pub reduced_chi_square: Option<f64>,
    /// Real residual channels with non-zero weight.
    pub data_points: usize,
    pub varying_parameters: usize,
}

/// Outcome of one fit: best-fit parameters (with standard errors), the
/// parameters the optimizer started from, and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: Parameters,
    pub init_params: Parameters,
    pub diagnostics: FitDiagnostics,
}

/// A value with an optional standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

impl Estimate {
    pub fn new(value: f64, error: Option<f64>) -> Self {
        Self { value, error }
    }
}

/// A saved fit report (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub tool: String,
    pub generated: String,
    pub source: String,
    pub foreground: String,
    pub background: String,
    pub points: usize,
    pub result: FitResult,
    pub derived: Vec<NamedEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photon_number: Option<f64>,
}

/// A derived quantity as stored in a [`FitReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEstimate {
    pub name: String,
    #[serde(flatten)]
    pub estimate: Estimate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_rejects_real_only_data() {
        let err = Measurement::from_parts(vec![1.0, 2.0], &[1.0, 1.0], None).unwrap_err();
        assert_eq!(err, ResonatorError::NotComplex("data"));
    }

    #[test]
    fn measurement_rejects_length_mismatch_and_bad_frequency() {
        let data = vec![Complex64::new(1.0, 0.0); 2];
        assert!(matches!(
            Measurement::new(vec![1.0], data.clone()),
            Err(ResonatorError::InvalidInput(_))
        ));
        assert!(matches!(
            Measurement::new(vec![1.0, -1.0], data),
            Err(ResonatorError::InvalidInput(_))
        ));
        assert!(matches!(
            Measurement::new(vec![], vec![]),
            Err(ResonatorError::InvalidInput(_))
        ));
    }

    #[test]
    fn errors_accept_infinite_but_reject_zero_components() {
        let m = Measurement::new(vec![1.0, 2.0], vec![Complex64::new(1.0, 0.0); 2]).unwrap();
        let excluded = Complex64::new(f64::INFINITY, f64::INFINITY);
        assert!(
            m.clone()
                .with_errors(vec![Complex64::new(0.1, 0.1), excluded])
                .is_ok()
        );
        assert!(matches!(
            m.clone().with_errors(vec![Complex64::new(0.1, 0.0), excluded]),
            Err(ResonatorError::InvalidInput(_))
        ));
        assert_eq!(
            m.with_error_parts(&[0.1, 0.1], None).unwrap_err(),
            ResonatorError::NotComplex("errors")
        );
    }
}
