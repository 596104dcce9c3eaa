//! Background models: everything between the instrument and the resonator.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::domain::{Parameter, Parameters};
use crate::error::ResonatorError;
use crate::math::{fit_line, unwrap_phase};
use crate::models::{BackgroundModel, Model};

pub const BACKGROUND_MAGNITUDE: &str = "background_magnitude";
pub const BACKGROUND_MAGNITUDE_SLOPE: &str = "background_magnitude_slope";
pub const BACKGROUND_PHASE: &str = "background_phase";
pub const BACKGROUND_DELAY: &str = "background_delay";

/// A background of exactly one, for data that is already normalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitBackground;

impl Model for UnitBackground {
    fn name(&self) -> &'static str {
        "UnitBackground"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn eval(&self, frequency: &[f64], _params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        Ok(vec![Complex64::new(1.0, 0.0); frequency.len()])
    }

    fn guess(&self, _data: &[Complex64], _frequency: &[f64]) -> Result<Parameters, ResonatorError> {
        Ok(Parameters::new())
    }
}

impl BackgroundModel for UnitBackground {}

/// Constant complex gain `magnitude * exp(j phase)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagnitudePhase;

impl Model for MagnitudePhase {
    fn name(&self) -> &'static str {
        "MagnitudePhase"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[BACKGROUND_MAGNITUDE, BACKGROUND_PHASE]
    }

    fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        let gain = Complex64::from_polar(
            params.value(BACKGROUND_MAGNITUDE)?,
            params.value(BACKGROUND_PHASE)?,
        );
        Ok(vec![gain; frequency.len()])
    }

    fn guess(&self, data: &[Complex64], _frequency: &[f64]) -> Result<Parameters, ResonatorError> {
        if data.is_empty() {
            return Err(ResonatorError::InvalidInput("cannot guess a background from no data".into()));
        }
        let n = data.len() as f64;
        let magnitude = data.iter().map(|d| d.norm()).sum::<f64>() / n;
        let mean = data.iter().sum::<Complex64>() / n;
        Ok(Parameters::new()
            .with(BACKGROUND_MAGNITUDE, Parameter::new(magnitude).with_min(0.0))
            .with(BACKGROUND_PHASE, Parameter::new(mean.arg())))
    }
}

impl BackgroundModel for MagnitudePhase {}

/// Linear gain with cable delay about a fixed reference frequency `f_0`:
///
/// ```text
/// (magnitude + slope * (f - f_0)) * exp(j (phase - 2π (f - f_0) delay))
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MagnitudeSlopePhaseDelay {
    reference_frequency: f64,
}

impl MagnitudeSlopePhaseDelay {
    pub fn new(reference_frequency: f64) -> Self {
        Self { reference_frequency }
    }

    /// Reference frequency at the center of `frequency`.
    pub fn centered_on(frequency: &[f64]) -> Self {
        let (lo, hi) = frequency
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &f| (a.min(f), b.max(f)));
        Self::new(if lo.is_finite() { (lo + hi) / 2.0 } else { 0.0 })
    }

    pub fn reference_frequency(&self) -> f64 {
        self.reference_frequency
    }
}

impl Model for MagnitudeSlopePhaseDelay {
    fn name(&self) -> &'static str {
        "MagnitudeSlopePhaseDelay"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[
            BACKGROUND_MAGNITUDE,
            BACKGROUND_MAGNITUDE_SLOPE,
            BACKGROUND_PHASE,
            BACKGROUND_DELAY,
        ]
    }

    fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        let magnitude = params.value(BACKGROUND_MAGNITUDE)?;
        let slope = params.value(BACKGROUND_MAGNITUDE_SLOPE)?;
        let phase = params.value(BACKGROUND_PHASE)?;
        let delay = params.value(BACKGROUND_DELAY)?;
        Ok(frequency
            .iter()
            .map(|&f| {
                let df = f - self.reference_frequency;
                Complex64::from_polar(magnitude + slope * df, phase - 2.0 * PI * df * delay)
            })
            .collect())
    }

    fn guess(&self, data: &[Complex64], frequency: &[f64]) -> Result<Parameters, ResonatorError> {
        let offsets: Vec<f64> = frequency.iter().map(|f| f - self.reference_frequency).collect();
        let magnitude: Vec<f64> = data.iter().map(|d| d.norm()).collect();
        let phase = unwrap_phase(&data.iter().map(|d| d.arg()).collect::<Vec<_>>());

        let (magnitude_0, slope) = fit_line(&offsets, &magnitude)
            .ok_or_else(|| ResonatorError::InvalidInput("cannot fit background magnitude".into()))?;
        let (phase_0, phase_slope) = fit_line(&offsets, &phase)
            .ok_or_else(|| ResonatorError::InvalidInput("cannot fit background phase".into()))?;

        Ok(Parameters::new()
            .with(BACKGROUND_MAGNITUDE, Parameter::new(magnitude_0).with_min(0.0))
            .with(BACKGROUND_MAGNITUDE_SLOPE, Parameter::new(slope))
            .with(BACKGROUND_PHASE, Parameter::new(wrap(phase_0)))
            .with(BACKGROUND_DELAY, Parameter::new(-phase_slope / (2.0 * PI))))
    }
}

impl BackgroundModel for MagnitudeSlopePhaseDelay {}

fn wrap(phase: f64) -> f64 {
    phase.sin().atan2(phase.cos())
}
