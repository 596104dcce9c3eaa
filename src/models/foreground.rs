//! Resonator (foreground) models.
//!
//! All models share the characteristic quantity
//!
//! ```text
//! z = internal_loss + 2j * x,   x = f / f_r - 1
//! ```
//!
//! and differ only in how the port sees it:
//!
//! - [`Shunt`]: `S21 = 1 - (1 + j a) / (1 + z / coupling_loss)`, equal to `1` far from resonance
//! - [`Reflection`]: `S11 = -1 + 2 / (1 + z / coupling_loss)`, equal to `-1` far from resonance

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use num_complex::Complex64;

use crate::domain::{Parameter, Parameters};
use crate::error::ResonatorError;
use crate::models::{
    COUPLING_LOSS, INTERNAL_LOSS, Invert, Model, RESONANCE_FREQUENCY, ResonatorModel, detuning,
};

/// Asymmetry of the shunt resonance, from impedance mismatch around the coupler.
pub const ASYMMETRY: &str = "asymmetry";

/// Smallest coupling loss the guess will produce.
const MIN_COUPLING_LOSS: f64 = 1e-12;

/// Largest fraction of the loaded loss the guess attributes to coupling.
const MAX_COUPLING_FRACTION: f64 = 0.999;

/// A shunt resonator leaks equally toward both ends of the line.
const SHUNT_IO_COUPLING: f64 = 0.5;

/// A reflection resonator leaks only into its single port.
const REFLECTION_IO_COUPLING: f64 = 1.0;

/// A resonator shunt-coupled to a transmission line, measured in S21.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shunt;

impl Model for Shunt {
    fn name(&self) -> &'static str {
        "Shunt"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[RESONANCE_FREQUENCY, COUPLING_LOSS, INTERNAL_LOSS, ASYMMETRY]
    }

    fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        let f_r = params.value(RESONANCE_FREQUENCY)?;
        let c = params.value(COUPLING_LOSS)?;
        let i = params.value(INTERNAL_LOSS)?;
        let a = params.value(ASYMMETRY)?;
        let numerator = Complex64::new(1.0, a);
        Ok(frequency
            .iter()
            .map(|&f| {
                let z = Complex64::new(i, 2.0 * detuning(f, f_r));
                1.0 - numerator / (1.0 + z / c)
            })
            .collect())
    }

    fn guess(&self, data: &[Complex64], frequency: &[f64]) -> Result<Parameters, ResonatorError> {
        let mut params = guess_resonance(data, frequency, self.reference_point(), 1.0)?;
        params.insert(ASYMMETRY, Parameter::new(0.0));
        Ok(params)
    }
}

impl ResonatorModel for Shunt {
    fn reference_point(&self) -> Complex64 {
        Complex64::new(1.0, 0.0)
    }

    fn photon_number(
        &self,
        frequency: f64,
        resonance_frequency: f64,
        coupling_loss: f64,
        internal_loss: f64,
        input_rate: f64,
    ) -> f64 {
        stored_photons(SHUNT_IO_COUPLING, frequency, resonance_frequency, coupling_loss, internal_loss, input_rate)
    }

    fn io_coupling_coefficient(&self) -> Option<f64> {
        Some(SHUNT_IO_COUPLING)
    }

    fn inversion(&self) -> Option<&dyn Invert> {
        Some(self)
    }
}

impl Invert for Shunt {
    fn invert(&self, data: Complex64, params: &Parameters) -> Result<(f64, f64), ResonatorError> {
        let c = params.value(COUPLING_LOSS)?;
        let a = params.value(ASYMMETRY)?;
        let z = c * (Complex64::new(1.0, a) / (1.0 - data) - 1.0);
        Ok((z.im / 2.0, z.re))
    }
}

/// A resonator terminating a single port, measured in S11.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reflection;

impl Model for Reflection {
    fn name(&self) -> &'static str {
        "Reflection"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[RESONANCE_FREQUENCY, COUPLING_LOSS, INTERNAL_LOSS]
    }

    fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        let f_r = params.value(RESONANCE_FREQUENCY)?;
        let c = params.value(COUPLING_LOSS)?;
        let i = params.value(INTERNAL_LOSS)?;
        Ok(frequency
            .iter()
            .map(|&f| {
                let z = Complex64::new(i, 2.0 * detuning(f, f_r));
                -1.0 + 2.0 / (1.0 + z / c)
            })
            .collect())
    }

    fn guess(&self, data: &[Complex64], frequency: &[f64]) -> Result<Parameters, ResonatorError> {
        guess_resonance(data, frequency, self.reference_point(), 2.0)
    }
}

impl ResonatorModel for Reflection {
    fn reference_point(&self) -> Complex64 {
        Complex64::new(-1.0, 0.0)
    }

    fn photon_number(
        &self,
        frequency: f64,
        resonance_frequency: f64,
        coupling_loss: f64,
        internal_loss: f64,
        input_rate: f64,
    ) -> f64 {
        stored_photons(REFLECTION_IO_COUPLING, frequency, resonance_frequency, coupling_loss, internal_loss, input_rate)
    }

    fn io_coupling_coefficient(&self) -> Option<f64> {
        Some(REFLECTION_IO_COUPLING)
    }

    fn inversion(&self) -> Option<&dyn Invert> {
        Some(self)
    }
}

impl Invert for Reflection {
    fn invert(&self, data: Complex64, params: &Parameters) -> Result<(f64, f64), ResonatorError> {
        let c = params.value(COUPLING_LOSS)?;
        let z = c * (2.0 / (data + 1.0) - 1.0);
        Ok((z.im / 2.0, z.re))
    }
}

/// `4 * io_coupling * coupling_loss * rate / (ω_r * (total_loss² + 4x²))`.
fn stored_photons(
    io_coupling: f64,
    frequency: f64,
    resonance_frequency: f64,
    coupling_loss: f64,
    internal_loss: f64,
    input_rate: f64,
) -> f64 {
    let x = detuning(frequency, resonance_frequency);
    let total = coupling_loss + internal_loss;
    let omega_r = 2.0 * PI * resonance_frequency;
    4.0 * io_coupling * coupling_loss * input_rate / (omega_r * (total * total + 4.0 * x * x))
}

/// Lorentzian guess shared by the foreground models.
///
/// Normalized data traces a circle that leaves `off_resonance` and is
/// furthest from it at resonance, where the distance is
/// `depth_scale * coupling_loss / total_loss`. The distance falls by `1/√2`
/// at `x = ±total_loss / 2`, so the width between those points gives the
/// total loss.
pub fn guess_resonance(
    data: &[Complex64],
    frequency: &[f64],
    off_resonance: Complex64,
    depth_scale: f64,
) -> Result<Parameters, ResonatorError> {
    let n = data.len().min(frequency.len());
    if n < 3 {
        return Err(ResonatorError::InvalidInput(format!(
            "at least 3 points are needed to guess a resonance, got {n}"
        )));
    }

    let distance: Vec<f64> = data[..n].iter().map(|d| (d - off_resonance).norm()).collect();
    let (peak, depth) = distance
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, d)| d.is_finite())
        .fold((0usize, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });
    if !(depth > 0.0) {
        return Err(ResonatorError::InvalidInput(
            "data shows no resonance: every point equals the off-resonance value".into(),
        ));
    }

    let threshold = depth * FRAC_1_SQRT_2;
    let mut lo = peak;
    while lo > 0 && distance[lo - 1] >= threshold {
        lo -= 1;
    }
    let mut hi = peak;
    while hi + 1 < n && distance[hi + 1] >= threshold {
        hi += 1;
    }

    let (f_min, f_max) = frequency[..n]
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &f| (a.min(f), b.max(f)));
    let spacing = (f_max - f_min) / (n as f64 - 1.0);
    let f_r = frequency[peak];
    let width = (frequency[hi] - frequency[lo]).abs().max(spacing);

    let total_loss = width / f_r;
    let fraction = (depth / depth_scale).min(MAX_COUPLING_FRACTION);
    let coupling_loss = (fraction * total_loss).max(MIN_COUPLING_LOSS);
    let internal_loss = (total_loss - coupling_loss).max(0.0);

    Ok(Parameters::new()
        .with(RESONANCE_FREQUENCY, Parameter::new(f_r).with_bounds(f_min, f_max))
        .with(COUPLING_LOSS, Parameter::new(coupling_loss).with_min(MIN_COUPLING_LOSS))
        .with(INTERNAL_LOSS, Parameter::new(internal_loss).with_min(0.0)))
}
