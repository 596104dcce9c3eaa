//! The plug-in interface shared by foreground and background models.
//!
//! Every model can:
//! - evaluate its complex response at a set of frequencies for given parameters
//! - guess reasonable initial parameters from data
//!
//! Foreground (resonator) models additionally carry a reference point, the
//! photon-number formula for their topology, and optionally an analytic
//! inversion. Inversion is an optional capability: a foreground that cannot
//! invert returns `None` from [`ResonatorModel::inversion`].

use num_complex::Complex64;

use crate::domain::Parameters;
use crate::error::ResonatorError;

/// Names of the foreground parameters every resonator model provides.
pub const RESONANCE_FREQUENCY: &str = "resonance_frequency";
pub const COUPLING_LOSS: &str = "coupling_loss";
pub const INTERNAL_LOSS: &str = "internal_loss";

/// Capabilities shared by foreground and background models.
pub trait Model: Send + Sync {
    /// Short human-readable model name.
    fn name(&self) -> &'static str;

    /// Names of the parameters this model reads.
    fn param_names(&self) -> &'static [&'static str];

    /// Evaluate the response at each frequency.
    fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError>;

    /// Evaluate the response at a single frequency.
    fn eval_at(&self, frequency: f64, params: &Parameters) -> Result<Complex64, ResonatorError> {
        self.eval(&[frequency], params)?
            .into_iter()
            .next()
            .ok_or_else(|| ResonatorError::InvalidInput(format!("{} returned no value", self.name())))
    }

    /// Initial parameters estimated from `data` measured at `frequency`.
    fn guess(&self, data: &[Complex64], frequency: &[f64]) -> Result<Parameters, ResonatorError>;
}

/// Everything other than the resonator: gain, cable delay, other resonances.
pub trait BackgroundModel: Model {}

/// A resonator response, normalized to its own reference plane.
pub trait ResonatorModel: Model {
    /// Expected foreground value far from resonance, used to approximate
    /// background-only data while guessing.
    fn reference_point(&self) -> Complex64;

    /// Average photon number for a drive at `frequency` with `input_rate`
    /// photons per second.
    fn photon_number(
        &self,
        frequency: f64,
        resonance_frequency: f64,
        coupling_loss: f64,
        internal_loss: f64,
        input_rate: f64,
    ) -> f64;

    /// Fraction of the coupling energy decay rate that leaves through the
    /// measured port, where the topology defines one.
    fn io_coupling_coefficient(&self) -> Option<f64> {
        None
    }

    /// Analytic inversion, if this topology provides one.
    fn inversion(&self) -> Option<&dyn Invert> {
        None
    }
}

/// Closed-form inversion of a resonator model.
///
/// The input must be normalized to the foreground plane. The analytic result
/// is only accurate when the data bandwidth is smaller than the single-sided
/// resonator bandwidth `f_r * (coupling_loss + internal_loss) / 2`; wider
/// bandwidths need the full transfer function.
pub trait Invert {
    /// Return `(detuning, internal_loss)` for one normalized data point.
    fn invert(&self, data: Complex64, params: &Parameters) -> Result<(f64, f64), ResonatorError>;
}

/// Detuning `f / f_r - 1`.
pub fn detuning(frequency: f64, resonance_frequency: f64) -> f64 {
    frequency / resonance_frequency - 1.0
}
