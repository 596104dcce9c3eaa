//! Synthetic resonator data with Gaussian noise.
//!
//! Used by the `simulate` command and by tests that need realistic sweeps.
//! Every generator takes a seed so that the same configuration always
//! produces the same data.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use num_complex::Complex64;

use crate::domain::{Inversion, Measurement, Parameter, Parameters};
use crate::error::ResonatorError;
use crate::math::linspace;
use crate::models::{BackgroundModel, INTERNAL_LOSS, RESONANCE_FREQUENCY, ResonatorModel};

/// A linear frequency sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub start: f64,
    pub stop: f64,
    pub points: usize,
    /// Standard deviation of the noise on each of the real and imaginary parts.
    pub noise: f64,
    pub seed: u64,
}

/// A time series taken at one drive frequency while the resonator fluctuates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CwConfig {
    pub frequency: f64,
    pub points: usize,
    /// Standard deviation of the fractional resonance frequency jitter.
    pub detuning_jitter: f64,
    /// Standard deviation of the internal loss jitter.
    pub internal_loss_jitter: f64,
    pub noise: f64,
    pub seed: u64,
}

/// Continuous-wave data together with the detuning and internal loss that
/// produced each point.
#[derive(Debug, Clone, PartialEq)]
pub struct CwData {
    pub frequency: f64,
    pub data: Vec<Complex64>,
    pub truth: Inversion,
}

/// Sample `background * foreground` over the sweep and add noise.
///
/// With non-zero noise the returned measurement carries matching errors.
pub fn generate_sweep(
    config: &SweepConfig,
    foreground: &dyn ResonatorModel,
    background: &dyn BackgroundModel,
    params: &Parameters,
) -> Result<Measurement, ResonatorError> {
    if config.points < 3 {
        return Err(ResonatorError::InvalidInput("a sweep needs at least 3 points".into()));
    }
    if !(config.start > 0.0 && config.stop > config.start) {
        return Err(ResonatorError::InvalidInput(format!(
            "invalid sweep range {} .. {}",
            config.start, config.stop
        )));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = noise_distribution(config.noise)?;

    let frequency = linspace(config.start, config.stop, config.points);
    let bg = background.eval(&frequency, params)?;
    let fg = foreground.eval(&frequency, params)?;
    let data: Vec<Complex64> = bg
        .iter()
        .zip(&fg)
        .map(|(b, f)| b * f + Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng)))
        .collect();

    let measurement = Measurement::new(frequency, data)?;
    if config.noise > 0.0 {
        let errors = vec![Complex64::new(config.noise, config.noise); config.points];
        measurement.with_errors(errors)
    } else {
        Ok(measurement)
    }
}

/// Sample the response at one frequency while the resonance frequency and
/// internal loss wander around their values in `params`.
pub fn generate_cw(
    config: &CwConfig,
    foreground: &dyn ResonatorModel,
    background: &dyn BackgroundModel,
    params: &Parameters,
) -> Result<CwData, ResonatorError> {
    if !(config.frequency > 0.0 && config.frequency.is_finite()) {
        return Err(ResonatorError::InvalidInput(format!(
            "invalid drive frequency {}",
            config.frequency
        )));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = noise_distribution(config.noise)?;
    let detuning_jitter = noise_distribution(config.detuning_jitter)?;
    let loss_jitter = noise_distribution(config.internal_loss_jitter)?;

    let f_r = params.value(RESONANCE_FREQUENCY)?;
    let internal_loss = params.value(INTERNAL_LOSS)?;
    let background_value = background.eval_at(config.frequency, params)?;

    let mut data = Vec::with_capacity(config.points);
    let mut truth = Inversion::default();
    let mut point = params.clone();
    for _ in 0..config.points {
        let shifted = f_r * (1.0 + detuning_jitter.sample(&mut rng));
        let loss = (internal_loss + loss_jitter.sample(&mut rng)).max(0.0);
        point.insert(RESONANCE_FREQUENCY, Parameter::new(shifted));
        point.insert(INTERNAL_LOSS, Parameter::new(loss));

        let value = background_value * foreground.eval_at(config.frequency, &point)?;
        data.push(value + Complex64::new(noise.sample(&mut rng), noise.sample(&mut rng)));
        truth.detuning.push(config.frequency / shifted - 1.0);
        truth.internal_loss.push(loss);
    }

    Ok(CwData {
        frequency: config.frequency,
        data,
        truth,
    })
}

fn noise_distribution(std_dev: f64) -> Result<Normal<f64>, ResonatorError> {
    Normal::new(0.0, std_dev)
        .map_err(|e| ResonatorError::InvalidInput(format!("noise distribution error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::fit::ResonatorFitter;
    use crate::math::FitOptions;
    use crate::models::{
        ASYMMETRY, BACKGROUND_MAGNITUDE, BACKGROUND_PHASE, COUPLING_LOSS, MagnitudePhase, Shunt,
    };

    const F_R: f64 = 6e9;

    fn truth() -> Parameters {
        Parameters::new()
            .with(BACKGROUND_MAGNITUDE, Parameter::new(0.05))
            .with(BACKGROUND_PHASE, Parameter::new(0.7))
            .with(RESONANCE_FREQUENCY, Parameter::new(F_R))
            .with(COUPLING_LOSS, Parameter::new(4e-5))
            .with(INTERNAL_LOSS, Parameter::new(1e-5))
            .with(ASYMMETRY, Parameter::new(0.0))
    }

    fn sweep_config(seed: u64) -> SweepConfig {
        SweepConfig {
            start: F_R * (1.0 - 3e-4),
            stop: F_R * (1.0 + 3e-4),
            points: 301,
            noise: 1e-4,
            seed,
        }
    }

    #[test]
    fn same_seed_gives_same_sweep() {
        let a = generate_sweep(&sweep_config(3), &Shunt, &MagnitudePhase, &truth()).unwrap();
        let b = generate_sweep(&sweep_config(3), &Shunt, &MagnitudePhase, &truth()).unwrap();
        let c = generate_sweep(&sweep_config(4), &Shunt, &MagnitudePhase, &truth()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.data(), c.data());
        assert_eq!(a.errors().unwrap()[0], Complex64::new(1e-4, 1e-4));
    }

    #[test]
    fn noiseless_sweep_has_no_errors() {
        let mut config = sweep_config(0);
        config.noise = 0.0;
        let sweep = generate_sweep(&config, &Shunt, &MagnitudePhase, &truth()).unwrap();
        assert!(sweep.errors().is_none());
        assert_eq!(sweep.len(), 301);
    }

    #[test]
    fn rejects_bad_sweep_configuration() {
        let mut config = sweep_config(0);
        config.stop = config.start;
        assert!(generate_sweep(&config, &Shunt, &MagnitudePhase, &truth()).is_err());
        config = sweep_config(0);
        config.noise = -1.0;
        assert!(generate_sweep(&config, &Shunt, &MagnitudePhase, &truth()).is_err());
    }

    #[test]
    fn cw_inversion_tracks_fluctuations() {
        let sweep = generate_sweep(&sweep_config(11), &Shunt, &MagnitudePhase, &truth()).unwrap();
        let fitter = ResonatorFitter::new(
            sweep,
            Box::new(Shunt),
            Box::new(MagnitudePhase),
            None,
            &FitOptions::default(),
        )
        .unwrap();

        let cw = generate_cw(
            &CwConfig {
                frequency: F_R,
                points: 50,
                detuning_jitter: 2e-6,
                internal_loss_jitter: 1e-6,
                noise: 0.0,
                seed: 5,
            },
            &Shunt,
            &MagnitudePhase,
            &truth(),
        )
        .unwrap();
        let inversion = fitter.remove_background_and_invert(&cw.data, cw.frequency).unwrap();
        assert_eq!(inversion.len(), 50);
        for k in 0..inversion.len() {
            assert_relative_eq!(inversion.detuning[k], cw.truth.detuning[k], epsilon = 2e-7);
            assert_relative_eq!(inversion.internal_loss[k], cw.truth.internal_loss[k], epsilon = 1e-6);
        }
    }
}
