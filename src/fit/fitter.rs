//! Fit orchestration for one resonator measurement.
//!
//! A [`ResonatorFitter`] owns a measurement, the composite model and the most
//! recent fit result. Construction guesses and fits immediately, so every
//! fitter carries a result; `fit` replaces it as a unit.

use log::{info, warn};
use num_complex::Complex64;

use crate::domain::{FitResult, Inversion, Measurement, MeasurementModelResonance, Parameters};
use crate::error::ResonatorError;
use crate::fit::{Quantity, ResonatorQuantities, WeightedResidual, weights};
use crate::math::{FitOptions, LevenbergMarquardt, Optimizer, linspace, photon_rate};
use crate::models::{
    BackgroundModel, COUPLING_LOSS, CompositeModel, INTERNAL_LOSS, RESONANCE_FREQUENCY,
    ResonatorModel,
};

/// Suffix that turns a parameter or quantity name into its standard error.
pub const ERROR_SUFFIX: &str = "_error";

pub struct ResonatorFitter {
    measurement: Measurement,
    model: CompositeModel,
    optimizer: Box<dyn Optimizer>,
    result: FitResult,
}

impl ResonatorFitter {
    /// Guess and fit `measurement` with the default optimizer.
    ///
    /// Entries in `params` override the guess, bounds and `vary` included.
    pub fn new(
        measurement: Measurement,
        foreground: Box<dyn ResonatorModel>,
        background: Box<dyn BackgroundModel>,
        params: Option<&Parameters>,
        options: &FitOptions,
    ) -> Result<Self, ResonatorError> {
        Self::with_optimizer(
            measurement,
            foreground,
            background,
            params,
            Box::new(LevenbergMarquardt),
            options,
        )
    }

    pub fn with_optimizer(
        measurement: Measurement,
        foreground: Box<dyn ResonatorModel>,
        background: Box<dyn BackgroundModel>,
        params: Option<&Parameters>,
        optimizer: Box<dyn Optimizer>,
        options: &FitOptions,
    ) -> Result<Self, ResonatorError> {
        let model = CompositeModel::new(background, foreground)?;
        let result = run_fit(&measurement, &model, optimizer.as_ref(), params, options)?;
        Ok(Self {
            measurement,
            model,
            optimizer,
            result,
        })
    }

    /// Re-guess and re-fit, replacing the stored result.
    ///
    /// On error the previous result is kept.
    pub fn fit(&mut self, params: Option<&Parameters>, options: &FitOptions) -> Result<(), ResonatorError> {
        self.result = run_fit(
            &self.measurement,
            &self.model,
            self.optimizer.as_ref(),
            params,
            options,
        )?;
        Ok(())
    }

    /// Initial parameters for the stored measurement.
    pub fn guess(&self) -> Result<Parameters, ResonatorError> {
        self.model
            .guess(self.measurement.frequency(), self.measurement.data())
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn frequency(&self) -> &[f64] {
        self.measurement.frequency()
    }

    pub fn data(&self) -> &[Complex64] {
        self.measurement.data()
    }

    pub fn model(&self) -> &CompositeModel {
        &self.model
    }

    pub fn background(&self) -> &dyn BackgroundModel {
        self.model.background()
    }

    pub fn foreground(&self) -> &dyn ResonatorModel {
        self.model.foreground()
    }

    pub fn result(&self) -> &FitResult {
        &self.result
    }

    /// Best-fit parameters.
    pub fn params(&self) -> &Parameters {
        &self.result.params
    }

    /// Weights used by the fit, if errors were supplied.
    pub fn weights(&self) -> Option<Vec<Complex64>> {
        weights(self.measurement.errors())
    }

    /// Composite model at `frequency` (default: the measured frequencies)
    /// with `params` (default: best fit).
    pub fn model_values(
        &self,
        frequency: Option<&[f64]>,
        params: Option<&Parameters>,
    ) -> Result<Vec<Complex64>, ResonatorError> {
        self.model.eval(
            frequency.unwrap_or(self.measurement.frequency()),
            params.unwrap_or(&self.result.params),
        )
    }

    /// Composite model evaluated with the parameters the fit started from.
    pub fn initial_model_values(&self, frequency: Option<&[f64]>) -> Result<Vec<Complex64>, ResonatorError> {
        self.model_values(frequency, Some(&self.result.init_params))
    }

    /// Divide `data` by the best-fit background at `frequency`.
    pub fn remove_background(
        &self,
        frequency: &[f64],
        data: &[Complex64],
    ) -> Result<Vec<Complex64>, ResonatorError> {
        if frequency.len() != data.len() {
            return Err(ResonatorError::InvalidInput(format!(
                "frequency has {} points but data has {}",
                frequency.len(),
                data.len()
            )));
        }
        let background = self.model.background().eval(frequency, &self.result.params)?;
        Ok(data.iter().zip(&background).map(|(d, b)| d / b).collect())
    }

    /// Divide `data`, all taken at one `frequency`, by the best-fit background.
    pub fn remove_background_at(
        &self,
        frequency: f64,
        data: &[Complex64],
    ) -> Result<Vec<Complex64>, ResonatorError> {
        let background = self
            .model
            .background()
            .eval_at(frequency, &self.result.params)?;
        Ok(data.iter().map(|d| d / background).collect())
    }

    /// The measured data normalized to the resonator plane.
    pub fn foreground_data(&self) -> Result<Vec<Complex64>, ResonatorError> {
        self.remove_background(self.measurement.frequency(), self.measurement.data())
    }

    /// Measurement, model and resonance point for plotting or export.
    ///
    /// With `num_model_points` the model is evaluated on that many evenly
    /// spaced frequencies spanning the measurement; otherwise at the measured
    /// frequencies. With `normalize` all data has the background divided out.
    pub fn measurement_model_resonance(
        &self,
        normalize: bool,
        num_model_points: Option<usize>,
    ) -> Result<MeasurementModelResonance, ResonatorError> {
        let measurement_frequency = self.measurement.frequency().to_vec();
        let model_frequency = match num_model_points {
            Some(n) => {
                let (lo, hi) = self.measurement.frequency_range();
                linspace(lo, hi, n)
            }
            None => measurement_frequency.clone(),
        };
        let resonance_frequency = self.result.params.value(RESONANCE_FREQUENCY)?;
        let params = &self.result.params;

        let (measurement_data, model_data, resonance_data) = if normalize {
            (
                self.foreground_data()?,
                self.model.foreground().eval(&model_frequency, params)?,
                self.model.foreground().eval_at(resonance_frequency, params)?,
            )
        } else {
            (
                self.measurement.data().to_vec(),
                self.model.eval(&model_frequency, params)?,
                self.model.eval_at(resonance_frequency, params)?,
            )
        };

        Ok(MeasurementModelResonance {
            measurement_frequency,
            measurement_data,
            model_frequency,
            model_data,
            resonance_frequency,
            resonance_data,
        })
    }

    /// Detuning and internal loss for each normalized data point.
    ///
    /// Only accurate when the data bandwidth is below the single-sided
    /// resonator bandwidth; see [`crate::models::Invert`].
    pub fn invert(&self, data: &[Complex64]) -> Result<Inversion, ResonatorError> {
        let inversion = self
            .model
            .foreground()
            .inversion()
            .ok_or(ResonatorError::Unsupported {
                model: self.model.foreground().name(),
                operation: "invert",
            })?;
        let mut out = Inversion {
            detuning: Vec::with_capacity(data.len()),
            internal_loss: Vec::with_capacity(data.len()),
        };
        for &point in data {
            let (x, loss) = inversion.invert(point, &self.result.params)?;
            out.detuning.push(x);
            out.internal_loss.push(loss);
        }
        Ok(out)
    }

    /// Normalize raw data taken at `measurement_frequency`, then invert it.
    pub fn remove_background_and_invert(
        &self,
        raw_data: &[Complex64],
        measurement_frequency: f64,
    ) -> Result<Inversion, ResonatorError> {
        self.invert(&self.remove_background_at(measurement_frequency, raw_data)?)
    }

    /// Best-fit value of a parameter.
    pub fn value(&self, name: &str) -> Result<f64, ResonatorError> {
        self.result.params.value(name)
    }

    /// Standard error of a parameter.
    pub fn stderr(&self, name: &str) -> Result<f64, ResonatorError> {
        self.result.params.stderr(name)
    }

    /// Resonance frequency and losses with their errors.
    pub fn quantities(&self) -> Result<ResonatorQuantities, ResonatorError> {
        ResonatorQuantities::from_params(&self.result.params)
    }

    /// Look up a value by name.
    ///
    /// Derived quantities (`f_r`, `Q_i`, `total_loss_error`, ...) take
    /// precedence; then `<parameter>_error` resolves to a standard error and
    /// any other name to a best-fit value.
    pub fn get(&self, name: &str) -> Result<f64, ResonatorError> {
        if let Ok(quantities) = self.quantities() {
            if let Some(found) = quantities.lookup(name) {
                return found;
            }
        }
        if let Some(base) = name.strip_suffix(ERROR_SUFFIX) {
            if self.result.params.contains(base) {
                return self.stderr(base);
            }
        }
        self.value(name)
    }

    /// Every name accepted by [`get`](Self::get) for this fit.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.result.params.names() {
            names.push(name.to_string());
            names.push(format!("{name}{ERROR_SUFFIX}"));
        }
        if self.quantities().is_ok() {
            for q in Quantity::ALL {
                for name in std::iter::once(q.name()).chain(q.alias()) {
                    names.push(name.to_string());
                    names.push(format!("{name}{ERROR_SUFFIX}"));
                }
            }
        }
        names
    }

    /// Average photon number for a drive at `input_frequency` delivering
    /// `input_rate` photons per second.
    pub fn photon_number(&self, input_frequency: f64, input_rate: f64) -> Result<f64, ResonatorError> {
        let params = &self.result.params;
        Ok(self.model.foreground().photon_number(
            input_frequency,
            params.value(RESONANCE_FREQUENCY)?,
            params.value(COUPLING_LOSS)?,
            params.value(INTERNAL_LOSS)?,
            input_rate,
        ))
    }

    /// Photon number for a drive of `power_dbm` at the resonator input.
    pub fn photon_number_from_power(&self, input_frequency: f64, power_dbm: f64) -> Result<f64, ResonatorError> {
        self.photon_number(input_frequency, photon_rate(power_dbm, input_frequency))
    }
}

impl std::fmt::Debug for ResonatorFitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResonatorFitter")
            .field("model", &self.model)
            .field("points", &self.measurement.len())
            .field("result", &self.result)
            .finish()
    }
}

fn run_fit(
    measurement: &Measurement,
    model: &CompositeModel,
    optimizer: &dyn Optimizer,
    params: Option<&Parameters>,
    options: &FitOptions,
) -> Result<FitResult, ResonatorError> {
    if let Some(overrides) = params {
        if let Some(name) = overrides.names().find(|n| !model.param_names().any(|m| m == *n)) {
            return Err(ResonatorError::UnknownParameter(name.to_string()));
        }
    }
    let mut initial = model.guess(measurement.frequency(), measurement.data())?;
    if let Some(overrides) = params {
        initial.update(overrides);
    }
    let weights = weights(measurement.errors());
    let problem = WeightedResidual::new(
        model,
        measurement.frequency(),
        measurement.data(),
        weights.as_deref(),
    );
    let result = optimizer.minimize(&problem, &initial, options)?;

    let d = &result.diagnostics;
    if d.success {
        info!(
            "fit {}: {} points, {} iterations, chi-square {:.4e}",
            model.name(),
            measurement.len(),
            d.iterations,
            d.chi_square
        );
    } else {
        warn!("fit {} did not converge: {}", model.name(), d.message);
    }
    Ok(result)
}
