//! Background × foreground composition and two-stage guessing.

use log::debug;
use num_complex::Complex64;

use crate::domain::Parameters;
use crate::error::ResonatorError;
use crate::models::{BackgroundModel, ResonatorModel};

/// One background and one foreground model evaluated as their product over
/// the union of their parameters.
pub struct CompositeModel {
    background: Box<dyn BackgroundModel>,
    foreground: Box<dyn ResonatorModel>,
}

impl CompositeModel {
    /// Compose two models; parameter names must not overlap.
    pub fn new(
        background: Box<dyn BackgroundModel>,
        foreground: Box<dyn ResonatorModel>,
    ) -> Result<Self, ResonatorError> {
        if let Some(name) = background
            .param_names()
            .iter()
            .find(|n| foreground.param_names().contains(n))
        {
            return Err(ResonatorError::ParameterCollision(name.to_string()));
        }
        Ok(Self {
            background,
            foreground,
        })
    }

    pub fn background(&self) -> &dyn BackgroundModel {
        self.background.as_ref()
    }

    pub fn foreground(&self) -> &dyn ResonatorModel {
        self.foreground.as_ref()
    }

    /// `"<background> * <foreground>"`.
    pub fn name(&self) -> String {
        format!("{} * {}", self.background.name(), self.foreground.name())
    }

    pub fn param_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.background
            .param_names()
            .iter()
            .chain(self.foreground.param_names())
            .copied()
    }

    /// `background(f) * foreground(f)`.
    pub fn eval(&self, frequency: &[f64], params: &Parameters) -> Result<Vec<Complex64>, ResonatorError> {
        let bg = self.background.eval(frequency, params)?;
        let fg = self.foreground.eval(frequency, params)?;
        Ok(bg.into_iter().zip(fg).map(|(b, f)| b * f).collect())
    }

    pub fn eval_at(&self, frequency: f64, params: &Parameters) -> Result<Complex64, ResonatorError> {
        Ok(self.background.eval_at(frequency, params)? * self.foreground.eval_at(frequency, params)?)
    }

    /// Initial parameters for the whole model.
    ///
    /// The background is guessed first, from the data divided by the
    /// foreground reference point. The data is then divided by that background
    /// and handed to the foreground guess, whose heuristics assume normalized
    /// resonance-circle data. Reversing the order gives poor starting points.
    pub fn guess(&self, frequency: &[f64], data: &[Complex64]) -> Result<Parameters, ResonatorError> {
        let reference = self.foreground.reference_point();
        let background_only: Vec<Complex64> = data.iter().map(|d| d / reference).collect();
        let mut guess = self.background.guess(&background_only, frequency)?;

        let background = self.background.eval(frequency, &guess)?;
        let normalized: Vec<Complex64> = data.iter().zip(&background).map(|(d, b)| d / b).collect();
        let foreground = self.foreground.guess(&normalized, frequency)?;
        guess.update(&foreground);

        debug!("initial guess for {}: {:?}", self.name(), guess);
        Ok(guess)
    }
}

impl std::fmt::Debug for CompositeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeModel")
            .field("background", &self.background.name())
            .field("foreground", &self.foreground.name())
            .finish()
    }
}
