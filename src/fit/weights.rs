//! Weighted complex residuals.
//!
//! Complex data is fitted as two real channels per point. With weight
//! `w = 1/σ_re + j/σ_im` the residual for point `k` is
//!
//! ```text
//! r[2k]     = Re(w) * (Re(model) - Re(data))
//! r[2k + 1] = Im(w) * (Im(model) - Im(data))
//! ```
//!
//! so each channel is scaled by its own error. An infinite error component
//! gives a zero weight and removes that channel from the fit.

use num_complex::Complex64;

use crate::domain::Parameters;
use crate::error::ResonatorError;
use crate::math::LeastSquaresProblem;
use crate::models::CompositeModel;

/// Per-point weights `1/Re(σ) + j/Im(σ)`, or `None` for an unweighted fit.
pub fn weights(errors: Option<&[Complex64]>) -> Option<Vec<Complex64>> {
    errors.map(|errors| {
        errors
            .iter()
            .map(|e| Complex64::new(e.re.recip(), e.im.recip()))
            .collect()
    })
}

/// The composite model against one measurement, as a real least squares
/// problem.
pub struct WeightedResidual<'a> {
    model: &'a CompositeModel,
    frequency: &'a [f64],
    data: &'a [Complex64],
    weights: Option<&'a [Complex64]>,
}

impl<'a> WeightedResidual<'a> {
    pub fn new(
        model: &'a CompositeModel,
        frequency: &'a [f64],
        data: &'a [Complex64],
        weights: Option<&'a [Complex64]>,
    ) -> Self {
        Self {
            model,
            frequency,
            data,
            weights,
        }
    }
}

impl LeastSquaresProblem for WeightedResidual<'_> {
    fn residual_len(&self) -> usize {
        2 * self.data.len()
    }

    fn active_residuals(&self) -> usize {
        match self.weights {
            Some(w) => w
                .iter()
                .map(|w| usize::from(w.re != 0.0) + usize::from(w.im != 0.0))
                .sum(),
            None => self.residual_len(),
        }
    }

    fn residuals(&self, params: &Parameters, out: &mut [f64]) -> Result<(), ResonatorError> {
        let model = self.model.eval(self.frequency, params)?;
        for (k, (m, d)) in model.iter().zip(self.data).enumerate() {
            let (w_re, w_im) = self.weights.map_or((1.0, 1.0), |w| (w[k].re, w[k].im));
            out[2 * k] = w_re * (m.re - d.re);
            out[2 * k + 1] = w_im * (m.im - d.im);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parameter;
    use crate::models::{BACKGROUND_MAGNITUDE, BACKGROUND_PHASE, MagnitudePhase, Shunt};
    use crate::models::{ASYMMETRY, COUPLING_LOSS, INTERNAL_LOSS, RESONANCE_FREQUENCY};

    #[test]
    fn weight_is_reciprocal_per_component() {
        let w = weights(Some(&[Complex64::new(0.5, 4.0), Complex64::new(f64::INFINITY, 1.0)])).unwrap();
        assert_eq!(w[0], Complex64::new(2.0, 0.25));
        assert_eq!(w[1], Complex64::new(0.0, 1.0));
        assert!(weights(None).is_none());
    }

    #[test]
    fn residual_channels_are_weighted_independently() {
        let model = CompositeModel::new(Box::new(MagnitudePhase), Box::new(Shunt)).unwrap();
        let params = Parameters::new()
            .with(BACKGROUND_MAGNITUDE, Parameter::new(1.0))
            .with(BACKGROUND_PHASE, Parameter::new(0.0))
            .with(RESONANCE_FREQUENCY, Parameter::new(1e9))
            .with(COUPLING_LOSS, Parameter::new(1e-5))
            .with(INTERNAL_LOSS, Parameter::new(1e-5))
            .with(ASYMMETRY, Parameter::new(0.0));
        let frequency = [2e9];
        let exact = model.eval(&frequency, &params).unwrap();
        let data = [exact[0] - Complex64::new(0.1, 0.2)];
        let w = [Complex64::new(10.0, 0.0)];

        let problem = WeightedResidual::new(&model, &frequency, &data, Some(&w));
        let mut out = [0.0; 2];
        problem.residuals(&params, &mut out).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-9);
        assert_eq!(out[1], 0.0);
        assert_eq!(problem.residual_len(), 2);
        assert_eq!(problem.active_residuals(), 1);
    }
}
