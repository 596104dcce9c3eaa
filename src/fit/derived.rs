//! Physical quantities derived from the fitted resonance frequency and losses.
//!
//! Errors of `resonance_frequency`, `coupling_loss` and `internal_loss` are
//! assumed independent and combined in quadrature.

use std::f64::consts::PI;

use crate::domain::{Estimate, Parameters};
use crate::error::ResonatorError;
use crate::models::{COUPLING_LOSS, INTERNAL_LOSS, RESONANCE_FREQUENCY};

/// A derived quantity, addressable by its long name or short alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    ResonanceFrequency,
    AngularResonanceFrequency,
    TotalLoss,
    CouplingQualityFactor,
    InternalQualityFactor,
    TotalQualityFactor,
    CouplingEnergyDecayRate,
    InternalEnergyDecayRate,
    TotalEnergyDecayRate,
}

impl Quantity {
    pub const ALL: [Quantity; 9] = [
        Quantity::ResonanceFrequency,
        Quantity::AngularResonanceFrequency,
        Quantity::TotalLoss,
        Quantity::CouplingQualityFactor,
        Quantity::InternalQualityFactor,
        Quantity::TotalQualityFactor,
        Quantity::CouplingEnergyDecayRate,
        Quantity::InternalEnergyDecayRate,
        Quantity::TotalEnergyDecayRate,
    ];

    /// Name used in reports and lookups.
    pub fn name(self) -> &'static str {
        match self {
            Quantity::ResonanceFrequency => "f_r",
            Quantity::AngularResonanceFrequency => "omega_r",
            Quantity::TotalLoss => "total_loss",
            Quantity::CouplingQualityFactor => "coupling_quality_factor",
            Quantity::InternalQualityFactor => "internal_quality_factor",
            Quantity::TotalQualityFactor => "total_quality_factor",
            Quantity::CouplingEnergyDecayRate => "coupling_energy_decay_rate",
            Quantity::InternalEnergyDecayRate => "internal_energy_decay_rate",
            Quantity::TotalEnergyDecayRate => "total_energy_decay_rate",
        }
    }

    /// Short alias, where one exists.
    pub fn alias(self) -> Option<&'static str> {
        match self {
            Quantity::CouplingQualityFactor => Some("Q_c"),
            Quantity::InternalQualityFactor => Some("Q_i"),
            Quantity::TotalQualityFactor => Some("Q_t"),
            _ => None,
        }
    }

    /// Resolve a name or alias.
    pub fn from_name(name: &str) -> Option<Quantity> {
        Quantity::ALL
            .into_iter()
            .find(|q| q.name() == name || q.alias() == Some(name))
    }
}

/// Resonance frequency and losses with their standard errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonatorQuantities {
    pub resonance_frequency: Estimate,
    pub coupling_loss: Estimate,
    pub internal_loss: Estimate,
}

impl ResonatorQuantities {
    /// Read the three base parameters from a fitted parameter set.
    pub fn from_params(params: &Parameters) -> Result<Self, ResonatorError> {
        let estimate = |name: &str| -> Result<Estimate, ResonatorError> {
            let p = params
                .get(name)
                .ok_or_else(|| ResonatorError::UnknownParameter(name.to_string()))?;
            Ok(Estimate::new(p.value, p.stderr))
        };
        Ok(Self {
            resonance_frequency: estimate(RESONANCE_FREQUENCY)?,
            coupling_loss: estimate(COUPLING_LOSS)?,
            internal_loss: estimate(INTERNAL_LOSS)?,
        })
    }

    pub fn value(&self, quantity: Quantity) -> f64 {
        let f_r = self.resonance_frequency.value;
        let c = self.coupling_loss.value;
        let i = self.internal_loss.value;
        let omega_r = 2.0 * PI * f_r;
        match quantity {
            Quantity::ResonanceFrequency => f_r,
            Quantity::AngularResonanceFrequency => omega_r,
            Quantity::TotalLoss => i + c,
            Quantity::CouplingQualityFactor => 1.0 / c,
            Quantity::InternalQualityFactor => 1.0 / i,
            Quantity::TotalQualityFactor => 1.0 / (i + c),
            Quantity::CouplingEnergyDecayRate => omega_r * c,
            Quantity::InternalEnergyDecayRate => omega_r * i,
            Quantity::TotalEnergyDecayRate => omega_r * (i + c),
        }
    }

    /// Standard error of `quantity`, or `MissingStderr` naming the first base
    /// parameter without one.
    pub fn error(&self, quantity: Quantity) -> Result<f64, ResonatorError> {
        let f_r = self.resonance_frequency.value;
        let c = self.coupling_loss.value;
        let i = self.internal_loss.value;
        let total = i + c;
        let sigma_f = || stderr(&self.resonance_frequency, RESONANCE_FREQUENCY);
        let sigma_c = || stderr(&self.coupling_loss, COUPLING_LOSS);
        let sigma_i = || stderr(&self.internal_loss, INTERNAL_LOSS);
        let sigma_total = || -> Result<f64, ResonatorError> { Ok(sigma_i()?.hypot(sigma_c()?)) };

        Ok(match quantity {
            Quantity::ResonanceFrequency => sigma_f()?,
            Quantity::AngularResonanceFrequency => 2.0 * PI * sigma_f()?,
            Quantity::TotalLoss => sigma_total()?,
            Quantity::CouplingQualityFactor => sigma_c()? / (c * c),
            Quantity::InternalQualityFactor => sigma_i()? / (i * i),
            Quantity::TotalQualityFactor => sigma_total()? / (total * total),
            Quantity::CouplingEnergyDecayRate => {
                self.value(quantity) * (sigma_f()? / f_r).hypot(sigma_c()? / c)
            }
            Quantity::InternalEnergyDecayRate => {
                self.value(quantity) * (sigma_f()? / f_r).hypot(sigma_i()? / i)
            }
            Quantity::TotalEnergyDecayRate => {
                self.value(quantity) * (sigma_f()? / f_r).hypot(sigma_total()? / total)
            }
        })
    }

    pub fn estimate(&self, quantity: Quantity) -> Estimate {
        Estimate::new(self.value(quantity), self.error(quantity).ok())
    }

    /// Look up `name`, `alias`, `name_error` or `alias_error`.
    ///
    /// Returns `None` when `name` is not a derived quantity.
    pub fn lookup(&self, name: &str) -> Option<Result<f64, ResonatorError>> {
        if let Some(q) = Quantity::from_name(name) {
            return Some(Ok(self.value(q)));
        }
        let base = name.strip_suffix("_error")?;
        Quantity::from_name(base).map(|q| self.error(q))
    }

    pub fn total_loss(&self) -> f64 {
        self.value(Quantity::TotalLoss)
    }

    pub fn internal_quality_factor(&self) -> f64 {
        self.value(Quantity::InternalQualityFactor)
    }

    pub fn coupling_quality_factor(&self) -> f64 {
        self.value(Quantity::CouplingQualityFactor)
    }

    pub fn total_quality_factor(&self) -> f64 {
        self.value(Quantity::TotalQualityFactor)
    }
}

fn stderr(estimate: &Estimate, name: &str) -> Result<f64, ResonatorError> {
    estimate
        .error
        .ok_or_else(|| ResonatorError::MissingStderr(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parameter;
    use approx::assert_relative_eq;

    fn quantities() -> ResonatorQuantities {
        ResonatorQuantities {
            resonance_frequency: Estimate::new(1e9, Some(1e3)),
            coupling_loss: Estimate::new(2e-6, Some(2e-8)),
            internal_loss: Estimate::new(1e-6, Some(1e-8)),
        }
    }

    #[test]
    fn losses_and_quality_factors_propagate_independent_errors() {
        let q = quantities();
        assert_relative_eq!(q.total_loss(), 3e-6, max_relative = 1e-12);
        assert_relative_eq!(
            q.error(Quantity::TotalLoss).unwrap(),
            (1e-8f64.powi(2) + 2e-8f64.powi(2)).sqrt(),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            q.error(Quantity::TotalLoss).unwrap(),
            2.236e-8,
            max_relative = 1e-3
        );
        assert_relative_eq!(q.internal_quality_factor(), 1e6, max_relative = 1e-12);
        assert_relative_eq!(q.error(Quantity::InternalQualityFactor).unwrap(), 1e4, max_relative = 1e-9);
        assert_relative_eq!(q.coupling_quality_factor(), 5e5, max_relative = 1e-12);
        assert_relative_eq!(q.error(Quantity::CouplingQualityFactor).unwrap(), 5e3, max_relative = 1e-9);
        assert_relative_eq!(
            q.error(Quantity::TotalQualityFactor).unwrap(),
            2.236_068e-8 / 9e-12,
            max_relative = 1e-6
        );
    }

    #[test]
    fn decay_rates_combine_relative_errors() {
        let q = quantities();
        let omega_r = 2.0 * PI * 1e9;
        assert_relative_eq!(q.value(Quantity::AngularResonanceFrequency), omega_r);
        assert_relative_eq!(q.error(Quantity::AngularResonanceFrequency).unwrap(), 2.0 * PI * 1e3);

        let rate = q.value(Quantity::CouplingEnergyDecayRate);
        assert_relative_eq!(rate, omega_r * 2e-6, max_relative = 1e-12);
        let expected = rate * ((1e3f64 / 1e9).powi(2) + (0.01f64).powi(2)).sqrt();
        assert_relative_eq!(
            q.error(Quantity::CouplingEnergyDecayRate).unwrap(),
            expected,
            max_relative = 1e-12
        );

        let total = q.value(Quantity::TotalEnergyDecayRate);
        let rel_total = (1e-8f64.powi(2) + 2e-8f64.powi(2)).sqrt() / 3e-6;
        assert_relative_eq!(
            q.error(Quantity::TotalEnergyDecayRate).unwrap(),
            total * ((1e-6f64).powi(2) + rel_total.powi(2)).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn lookup_resolves_aliases_and_error_suffix() {
        let q = quantities();
        assert_relative_eq!(q.lookup("Q_i").unwrap().unwrap(), 1e6, max_relative = 1e-12);
        assert_relative_eq!(q.lookup("Q_i_error").unwrap().unwrap(), 1e4, max_relative = 1e-9);
        assert_relative_eq!(q.lookup("f_r_error").unwrap().unwrap(), 1e3);
        assert!(q.lookup("coupling_loss").is_none());
        assert!(q.lookup("asymmetry_error").is_none());
    }

    #[test]
    fn missing_stderr_is_reported_by_name() {
        let params = Parameters::new()
            .with(RESONANCE_FREQUENCY, Parameter::new(1e9))
            .with(COUPLING_LOSS, Parameter::new(2e-6))
            .with(INTERNAL_LOSS, Parameter::new(1e-6));
        let q = ResonatorQuantities::from_params(&params).unwrap();
        assert_relative_eq!(q.total_quality_factor(), 1.0 / 3e-6, max_relative = 1e-12);
        assert_eq!(
            q.error(Quantity::InternalEnergyDecayRate),
            Err(ResonatorError::MissingStderr(RESONANCE_FREQUENCY.into()))
        );
        assert_eq!(q.estimate(Quantity::TotalLoss).error, None);
    }

    #[test]
    fn from_params_requires_losses() {
        let params = Parameters::new().with(RESONANCE_FREQUENCY, Parameter::new(1e9));
        assert_eq!(
            ResonatorQuantities::from_params(&params),
            Err(ResonatorError::UnknownParameter(COUPLING_LOSS.into()))
        );
    }
}
