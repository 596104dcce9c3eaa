//! Reporting utilities: residuals, saved reports and formatted terminal output.

pub mod format;

pub use format::*;

use chrono::Utc;
use num_complex::Complex64;

use crate::domain::{Estimate, FitReport, NamedEstimate};
use crate::error::ResonatorError;
use crate::fit::{Quantity, ResonatorFitter};

/// Name written into saved reports.
pub const TOOL_NAME: &str = "resfit";

/// Data minus best-fit model at one measured point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointResidual {
    pub index: usize,
    pub frequency: f64,
    pub residual: Complex64,
    /// `|residual|` divided by the point's error magnitude, or by one when the
    /// measurement carries no errors.
    pub normalized: f64,
    /// False when both error components are infinite, so the point carried
    /// no weight in the fit.
    pub fitted: bool,
}

/// Compute the residual of every measured point.
pub fn compute_residuals(fitter: &ResonatorFitter) -> Result<Vec<PointResidual>, ResonatorError> {
    let model = fitter.model_values(None, None)?;
    let errors = fitter.measurement().errors();
    Ok(fitter
        .frequency()
        .iter()
        .zip(fitter.data())
        .zip(&model)
        .enumerate()
        .map(|(index, ((&frequency, d), m))| {
            let residual = d - m;
            let error = errors.map(|e| e[index]);
            let scale = error.map_or(1.0, |e| e.norm());
            PointResidual {
                index,
                frequency,
                residual,
                normalized: residual.norm() / scale,
                fitted: error.is_none_or(|e| e.re.is_finite() || e.im.is_finite()),
            }
        })
        .collect())
}

/// The `top_n` points with the largest normalized residuals, largest first.
pub fn worst_points(residuals: &[PointResidual], top_n: usize) -> Vec<PointResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.normalized.total_cmp(&a.normalized));
    sorted.truncate(top_n);
    sorted
}

/// Root-mean-square residual magnitude over the points that entered the fit.
pub fn rms_residual(residuals: &[PointResidual]) -> f64 {
    let (sum, count) = residuals
        .iter()
        .filter(|r| r.fitted)
        .fold((0.0, 0usize), |(sum, count), r| (sum + r.residual.norm_sqr(), count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}

/// Every derived quantity that applies to the fit, with its error when available.
///
/// Quantities that are not finite (`Q_i` at zero internal loss) are left out.
pub fn derived_estimates(fitter: &ResonatorFitter) -> Vec<NamedEstimate> {
    let Ok(quantities) = fitter.quantities() else {
        return Vec::new();
    };
    Quantity::ALL
        .into_iter()
        .map(|q| (q, quantities.estimate(q)))
        .filter(|(_, estimate)| estimate.value.is_finite())
        .map(|(q, estimate)| NamedEstimate {
            name: q.name().to_string(),
            estimate: Estimate::new(estimate.value, estimate.error.filter(|e| e.is_finite())),
        })
        .collect()
}

/// Assemble the saved report for one fit.
pub fn build_report(fitter: &ResonatorFitter, source: &str, photon_number: Option<f64>) -> FitReport {
    FitReport {
        tool: TOOL_NAME.to_string(),
        generated: Utc::now().to_rfc3339(),
        source: source.to_string(),
        foreground: fitter.foreground().name().to_string(),
        background: fitter.background().name().to_string(),
        points: fitter.measurement().len(),
        result: fitter.result().clone(),
        derived: derived_estimates(fitter),
        photon_number: photon_number.filter(|n| n.is_finite()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Measurement, Parameter, Parameters};
    use crate::math::FitOptions;
    use crate::models::{
        COUPLING_LOSS, INTERNAL_LOSS, Model, RESONANCE_FREQUENCY, Reflection, UnitBackground,
    };

    fn fitter_with_outlier() -> ResonatorFitter {
        let frequency: Vec<f64> = (0..101).map(|k| 5e9 * (1.0 - 2e-4 + 4e-6 * k as f64)).collect();
        let truth = Parameters::new()
            .with(RESONANCE_FREQUENCY, Parameter::new(5e9))
            .with(COUPLING_LOSS, Parameter::new(3e-5))
            .with(INTERNAL_LOSS, Parameter::new(2e-5));
        let mut data = Reflection.eval(&frequency, &truth).unwrap();
        data[90] += Complex64::new(0.05, 0.0);
        ResonatorFitter::new(
            Measurement::new(frequency, data).unwrap(),
            Box::new(Reflection),
            Box::new(UnitBackground),
            None,
            &FitOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn worst_point_is_the_outlier() {
        let fitter = fitter_with_outlier();
        let residuals = compute_residuals(&fitter).unwrap();
        assert_eq!(residuals.len(), 101);
        let worst = worst_points(&residuals, 3);
        assert_eq!(worst.len(), 3);
        assert_eq!(worst[0].index, 90);
        assert!(worst[0].normalized >= worst[1].normalized);
        assert!(rms_residual(&residuals) > 0.0);
    }

    #[test]
    fn rms_skips_points_excluded_from_the_fit() {
        let frequency: Vec<f64> = (0..101).map(|k| 5e9 * (1.0 - 2e-4 + 4e-6 * k as f64)).collect();
        let truth = Parameters::new()
            .with(RESONANCE_FREQUENCY, Parameter::new(5e9))
            .with(COUPLING_LOSS, Parameter::new(3e-5))
            .with(INTERNAL_LOSS, Parameter::new(2e-5));
        let mut data = Reflection.eval(&frequency, &truth).unwrap();
        data[10] += Complex64::new(0.1, 0.1);
        let mut errors = vec![Complex64::new(1e-3, 1e-3); data.len()];
        errors[10] = Complex64::new(f64::INFINITY, f64::INFINITY);
        let measurement = Measurement::new(frequency, data)
            .unwrap()
            .with_errors(errors)
            .unwrap();
        let fitter = ResonatorFitter::new(
            measurement,
            Box::new(Reflection),
            Box::new(UnitBackground),
            None,
            &FitOptions::default(),
        )
        .unwrap();

        let residuals = compute_residuals(&fitter).unwrap();
        assert!(!residuals[10].fitted);
        assert!(residuals[10].residual.norm() > 0.1);
        assert!(residuals.iter().enumerate().all(|(k, r)| r.fitted == (k != 10)));
        assert!(rms_residual(&residuals) < 1e-6);
    }

    #[test]
    fn report_lists_every_derived_quantity() {
        let fitter = fitter_with_outlier();
        let report = build_report(&fitter, "sweep.csv", Some(12.5));
        assert_eq!(report.tool, TOOL_NAME);
        assert_eq!(report.foreground, "Reflection");
        assert_eq!(report.background, "UnitBackground");
        assert_eq!(report.points, 101);
        assert_eq!(report.derived.len(), Quantity::ALL.len());
        assert_eq!(report.derived[0].name, "f_r");
        assert!(report.derived.iter().all(|d| d.estimate.error.is_some()));
        assert!(chrono::DateTime::parse_from_rfc3339(&report.generated).is_ok());
    }
}
