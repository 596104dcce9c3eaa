//! Read/write fit report JSON files.
//!
//! The report is the portable record of a fit:
//! - model names and source file
//! - best-fit and initial parameters with standard errors
//! - optimizer diagnostics
//! - derived quantities with their errors
//!
//! The schema is defined by `domain::FitReport`.

use std::fs::File;
use std::path::Path;

use crate::domain::FitReport;
use crate::error::AppError;

/// Write a report JSON file.
pub fn write_report_json(path: &Path, report: &FitReport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::new(4, format!("Failed to write report JSON: {e}")))?;
    Ok(())
}

/// Read a report JSON file.
pub fn read_report_json(path: &Path) -> Result<FitReport, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open report JSON '{}': {e}", path.display())))?;
    let report: FitReport =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid report JSON: {e}")))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::domain::{
        Estimate, FitDiagnostics, FitResult, Measurement, NamedEstimate, Parameter, Parameters,
    };
    use crate::fit::ResonatorFitter;
    use crate::math::FitOptions;
    use crate::models::{
        COUPLING_LOSS, INTERNAL_LOSS, Model, RESONANCE_FREQUENCY, Reflection, UnitBackground,
    };
    use crate::report::build_report;

    #[test]
    fn report_survives_json() {
        let params = Parameters::new()
            .with("resonance_frequency", Parameter::new(5e9).with_bounds(4.9e9, 5.1e9))
            .with("asymmetry", Parameter::fixed(0.1));
        let report = FitReport {
            tool: "resfit".into(),
            generated: "2025-01-01T00:00:00+00:00".into(),
            source: "sweep.csv".into(),
            foreground: "Shunt".into(),
            background: "UnitBackground".into(),
            points: 201,
            result: FitResult {
                params: params.clone(),
                init_params: params,
                diagnostics: FitDiagnostics {
                    success: true,
                    iterations: 7,
                    ..FitDiagnostics::default()
                },
            },
            derived: vec![NamedEstimate {
                name: "f_r".into(),
                estimate: Estimate::new(5e9, Some(12.0)),
            }],
            photon_number: Some(3.5),
        };

        let path = std::env::temp_dir().join(format!("resfit-{}-report.json", std::process::id()));
        write_report_json(&path, &report).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let read = read_report_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(text.contains("\"error\": 12.0"));
        assert_eq!(read.result, report.result);
        assert_eq!(read.derived, report.derived);
        assert_eq!(read.photon_number, Some(3.5));
    }

    #[test]
    fn report_with_infinite_quality_factor_reads_back() {
        let frequency: Vec<f64> = (0..101).map(|k| 5e9 * (1.0 - 2e-4 + 4e-6 * k as f64)).collect();
        let truth = Parameters::new()
            .with(RESONANCE_FREQUENCY, Parameter::new(5e9))
            .with(COUPLING_LOSS, Parameter::new(3e-5))
            .with(INTERNAL_LOSS, Parameter::new(1e-6));
        let data = Reflection.eval(&frequency, &truth).unwrap();
        let overrides = Parameters::new().with(INTERNAL_LOSS, Parameter::fixed(0.0));
        let fitter = ResonatorFitter::new(
            Measurement::new(frequency, data).unwrap(),
            Box::new(Reflection),
            Box::new(UnitBackground),
            Some(&overrides),
            &FitOptions::default(),
        )
        .unwrap();
        assert_eq!(fitter.get("Q_i").unwrap(), f64::INFINITY);

        let report = build_report(&fitter, "sweep.csv", None);
        assert!(report.derived.iter().all(|d| d.name != "internal_quality_factor"));

        let path = std::env::temp_dir().join(format!("resfit-{}-report-inf.json", std::process::id()));
        write_report_json(&path, &report).unwrap();
        let read = read_report_json(&path);
        std::fs::remove_file(&path).ok();
        let read = read.unwrap();

        let names = |r: &FitReport| r.derived.iter().map(|d| d.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&read), names(&report));
        assert_eq!(read.result.params.value(INTERNAL_LOSS).unwrap(), 0.0);
        assert_relative_eq!(
            read.result.diagnostics.chi_square,
            report.result.diagnostics.chi_square,
            max_relative = 1e-12
        );
    }

    #[test]
    fn diagnostics_without_degrees_of_freedom_read_back() {
        let result = FitResult {
            params: Parameters::new(),
            init_params: Parameters::new(),
            diagnostics: FitDiagnostics {
                reduced_chi_square: None,
                ..FitDiagnostics::default()
            },
        };
        let text = serde_json::to_string(&result).unwrap();
        let read: FitResult = serde_json::from_str(&text).unwrap();
        assert_eq!(read, result);
    }

    #[test]
    fn missing_report_is_usage_error() {
        let err = read_report_json(Path::new("/nonexistent/report.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
