//! Shared fit pipeline used by the `fit` and `invert` commands.
//!
//! CSV ingest -> model construction -> parallel fit -> residuals -> report
//!
//! The command handlers then only deal with presentation and exports.

use std::path::{Path, PathBuf};

use log::warn;

use crate::domain::{BackgroundKind, FitReport, ForegroundKind, Measurement, Parameter, Parameters};
use crate::error::AppError;
use crate::fit::{FitJob, ResonatorFitter, fit_batch};
use crate::io::{IngestedData, load_measurement};
use crate::math::FitOptions;
use crate::models::{
    BackgroundModel, MagnitudePhase, MagnitudeSlopePhaseDelay, RESONANCE_FREQUENCY, Reflection,
    ResonatorModel, Shunt, UnitBackground,
};
use crate::report::{PointResidual, build_report, compute_residuals, rms_residual, worst_points};

/// Resolved settings for one run, built from CLI flags plus defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub inputs: Vec<PathBuf>,
    pub foreground: ForegroundKind,
    pub background: BackgroundKind,
    /// Caller overrides merged over every guess.
    pub overrides: Parameters,
    pub options: FitOptions,
    pub power_dbm: Option<f64>,
    pub drive_frequency: Option<f64>,
    pub top_n: usize,
}

/// All computed outputs for one input file.
#[derive(Debug)]
pub struct FitRun {
    pub source: PathBuf,
    pub ingest_rows_read: usize,
    pub fitter: ResonatorFitter,
    pub report: FitReport,
    pub rms_residual: f64,
    pub worst: Vec<PointResidual>,
}

pub fn build_foreground(kind: ForegroundKind) -> Box<dyn ResonatorModel> {
    match kind {
        ForegroundKind::Shunt => Box::new(Shunt),
        ForegroundKind::Reflection => Box::new(Reflection),
    }
}

/// The slope-delay background is referenced to the center of `frequency`.
pub fn build_background(kind: BackgroundKind, frequency: &[f64]) -> Box<dyn BackgroundModel> {
    match kind {
        BackgroundKind::Unit => Box::new(UnitBackground),
        BackgroundKind::MagnitudePhase => Box::new(MagnitudePhase),
        BackgroundKind::SlopeDelay => Box::new(MagnitudeSlopePhaseDelay::centered_on(frequency)),
    }
}

/// Overrides from `--fix` (held constant) and `--set` (initial value only).
pub fn build_overrides(fix: &[(String, f64)], set: &[(String, f64)]) -> Parameters {
    let mut overrides = Parameters::new();
    for (name, value) in set {
        overrides.insert(name.clone(), Parameter::new(*value));
    }
    for (name, value) in fix {
        overrides.insert(name.clone(), Parameter::fixed(*value));
    }
    overrides
}

/// Load a sweep and report skipped rows.
pub fn load_input(path: &Path) -> Result<IngestedData, AppError> {
    let ingest = load_measurement(path)?;
    for e in &ingest.row_errors {
        warn!("{}: line {}: {}", path.display(), e.line, e.message);
    }
    Ok(ingest)
}

/// Fit one measurement with the configured models.
pub fn fit_measurement(measurement: Measurement, config: &RunConfig) -> Result<ResonatorFitter, AppError> {
    let background = build_background(config.background, measurement.frequency());
    let fitter = ResonatorFitter::new(
        measurement,
        build_foreground(config.foreground),
        background,
        overrides(config),
        &config.options,
    )?;
    Ok(fitter)
}

/// Load and fit every input. Inputs that fail to load abort the run; fits
/// that fail are returned per input.
pub fn run_fits(config: &RunConfig) -> Result<Vec<(PathBuf, Result<FitRun, AppError>)>, AppError> {
    let mut jobs = Vec::with_capacity(config.inputs.len());
    let mut rows_read = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        let ingest = load_input(path)?;
        rows_read.push(ingest.rows_read);
        let background = build_background(config.background, ingest.measurement.frequency());
        jobs.push(FitJob {
            label: path.display().to_string(),
            measurement: ingest.measurement,
            foreground: build_foreground(config.foreground),
            background,
            params: overrides(config).cloned(),
        });
    }

    let fitted = fit_batch(jobs, &config.options);
    Ok(config
        .inputs
        .iter()
        .zip(rows_read)
        .zip(fitted)
        .map(|((path, rows_read), (_, fitter))| {
            let run = fitter
                .map_err(AppError::from)
                .and_then(|fitter| finish_run(path, rows_read, fitter, config));
            (path.clone(), run)
        })
        .collect())
}

fn finish_run(path: &Path, rows_read: usize, fitter: ResonatorFitter, config: &RunConfig) -> Result<FitRun, AppError> {
    let photon_number = match config.power_dbm {
        Some(power) => {
            let drive = match config.drive_frequency {
                Some(f) => f,
                None => fitter.value(RESONANCE_FREQUENCY)?,
            };
            Some(fitter.photon_number_from_power(drive, power)?)
        }
        None => None,
    };
    let residuals = compute_residuals(&fitter)?;
    let report = build_report(&fitter, &path.display().to_string(), photon_number);
    Ok(FitRun {
        source: path.to_path_buf(),
        ingest_rows_read: rows_read,
        rms_residual: rms_residual(&residuals),
        worst: worst_points(&residuals, config.top_n),
        fitter,
        report,
    })
}

fn overrides(config: &RunConfig) -> Option<&Parameters> {
    (!config.overrides.is_empty()).then_some(&config.overrides)
}

/// `report.json` becomes `report-<input stem>.json` when several inputs share
/// one export path.
pub fn per_input_path(export: &Path, input: &Path, inputs: usize) -> PathBuf {
    if inputs <= 1 {
        return export.to_path_buf();
    }
    let stem = export.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let input_stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match export.extension() {
        Some(ext) => format!("{stem}-{input_stem}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{input_stem}"),
    };
    export.with_file_name(name)
}
