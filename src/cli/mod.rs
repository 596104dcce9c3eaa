//! Command-line parsing for the resonator fitter.
//!
//! Argument parsing and command dispatch stay separate from the modeling and
//! math code; handlers live in [`crate::app`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{BackgroundKind, ForegroundKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "resfit", version, about = "Fit resonator scattering data and derive quality factors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one or more sweep CSV files and print parameters and derived quantities.
    Fit(FitArgs),
    /// Write a synthetic sweep (and optionally continuous-wave data) to CSV.
    Simulate(SimulateArgs),
    /// Fit a sweep, then normalize and invert continuous-wave data taken at one frequency.
    Invert(InvertArgs),
}

/// Model selection and optimizer options shared by `fit` and `invert`.
#[derive(Debug, Parser, Clone)]
pub struct ModelArgs {
    /// Resonator topology.
    #[arg(long, value_enum, default_value_t = ForegroundKind::Shunt)]
    pub foreground: ForegroundKind,

    /// Background model.
    #[arg(long, value_enum, default_value_t = BackgroundKind::MagnitudePhase)]
    pub background: BackgroundKind,

    /// Fix a parameter at a value, e.g. `--fix background_delay=0` (repeatable).
    #[arg(long, value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub fix: Vec<(String, f64)>,

    /// Override a parameter's initial value, e.g. `--set asymmetry=0.1` (repeatable).
    #[arg(long, value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, f64)>,

    /// Maximum optimizer iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Report unscaled standard errors (do not multiply the covariance by the reduced chi-square).
    #[arg(long)]
    pub no_scale_covariance: bool,
}

/// Options for `resfit fit`.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Sweep CSV files (`frequency,re,im[,re_error,im_error]`); several files are fitted in parallel.
    #[arg(required = true, value_name = "CSV")]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Write the fit report to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Write measured and background-normalized data to CSV.
    #[arg(long = "export-normalized")]
    pub export_normalized: Option<PathBuf>,

    /// Drive power at the resonator input in dBm, for the photon number.
    #[arg(long, allow_negative_numbers = true)]
    pub power_dbm: Option<f64>,

    /// Drive frequency for the photon number (default: fitted resonance frequency).
    #[arg(long, requires = "power_dbm")]
    pub drive_frequency: Option<f64>,

    /// Show the N points with the largest residuals.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

/// Options for `resfit simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Sweep CSV to write.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = ForegroundKind::Shunt)]
    pub foreground: ForegroundKind,

    #[arg(long, value_enum, default_value_t = BackgroundKind::MagnitudePhase)]
    pub background: BackgroundKind,

    #[arg(long, default_value_t = 5e9)]
    pub resonance_frequency: f64,

    #[arg(long, default_value_t = 5e-5)]
    pub coupling_loss: f64,

    #[arg(long, default_value_t = 2e-5)]
    pub internal_loss: f64,

    /// Shunt asymmetry.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub asymmetry: f64,

    #[arg(long, default_value_t = 1.0)]
    pub background_magnitude: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub background_magnitude_slope: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub background_phase: f64,

    /// Cable delay in seconds.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub background_delay: f64,

    /// Number of sweep points.
    #[arg(long, default_value_t = 201)]
    pub points: usize,

    /// Full sweep span as a fraction of the resonance frequency.
    #[arg(long, default_value_t = 4e-4)]
    pub span: f64,

    /// Noise standard deviation on each of the real and imaginary parts.
    #[arg(long, default_value_t = 1e-3)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Also write continuous-wave data taken at the resonance frequency.
    #[arg(long)]
    pub cw_output: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub cw_points: usize,

    /// Standard deviation of the fractional resonance frequency jitter in the CW data.
    #[arg(long, default_value_t = 1e-6)]
    pub detuning_jitter: f64,

    /// Standard deviation of the internal loss jitter in the CW data.
    #[arg(long, default_value_t = 1e-6)]
    pub internal_loss_jitter: f64,
}

/// Options for `resfit invert`.
#[derive(Debug, Parser, Clone)]
pub struct InvertArgs {
    /// Sweep CSV used to fit the background and resonator.
    #[arg(long)]
    pub sweep: PathBuf,

    /// Continuous-wave CSV (`re,im`).
    #[arg(long)]
    pub cw: PathBuf,

    /// Frequency at which the continuous-wave data was taken.
    #[arg(long)]
    pub frequency: f64,

    /// Inversion CSV to write (`index,detuning,internal_loss`).
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Parse `NAME=VALUE`.
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{s}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in '{s}': {e}"))?;
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments() {
        assert_eq!(parse_assignment("background_delay=0"), Ok(("background_delay".into(), 0.0)));
        assert_eq!(parse_assignment(" asymmetry = -1e-2 "), Ok(("asymmetry".into(), -0.01)));
        assert!(parse_assignment("asymmetry").is_err());
        assert!(parse_assignment("=1").is_err());
        assert!(parse_assignment("a=x").is_err());
    }

    #[test]
    fn fit_command_parses_models_and_repeated_fixes() {
        let cli = Cli::try_parse_from([
            "resfit",
            "fit",
            "a.csv",
            "b.csv",
            "--foreground",
            "reflection",
            "--background",
            "slope-delay",
            "--fix",
            "background_delay=0",
            "--fix",
            "background_magnitude_slope=0",
            "--power-dbm",
            "-120",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.model.foreground, ForegroundKind::Reflection);
        assert_eq!(args.model.background, BackgroundKind::SlopeDelay);
        assert_eq!(args.model.fix.len(), 2);
        assert_eq!(args.power_dbm, Some(-120.0));
        assert_eq!(args.drive_frequency, None);
    }

    #[test]
    fn drive_frequency_requires_power() {
        assert!(Cli::try_parse_from(["resfit", "fit", "a.csv", "--drive-frequency", "5e9"]).is_err());
        assert!(Cli::try_parse_from(["resfit", "fit"]).is_err());
    }
}
