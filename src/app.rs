//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads and fits measurements
//! - prints summaries
//! - writes optional exports

use clap::Parser;
use log::{info, warn};

use crate::cli::{Command, FitArgs, InvertArgs, ModelArgs, SimulateArgs};
use crate::data::{CwConfig, SweepConfig, generate_cw, generate_sweep};
use crate::domain::{Parameter, Parameters};
use crate::error::AppError;
use crate::io::{
    load_cw, write_cw_csv, write_inversion_csv, write_measurement_csv, write_normalized_csv,
    write_report_json,
};
use crate::math::FitOptions;
use crate::models::{
    ASYMMETRY, BACKGROUND_DELAY, BACKGROUND_MAGNITUDE, BACKGROUND_MAGNITUDE_SLOPE,
    BACKGROUND_PHASE, COUPLING_LOSS, INTERNAL_LOSS, RESONANCE_FREQUENCY,
};
use crate::report::{format_fit_summary, format_inversion_summary, format_parameters};

pub mod pipeline;

use pipeline::{RunConfig, build_background, build_foreground, build_overrides};

/// Entry point for the `resfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Invert(args) => handle_invert(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args);
    let runs = pipeline::run_fits(&config)?;
    let inputs = runs.len();

    let mut failed = 0usize;
    for (path, run) in runs {
        let run = match run {
            Ok(run) => run,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                failed += 1;
                continue;
            }
        };
        println!("{}", format_fit_summary(&run.report, &run.worst));
        println!(
            "Rows: read={} used={} | rms residual={:.3e}\n",
            run.ingest_rows_read,
            run.fitter.measurement().len(),
            run.rms_residual
        );

        if let Some(export) = &args.export_json {
            let out = pipeline::per_input_path(export, &run.source, inputs);
            write_report_json(&out, &run.report)?;
            info!("wrote {}", out.display());
        }
        if let Some(export) = &args.export_normalized {
            let out = pipeline::per_input_path(export, &run.source, inputs);
            write_normalized_csv(&out, &run.fitter)?;
            info!("wrote {}", out.display());
        }
    }

    if failed > 0 {
        return Err(AppError::new(4, format!("{failed} of {inputs} fits failed.")));
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let params = simulation_params(&args);
    let f_r = args.resonance_frequency;
    let sweep_config = SweepConfig {
        start: f_r * (1.0 - args.span / 2.0),
        stop: f_r * (1.0 + args.span / 2.0),
        points: args.points,
        noise: args.noise,
        seed: args.seed,
    };
    let frequency = crate::math::linspace(sweep_config.start, sweep_config.stop, sweep_config.points);
    let foreground = build_foreground(args.foreground);
    let background = build_background(args.background, &frequency);

    let sweep = generate_sweep(&sweep_config, foreground.as_ref(), background.as_ref(), &params)?;
    write_measurement_csv(&args.output, &sweep)?;
    println!("Wrote {} points to {}", sweep.len(), args.output.display());

    if let Some(cw_output) = &args.cw_output {
        let cw = generate_cw(
            &CwConfig {
                frequency: f_r,
                points: args.cw_points,
                detuning_jitter: args.detuning_jitter,
                internal_loss_jitter: args.internal_loss_jitter,
                noise: args.noise,
                seed: args.seed.wrapping_add(1),
            },
            foreground.as_ref(),
            background.as_ref(),
            &params,
        )?;
        write_cw_csv(cw_output, &cw.data)?;
        println!(
            "Wrote {} continuous-wave points at {} Hz to {}",
            cw.data.len(),
            cw.frequency,
            cw_output.display()
        );
    }

    let uses = |name: &str| {
        foreground
            .param_names()
            .iter()
            .chain(background.param_names())
            .any(|n| *n == name)
    };
    let used: Parameters = params
        .iter()
        .filter(|(name, _)| uses(*name))
        .map(|(name, p)| (name.to_string(), p.clone()))
        .collect();
    print!("{}", format_parameters(&used));
    Ok(())
}

fn handle_invert(args: InvertArgs) -> Result<(), AppError> {
    let config = RunConfig {
        inputs: vec![args.sweep.clone()],
        ..model_config(&args.model)
    };
    let ingest = pipeline::load_input(&args.sweep)?;
    let fitter = pipeline::fit_measurement(ingest.measurement, &config)?;
    let cw = load_cw(&args.cw)?;
    for e in &cw.row_errors {
        warn!("{}: line {}: {}", args.cw.display(), e.line, e.message);
    }

    let inversion = fitter.remove_background_and_invert(&cw.data, args.frequency)?;
    write_inversion_csv(&args.output, &inversion)?;

    print!("{}", format_parameters(fitter.params()));
    print!("{}", format_inversion_summary(&inversion));
    println!("Wrote {}", args.output.display());
    Ok(())
}

pub fn run_config_from_args(args: &FitArgs) -> RunConfig {
    RunConfig {
        inputs: args.inputs.clone(),
        power_dbm: args.power_dbm,
        drive_frequency: args.drive_frequency,
        top_n: args.top,
        ..model_config(&args.model)
    }
}

fn model_config(args: &ModelArgs) -> RunConfig {
    RunConfig {
        inputs: Vec::new(),
        foreground: args.foreground,
        background: args.background,
        overrides: build_overrides(&args.fix, &args.set),
        options: FitOptions {
            max_iterations: args.max_iterations,
            scale_covariance: !args.no_scale_covariance,
            ..FitOptions::default()
        },
        power_dbm: None,
        drive_frequency: None,
        top_n: 0,
    }
}

fn simulation_params(args: &SimulateArgs) -> Parameters {
    Parameters::new()
        .with(RESONANCE_FREQUENCY, Parameter::new(args.resonance_frequency))
        .with(COUPLING_LOSS, Parameter::new(args.coupling_loss))
        .with(INTERNAL_LOSS, Parameter::new(args.internal_loss))
        .with(ASYMMETRY, Parameter::new(args.asymmetry))
        .with(BACKGROUND_MAGNITUDE, Parameter::new(args.background_magnitude))
        .with(BACKGROUND_MAGNITUDE_SLOPE, Parameter::new(args.background_magnitude_slope))
        .with(BACKGROUND_PHASE, Parameter::new(args.background_phase))
        .with(BACKGROUND_DELAY, Parameter::new(args.background_delay))
}
