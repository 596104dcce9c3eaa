//! CSV exports.
//!
//! Values are written with Rust's shortest round-trip formatting so that a
//! file written here reads back bit-for-bit through [`crate::io::ingest`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use num_complex::Complex64;

use crate::domain::{Inversion, Measurement};
use crate::error::AppError;
use crate::fit::ResonatorFitter;

/// Write a measurement in the sweep CSV layout.
pub fn write_measurement_csv(path: &Path, measurement: &Measurement) -> Result<(), AppError> {
    let mut out = create(path)?;
    let header = if measurement.errors().is_some() {
        "frequency,re,im,re_error,im_error"
    } else {
        "frequency,re,im"
    };
    writeln!(out, "{header}").map_err(write_error)?;

    for (k, (f, d)) in measurement.frequency().iter().zip(measurement.data()).enumerate() {
        let written = match measurement.errors() {
            Some(errors) => writeln!(out, "{},{},{},{},{}", f, d.re, d.im, errors[k].re, errors[k].im),
            None => writeln!(out, "{},{},{}", f, d.re, d.im),
        };
        written.map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

/// Write the measured data next to the data with the fitted background removed.
pub fn write_normalized_csv(path: &Path, fitter: &ResonatorFitter) -> Result<(), AppError> {
    let normalized = fitter.foreground_data()?;
    let mut out = create(path)?;
    writeln!(out, "frequency,re,im,normalized_re,normalized_im").map_err(write_error)?;
    for ((f, d), n) in fitter.frequency().iter().zip(fitter.data()).zip(&normalized) {
        writeln!(out, "{},{},{},{},{}", f, d.re, d.im, n.re, n.im).map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

/// Write continuous-wave samples (`re,im`).
pub fn write_cw_csv(path: &Path, data: &[Complex64]) -> Result<(), AppError> {
    let mut out = create(path)?;
    writeln!(out, "re,im").map_err(write_error)?;
    for d in data {
        writeln!(out, "{},{}", d.re, d.im).map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

/// Write an inversion time series.
pub fn write_inversion_csv(path: &Path, inversion: &Inversion) -> Result<(), AppError> {
    let mut out = create(path)?;
    writeln!(out, "index,detuning,internal_loss").map_err(write_error)?;
    for (k, (x, loss)) in inversion.detuning.iter().zip(&inversion.internal_loss).enumerate() {
        writeln!(out, "{k},{x},{loss}").map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn write_error(e: std::io::Error) -> AppError {
    AppError::new(4, format!("Failed to write export CSV: {e}"))
}
