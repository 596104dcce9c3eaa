//! Domain types used throughout the fitter.
//!
//! This module defines:
//!
//! - named fit parameters (`Parameter`, `Parameters`)
//! - validated measurements (`Measurement`)
//! - fit outputs (`FitResult`, `FitDiagnostics`, `MeasurementModelResonance`, `Inversion`)
//! - the saved report schema (`FitReport`)

pub mod params;
pub mod types;

pub use params::*;
pub use types::*;
