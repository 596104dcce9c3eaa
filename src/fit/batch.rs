//! Parallel fitting of independent measurements.

use rayon::prelude::*;

use crate::domain::{Measurement, Parameters};
use crate::error::ResonatorError;
use crate::fit::ResonatorFitter;
use crate::math::FitOptions;
use crate::models::{BackgroundModel, ResonatorModel};

/// One measurement with the models and overrides to fit it with.
pub struct FitJob {
    pub label: String,
    pub measurement: Measurement,
    pub foreground: Box<dyn ResonatorModel>,
    pub background: Box<dyn BackgroundModel>,
    pub params: Option<Parameters>,
}

/// Fit every job on the rayon pool. Results come back in input order.
pub fn fit_batch(
    jobs: Vec<FitJob>,
    options: &FitOptions,
) -> Vec<(String, Result<ResonatorFitter, ResonatorError>)> {
    jobs.into_par_iter()
        .map(|job| {
            let fitter = ResonatorFitter::new(
                job.measurement,
                job.foreground,
                job.background,
                job.params.as_ref(),
                options,
            );
            (job.label, fitter)
        })
        .collect()
}
