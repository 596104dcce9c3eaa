//! Formatted terminal output.
//!
//! Formatting lives in one place so the fitting code stays free of
//! presentation concerns.

use crate::domain::{FitReport, Inversion, Parameters};
use crate::report::PointResidual;

/// Format the summary of one fit: model, diagnostics, parameters and derived
/// quantities.
pub fn format_fit_summary(report: &FitReport, residuals: &[PointResidual]) -> String {
    let d = &report.result.diagnostics;
    let mut out = String::new();

    out.push_str(&format!("=== {} ===\n", report.source));
    out.push_str(&format!(
        "Model: {} * {} | points={}\n",
        report.background, report.foreground, report.points
    ));
    out.push_str(&format!(
        "Fit: {} | iterations={} | evaluations={} | chi2={:.4e} | redchi={}\n",
        if d.success { "converged" } else { "NOT CONVERGED" },
        d.iterations,
        d.function_evaluations,
        d.chi_square,
        d.reduced_chi_square.map_or("n/a".to_string(), |r| format!("{r:.4e}")),
    ));
    if !d.message.is_empty() {
        out.push_str(&format!("  {}\n", d.message));
    }

    out.push_str("\nParameters:\n");
    out.push_str(&format_parameters(&report.result.params));

    if !report.derived.is_empty() {
        out.push_str("\nDerived:\n");
        for q in &report.derived {
            out.push_str(&format!(
                "  {:<28} {}\n",
                q.name,
                fmt_estimate(q.estimate.value, q.estimate.error)
            ));
        }
    }
    if let Some(n) = report.photon_number {
        out.push_str(&format!("  {:<28} {n:.4e}\n", "photon_number"));
    }

    if !residuals.is_empty() {
        out.push_str("\nLargest residuals:\n");
        out.push_str(
            format!("  {:>6} {:>18} {:>12}\n", "index", "frequency", "normalized")
                .trim_end(),
        );
        out.push('\n');
        for r in residuals {
            out.push_str(&format!(
                "  {:>6} {:>18.1} {:>12.4}\n",
                r.index, r.frequency, r.normalized
            ));
        }
    }

    out
}

/// One line per parameter: value, error and whether it was varied.
pub fn format_parameters(params: &Parameters) -> String {
    let mut out = String::new();
    for (name, p) in params.iter() {
        let flag = if p.vary { "" } else { " (fixed)" };
        out.push_str(&format!(
            "  {:<28} {}{flag}\n",
            name,
            fmt_estimate(p.value, p.stderr)
        ));
    }
    out
}

/// Mean and spread of an inversion time series.
pub fn format_inversion_summary(inversion: &Inversion) -> String {
    let (x_mean, x_std) = mean_std(&inversion.detuning);
    let (i_mean, i_std) = mean_std(&inversion.internal_loss);
    format!(
        "Inversion: samples={}\n  detuning      mean={x_mean:.4e} std={x_std:.4e}\n  internal_loss mean={i_mean:.4e} std={i_std:.4e}\n",
        inversion.len()
    )
}

fn fmt_estimate(value: f64, error: Option<f64>) -> String {
    match error {
        Some(e) => format!("{value:.6e} ± {e:.2e}"),
        None => format!("{value:.6e}"),
    }
}

fn mean_std(v: &[f64]) -> (f64, f64) {
    if v.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
