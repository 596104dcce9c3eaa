//! Linear least squares.
//!
//! Background guessing repeatedly fits straight lines (magnitude vs frequency,
//! unwrapped phase vs frequency). These are tiny problems, so we build the
//! design matrix explicitly and solve it by SVD, which also copes with tall
//! (more rows than columns) systems.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = intercept + slope * x` and return `(intercept, slope)`.
///
/// `x` should be centered near zero by the caller (e.g. frequency minus a
/// reference frequency) so the columns are well scaled.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some((y[0], 0.0));
    }

    // Scale the slope column to unit range; SVD tolerances are relative.
    let scale = x[..n].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let mut design = DMatrix::<f64>::zeros(n, 2);
    for i in 0..n {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = x[i] / scale;
    }
    let rhs = DVector::from_row_slice(&y[..n]);
    let beta = solve_least_squares(&design, &rhs)?;
    Some((beta[0], beta[1] / scale))
}
