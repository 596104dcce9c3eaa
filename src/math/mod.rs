//! Numerical utilities: linear least squares, Levenberg–Marquardt and phase helpers.

pub mod lm;
pub mod ols;
pub mod phase;

pub use lm::*;
pub use ols::*;
pub use phase::*;
