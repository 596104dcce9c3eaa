//! Fitting orchestration.
//!
//! Responsibilities:
//!
//! - turn measurement errors into residual weights
//! - guess, fit and re-fit one measurement against a composite model
//! - derive quality factors and decay rates with propagated errors
//! - fit many independent measurements in parallel

pub mod batch;
pub mod derived;
pub mod fitter;
pub mod weights;

pub use batch::*;
pub use derived::*;
pub use fitter::*;
pub use weights::*;
