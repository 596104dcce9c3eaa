//! `resfit` library crate.
//!
//! Fits superconducting-resonator scattering data with a composite
//! background × foreground model and derives quality factors, decay rates
//! and photon numbers with propagated errors.
//!
//! The binary (`resfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitter is reusable from other tools and notebooks

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
