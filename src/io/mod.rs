//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - CSV exports of measurements, normalized data and inversions (`export`)
//! - fit report JSON read/write (`report`)

pub mod export;
pub mod ingest;
pub mod report;

pub use export::*;
pub use ingest::*;
pub use report::*;
