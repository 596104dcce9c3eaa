//! Data sources other than measurement files.

pub mod synthetic;

pub use synthetic::*;
