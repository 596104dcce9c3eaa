//! Model plug-ins and their composition.
//!
//! Foreground and background models implement small traits so that the
//! fitting code stays generic over resonator topology and background shape.

pub mod background;
pub mod composite;
pub mod foreground;
pub mod model;

pub use background::*;
pub use composite::*;
pub use foreground::*;
pub use model::*;
