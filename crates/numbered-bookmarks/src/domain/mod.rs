//! Domain value types shared by every layer.

pub mod errors;
pub mod model;
