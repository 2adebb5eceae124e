//! Common error types and run configuration for the butterfly-osm tile converter

pub mod config;
pub mod error;
pub mod suggest;

pub use config::{ConvertConfig, Limits, LineSimplification, Sorting, Verbosity, LOD_COUNT};
pub use error::{Error, Result};
