//! CLI-specific utilities for butterfly-tiles
//!
//! Progress display and report formatting, kept apart from the library.

pub mod progress;

pub use progress::{format_elapsed, ProgressManager};
