//! # Butterfly-tiles
//!
//! Converts an OpenStreetMap PBF extract into a tile database with up to
//! 16 levels of detail. Ingestion runs in bounded sub-passes; every drained
//! sub-pass is generalized for each active LOD and merged into the LOD's
//! files.
//!
//! ```no_run
//! use butterfly_common::ConvertConfig;
//!
//! let config = ConvertConfig {
//!     input: "monaco-latest.osm.pbf".into(),
//!     output: "tiles".into(),
//!     ..Default::default()
//! };
//! let report = butterfly_tiles::convert(&config, None)?;
//! println!("{} ways at the finest LOD", report.meta.way_count);
//! # Ok::<(), butterfly_common::Error>(())
//! ```

pub mod assign;
pub mod generalize;
pub mod grid;
pub mod lod;
pub mod pipeline;
pub mod workspace;

pub use pipeline::{convert, Context, LodSummary, Progress, ProgressCallback, Report};
