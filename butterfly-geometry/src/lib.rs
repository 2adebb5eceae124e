//! Planar geometry for the butterfly-osm tile converter
//!
//! Coordinates are degrees with `x = lon` and `y = lat`. Everything here is a
//! pure function over slices; the engine owns the vertex storage.

pub mod clip;
pub mod kernel;
pub mod merge;
pub mod simplify;

pub use clip::{clip, Clipped};
pub use kernel::{BBox, Orientation, Vec2, Vec3, Vertex};
pub use merge::{try_merge, Placement};
pub use simplify::{douglas_peucker, visvalingam_whyatt, vw_keep};
