//! OSM PBF ingestion for the butterfly-osm tile converter
//!
//! Reads an `.osm.pbf` stream block by block into an arena-based entity
//! model under fixed memory caps, resolving way and relation references
//! across sub-passes.

pub mod classify;
pub mod decode;
pub mod delta;
pub mod ingest;
pub mod model;
pub mod pbf;
pub mod pending;
pub mod proto;
pub mod store;

pub use ingest::{Drain, IngestStats, Ingestor};
pub use model::{
    Member, MemberKind, Node, NodeLookup, Relation, Role, SemanticType, Single, Way,
    INTERSECTION_ID, INVALID_ID, MERGED_ID,
};
pub use store::EntityStore;
