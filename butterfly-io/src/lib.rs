//! Tile database files of the butterfly-osm converter
//!
//! A database directory holds, for every active LOD `LL`, a payload file
//! `dataLL` and an index `lookupLL`, plus one `meta` file. All binary
//! values are little-endian.

pub mod meta;
pub mod record;
pub mod text;
pub mod tiledb;

pub use meta::{Meta, FORMAT_VERSION};
pub use record::{Coord, MemberRecord, RelationRecord, TileRecords, WayRecord};
pub use tiledb::{
    data_path, lookup_path, meta_path, prepare_output, GridHeader, LodWriter, Lookup,
    LookupEntry, TileDb, WriteSummary,
};
