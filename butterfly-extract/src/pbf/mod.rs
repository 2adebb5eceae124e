//! Length-prefixed OSMPBF block stream.
//!
//! Each block is `[i32 BE header length][BlobHeader][Blob]`, the blob holding
//! a raw or zlib-compressed `HeaderBlock` or `PrimitiveBlock`.

mod reader;
mod writer;

pub use reader::BlockReader;
pub use writer::{BlockBuilder, PbfWriter, RawMember, RawNode, RawRelation, RawWay};

use crate::proto::osmformat::{HeaderBlock, PrimitiveBlock};

/// Largest accepted `BlobHeader`.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;
/// Largest accepted blob, compressed or not.
pub const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

pub const OSM_HEADER: &str = "OSMHeader";
pub const OSM_DATA: &str = "OSMData";

/// One decoded block of the stream.
#[derive(Debug)]
pub enum Block {
    Header(Box<HeaderBlock>),
    Data(Box<PrimitiveBlock>),
    /// Payload that could not be decompressed or has an unknown type.
    Skipped,
}
