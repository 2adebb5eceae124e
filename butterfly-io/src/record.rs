//! Way and relation records and their little-endian binary encoding.
//!
//! ```text
//! way      := u64 vertex_count, i32 type, vertex_count x (f64 lat, f64 lon)
//! relation := u64 member_count, i32 type, member_count x member
//! member   := u8 is_way_or_node, i32 role, (way | relation)
//! tile     := u64 way_count, u64 relation_count, f64 min_lat, max_lat,
//!             min_lon, max_lon, way_count x way, relation_count x relation
//! ```
//!
//! Node members of a relation are written as one-vertex way records.

use std::io::{self, Read, Write};

use butterfly_common::{Error, Result};
use butterfly_geometry::BBox;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Deepest relation nesting accepted when decoding.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WayRecord {
    pub kind: i32,
    pub points: Vec<Coord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberRecord {
    /// A way member, or a node member as a one-vertex way.
    Way { role: i32, way: WayRecord },
    Relation { role: i32, relation: RelationRecord },
}

impl MemberRecord {
    pub fn role(&self) -> i32 {
        match self {
            MemberRecord::Way { role, .. } | MemberRecord::Relation { role, .. } => *role,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationRecord {
    pub kind: i32,
    pub members: Vec<MemberRecord>,
}

/// Everything written for one tile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileRecords {
    pub bbox: BBox,
    pub ways: Vec<WayRecord>,
    pub relations: Vec<RelationRecord>,
}

impl TileRecords {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            ways: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ways.is_empty() && self.relations.is_empty()
    }
}

pub fn write_way<W: Write>(out: &mut W, way: &WayRecord) -> io::Result<()> {
    out.write_u64::<LittleEndian>(way.points.len() as u64)?;
    out.write_i32::<LittleEndian>(way.kind)?;
    for p in &way.points {
        out.write_f64::<LittleEndian>(p.lat)?;
        out.write_f64::<LittleEndian>(p.lon)?;
    }
    Ok(())
}

pub fn write_relation<W: Write>(out: &mut W, relation: &RelationRecord) -> io::Result<()> {
    out.write_u64::<LittleEndian>(relation.members.len() as u64)?;
    out.write_i32::<LittleEndian>(relation.kind)?;
    for member in &relation.members {
        match member {
            MemberRecord::Way { role, way } => {
                out.write_u8(1)?;
                out.write_i32::<LittleEndian>(*role)?;
                write_way(out, way)?;
            }
            MemberRecord::Relation { role, relation } => {
                out.write_u8(0)?;
                out.write_i32::<LittleEndian>(*role)?;
                write_relation(out, relation)?;
            }
        }
    }
    Ok(())
}

pub fn write_tile<W: Write>(out: &mut W, tile: &TileRecords) -> io::Result<()> {
    out.write_u64::<LittleEndian>(tile.ways.len() as u64)?;
    out.write_u64::<LittleEndian>(tile.relations.len() as u64)?;
    write_bbox(out, &tile.bbox)?;
    for way in &tile.ways {
        write_way(out, way)?;
    }
    for relation in &tile.relations {
        write_relation(out, relation)?;
    }
    Ok(())
}

pub(crate) fn write_bbox<W: Write>(out: &mut W, bbox: &BBox) -> io::Result<()> {
    for v in [bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon] {
        out.write_f64::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_bbox<R: Read>(input: &mut R) -> Result<BBox> {
    let mut v = [0.0; 4];
    for slot in &mut v {
        *slot = input.read_f64::<LittleEndian>().map_err(truncated)?;
    }
    Ok(BBox::new(v[0], v[1], v[2], v[3]))
}

/// Short reads inside a record mean a damaged file, not an I/O failure.
pub(crate) fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::DataError("tile database record is truncated".to_string())
    } else {
        Error::IoError(err)
    }
}

fn read_count<R: Read>(input: &mut R) -> Result<usize> {
    let n = input.read_u64::<LittleEndian>().map_err(truncated)?;
    usize::try_from(n)
        .map_err(|_| Error::DataError(format!("record count {n} does not fit in memory")))
}

pub fn read_way<R: Read>(input: &mut R) -> Result<WayRecord> {
    let n = read_count(input)?;
    let kind = input.read_i32::<LittleEndian>().map_err(truncated)?;
    let mut points = Vec::with_capacity(n.min(1 << 16));
    for _ in 0..n {
        let lat = input.read_f64::<LittleEndian>().map_err(truncated)?;
        let lon = input.read_f64::<LittleEndian>().map_err(truncated)?;
        points.push(Coord { lat, lon });
    }
    Ok(WayRecord { kind, points })
}

pub fn read_relation<R: Read>(input: &mut R) -> Result<RelationRecord> {
    read_relation_at(input, 0)
}

fn read_relation_at<R: Read>(input: &mut R, depth: usize) -> Result<RelationRecord> {
    if depth > MAX_DEPTH {
        return Err(Error::DataError(format!(
            "relation records nested deeper than {MAX_DEPTH}"
        )));
    }
    let n = read_count(input)?;
    let kind = input.read_i32::<LittleEndian>().map_err(truncated)?;
    let mut members = Vec::with_capacity(n.min(1 << 12));
    for _ in 0..n {
        let flag = input.read_u8().map_err(truncated)?;
        let role = input.read_i32::<LittleEndian>().map_err(truncated)?;
        members.push(match flag {
            0 => MemberRecord::Relation {
                role,
                relation: read_relation_at(input, depth + 1)?,
            },
            _ => MemberRecord::Way {
                role,
                way: read_way(input)?,
            },
        });
    }
    Ok(RelationRecord { kind, members })
}

pub fn read_tile<R: Read>(input: &mut R) -> Result<TileRecords> {
    let ways = read_count(input)?;
    let relations = read_count(input)?;
    let bbox = read_bbox(input)?;
    let mut tile = TileRecords::new(bbox);
    tile.ways.reserve(ways.min(1 << 16));
    for _ in 0..ways {
        tile.ways.push(read_way(input)?);
    }
    for _ in 0..relations {
        tile.relations.push(read_relation(input)?);
    }
    Ok(tile)
}
