//! Decoding of primitive groups into borrowed entity values.

use butterfly_common::{Error, Result};
use log::debug;

use crate::delta::{self, DeltaDecoder};
use crate::model::MemberKind;
use crate::proto::osmformat::{relation::MemberType, DenseNodes, PrimitiveBlock, PrimitiveGroup};

/// The three entity kinds, in ingestion priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Nodes,
    Ways,
    Relations,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Nodes, EntityKind::Ways, EntityKind::Relations];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Entity count per kind within one block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockCounts {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

impl BlockCounts {
    pub fn of(block: &PrimitiveBlock) -> Self {
        let mut counts = Self::default();
        for group in &block.primitivegroup {
            counts.nodes += group.nodes.len() as u64 + group.dense.id.len() as u64;
            counts.ways += group.ways.len() as u64;
            counts.relations += group.relations.len() as u64;
        }
        counts
    }

    pub fn get(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Nodes => self.nodes,
            EntityKind::Ways => self.ways,
            EntityKind::Relations => self.relations,
        }
    }
}

/// Kind of the entities a group carries; a group holds only one kind.
pub fn group_kind(group: &PrimitiveGroup) -> Option<EntityKind> {
    if !group.nodes.is_empty() || group.dense.is_some() {
        Some(EntityKind::Nodes)
    } else if !group.ways.is_empty() {
        Some(EntityKind::Ways)
    } else if !group.relations.is_empty() {
        Some(EntityKind::Relations)
    } else {
        None
    }
}

pub type Tags<'a> = Vec<(&'a str, &'a str)>;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNode<'a> {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWay<'a> {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Tags<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedMember<'a> {
    pub kind: MemberKind,
    pub id: i64,
    pub role: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRelation<'a> {
    pub id: i64,
    pub members: Vec<DecodedMember<'a>>,
    pub tags: Tags<'a>,
}

/// Largest coordinate magnitude in nanodegrees: `i32::MAX` steps of 100.
const MAX_NANODEGREES: u64 = i32::MAX as u64 * 100;

/// Block-wide decoding parameters: string table and coordinate scaling.
pub struct BlockContext<'a> {
    strings: &'a [Vec<u8>],
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl<'a> BlockContext<'a> {
    pub fn new(block: &'a PrimitiveBlock) -> Self {
        let ctx = Self {
            strings: &block.stringtable.s,
            granularity: i64::from(block.granularity()),
            lat_offset: block.lat_offset(),
            lon_offset: block.lon_offset(),
        };
        debug!(
            "Data block: granularity {}, offsets ({}, {}), {} strings, {} groups",
            ctx.granularity,
            ctx.lat_offset,
            ctx.lon_offset,
            ctx.strings.len(),
            block.primitivegroup.len()
        );
        ctx
    }

    pub fn string(&self, index: usize) -> Result<&'a str> {
        let bytes = self
            .strings
            .get(index)
            .ok_or_else(|| {
                Error::DataError(format!(
                    "string index {index} outside table of {}",
                    self.strings.len()
                ))
            })?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::DataError(format!("string {index} is not UTF-8: {e}")))
    }

    /// Degrees from raw coordinates: `1e-9 * (offset + granularity * value)`.
    ///
    /// A result beyond what a 32-bit 1e-7 degree coordinate can hold is a
    /// `DataError`, as is any overflow on the way there.
    pub fn coord(&self, raw_lat: i64, raw_lon: i64) -> Result<(f64, f64)> {
        Ok((
            self.scale(self.lat_offset, raw_lat)?,
            self.scale(self.lon_offset, raw_lon)?,
        ))
    }

    fn scale(&self, offset: i64, value: i64) -> Result<f64> {
        let nano = self
            .granularity
            .checked_mul(value)
            .and_then(|v| v.checked_add(offset))
            .filter(|v| v.unsigned_abs() <= MAX_NANODEGREES)
            .ok_or_else(|| {
                Error::DataError(format!(
                    "coordinate {value} at granularity {} and offset {offset} is out of bounds",
                    self.granularity
                ))
            })?;
        Ok(1e-9 * nano as f64)
    }

    fn tags(&self, keys: &[u32], vals: &[u32]) -> Result<Tags<'a>> {
        if keys.len() != vals.len() {
            return Err(Error::DataError(format!(
                "{} tag keys but {} values",
                keys.len(),
                vals.len()
            )));
        }
        keys.iter()
            .zip(vals)
            .map(|(&k, &v)| Ok((self.string(k as usize)?, self.string(v as usize)?)))
            .collect()
    }

    /// Plain and dense nodes of a group.
    pub fn nodes(&self, group: &PrimitiveGroup) -> Result<Vec<DecodedNode<'a>>> {
        let mut out = Vec::with_capacity(group.nodes.len() + group.dense.id.len());
        for node in &group.nodes {
            let (lat, lon) = self.coord(node.lat(), node.lon())?;
            out.push(DecodedNode {
                id: node.id(),
                lat,
                lon,
                tags: self.tags(&node.keys, &node.vals)?,
            });
        }
        if let Some(dense) = group.dense.as_ref() {
            self.dense(dense, &mut out)?;
        }
        Ok(out)
    }

    fn dense(&self, dense: &DenseNodes, out: &mut Vec<DecodedNode<'a>>) -> Result<()> {
        let n = dense.id.len();
        if dense.lat.len() != n || dense.lon.len() != n {
            return Err(Error::DataError(format!(
                "dense nodes with {} ids, {} lats and {} lons",
                n,
                dense.lat.len(),
                dense.lon.len()
            )));
        }

        // keys_vals: per node, (key, value) pairs terminated by 0
        let mut kv = dense.keys_vals.iter().copied();
        let (mut id, mut lat, mut lon) =
            (DeltaDecoder::new(), DeltaDecoder::new(), DeltaDecoder::new());
        for i in 0..n {
            let (la, lo) = self.coord(lat.next(dense.lat[i]), lon.next(dense.lon[i]))?;
            let mut tags = Vec::new();
            while let Some(key) = kv.next() {
                if key == 0 {
                    break;
                }
                let value = kv
                    .next()
                    .ok_or_else(|| Error::DataError("dense node key without value".to_string()))?;
                tags.push((self.string(key as usize)?, self.string(value as usize)?));
            }
            out.push(DecodedNode {
                id: id.next(dense.id[i]),
                lat: la,
                lon: lo,
                tags,
            });
        }
        Ok(())
    }

    pub fn ways(&self, group: &PrimitiveGroup) -> Result<Vec<DecodedWay<'a>>> {
        group
            .ways
            .iter()
            .map(|way| {
                Ok(DecodedWay {
                    id: way.id(),
                    refs: delta::decode(&way.refs),
                    tags: self.tags(&way.keys, &way.vals)?,
                })
            })
            .collect()
    }

    pub fn relations(&self, group: &PrimitiveGroup) -> Result<Vec<DecodedRelation<'a>>> {
        let mut out = Vec::with_capacity(group.relations.len());
        for rel in &group.relations {
            let n = rel.memids.len();
            if rel.roles_sid.len() != n || rel.types.len() != n {
                return Err(Error::DataError(format!(
                    "relation {} with {} member ids, {} roles and {} types",
                    rel.id(),
                    n,
                    rel.roles_sid.len(),
                    rel.types.len()
                )));
            }
            let ids = delta::decode(&rel.memids);
            let mut members = Vec::with_capacity(n);
            for ((id, role), kind) in ids.into_iter().zip(&rel.roles_sid).zip(&rel.types) {
                let kind = match kind.enum_value() {
                    Ok(MemberType::NODE) => MemberKind::Node,
                    Ok(MemberType::WAY) => MemberKind::Way,
                    Ok(MemberType::RELATION) => MemberKind::Relation,
                    Err(code) => {
                        return Err(Error::DataError(format!(
                            "relation {} has member of unknown type {code}",
                            rel.id()
                        )))
                    }
                };
                let role = usize::try_from(*role).map_err(|_| {
                    Error::DataError(format!("relation {} has negative role index", rel.id()))
                })?;
                members.push(DecodedMember {
                    kind,
                    id,
                    role: self.string(role)?,
                });
            }
            out.push(DecodedRelation {
                id: rel.id(),
                members,
                tags: self.tags(&rel.keys, &rel.vals)?,
            });
        }
        Ok(out)
    }
}
