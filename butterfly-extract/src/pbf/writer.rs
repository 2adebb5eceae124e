//! Minimal PBF writer, used to synthesise inputs for tests and tools.

use std::collections::HashMap;
use std::io::Write;

use butterfly_common::Result;
use butterfly_geometry::BBox;
use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use protobuf::{EnumOrUnknown, Message, MessageField};

use super::{OSM_DATA, OSM_HEADER};
use crate::delta;
use crate::model::MemberKind;
use crate::proto::fileformat::{Blob, BlobHeader};
use crate::proto::osmformat::{
    relation::MemberType, DenseNodes, HeaderBBox, HeaderBlock, Node, PrimitiveBlock,
    PrimitiveGroup, Relation, StringTable, Way,
};

/// Coordinates are stored with the default granularity of 100 nanodegrees.
const GRANULARITY: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Vec<(String, String)>,
}

impl RawNode {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self { id, lat, lon, tags: Vec::new() }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawWay {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Vec<(String, String)>,
}

impl RawWay {
    pub fn new(id: i64, refs: &[i64]) -> Self {
        Self { id, refs: refs.to_vec(), tags: Vec::new() }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMember {
    pub kind: MemberKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRelation {
    pub id: i64,
    pub members: Vec<RawMember>,
    pub tags: Vec<(String, String)>,
}

impl RawRelation {
    pub fn new(id: i64) -> Self {
        Self { id, members: Vec::new(), tags: Vec::new() }
    }

    pub fn member(mut self, kind: MemberKind, id: i64, role: &str) -> Self {
        self.members.push(RawMember { kind, id, role: role.to_string() });
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }
}

/// Builds one `PrimitiveBlock`, one group per call.
pub struct BlockBuilder {
    strings: Vec<Vec<u8>>,
    index: HashMap<String, u32>,
    groups: Vec<PrimitiveGroup>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    pub fn new() -> Self {
        // string 0 is reserved as the dense-node tag delimiter
        Self {
            strings: vec![Vec::new()],
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.as_bytes().to_vec());
        self.index.insert(s.to_string(), i);
        i
    }

    fn tags(&mut self, tags: &[(String, String)]) -> (Vec<u32>, Vec<u32>) {
        tags.iter()
            .map(|(k, v)| (self.intern(k), self.intern(v)))
            .unzip()
    }

    /// Group of plain (non-dense) nodes.
    pub fn nodes(&mut self, nodes: &[RawNode]) -> &mut Self {
        let mut group = PrimitiveGroup::new();
        for raw in nodes {
            let (keys, vals) = self.tags(&raw.tags);
            let mut node = Node::new();
            node.set_id(raw.id);
            node.set_lat(to_raw(raw.lat));
            node.set_lon(to_raw(raw.lon));
            node.keys = keys;
            node.vals = vals;
            group.nodes.push(node);
        }
        self.groups.push(group);
        self
    }

    /// Group of delta-coded dense nodes.
    pub fn dense(&mut self, nodes: &[RawNode]) -> &mut Self {
        let mut dense = DenseNodes::new();
        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        let lats: Vec<i64> = nodes.iter().map(|n| to_raw(n.lat)).collect();
        let lons: Vec<i64> = nodes.iter().map(|n| to_raw(n.lon)).collect();
        dense.id = delta::encode(&ids);
        dense.lat = delta::encode(&lats);
        dense.lon = delta::encode(&lons);
        if nodes.iter().any(|n| !n.tags.is_empty()) {
            for raw in nodes {
                let (keys, vals) = self.tags(&raw.tags);
                for (k, v) in keys.into_iter().zip(vals) {
                    dense.keys_vals.push(k as i32);
                    dense.keys_vals.push(v as i32);
                }
                dense.keys_vals.push(0);
            }
        }
        let mut group = PrimitiveGroup::new();
        group.dense = MessageField::some(dense);
        self.groups.push(group);
        self
    }

    pub fn ways(&mut self, ways: &[RawWay]) -> &mut Self {
        let mut group = PrimitiveGroup::new();
        for raw in ways {
            let (keys, vals) = self.tags(&raw.tags);
            let mut way = Way::new();
            way.set_id(raw.id);
            way.keys = keys;
            way.vals = vals;
            way.refs = delta::encode(&raw.refs);
            group.ways.push(way);
        }
        self.groups.push(group);
        self
    }

    pub fn relations(&mut self, relations: &[RawRelation]) -> &mut Self {
        let mut group = PrimitiveGroup::new();
        for raw in relations {
            let (keys, vals) = self.tags(&raw.tags);
            let mut relation = Relation::new();
            relation.set_id(raw.id);
            relation.keys = keys;
            relation.vals = vals;
            let ids: Vec<i64> = raw.members.iter().map(|m| m.id).collect();
            relation.memids = delta::encode(&ids);
            for member in &raw.members {
                let role = self.intern(&member.role);
                relation.roles_sid.push(role as i32);
                relation.types.push(EnumOrUnknown::new(match member.kind {
                    MemberKind::Node => MemberType::NODE,
                    MemberKind::Way => MemberType::WAY,
                    MemberKind::Relation => MemberType::RELATION,
                }));
            }
            group.relations.push(relation);
        }
        self.groups.push(group);
        self
    }

    pub fn finish(&mut self) -> PrimitiveBlock {
        let mut table = StringTable::new();
        table.s = std::mem::replace(&mut self.strings, vec![Vec::new()]);
        self.index.clear();

        let mut block = PrimitiveBlock::new();
        block.stringtable = MessageField::some(table);
        block.primitivegroup = std::mem::take(&mut self.groups);
        block
    }
}

fn to_raw(deg: f64) -> i64 {
    (deg / GRANULARITY).round() as i64
}

/// Writes framed blocks to any sink.
pub struct PbfWriter<W: Write> {
    inner: W,
    compress: bool,
}

impl<W: Write> PbfWriter<W> {
    pub fn new(inner: W, compress: bool) -> Self {
        Self { inner, compress }
    }

    /// Write the `OSMHeader` block, with a bounding box in degrees if given.
    pub fn write_header(&mut self, bbox: Option<BBox>) -> Result<()> {
        let mut header = HeaderBlock::new();
        header.required_features.push("OsmSchema-V0.6".to_string());
        header.required_features.push("DenseNodes".to_string());
        header.set_writingprogram("butterfly-extract".to_string());
        if let Some(b) = bbox {
            let nano = |deg: f64| (deg * 1e9).round() as i64;
            let mut hb = HeaderBBox::new();
            hb.set_left(nano(b.min_lon));
            hb.set_right(nano(b.max_lon));
            hb.set_top(nano(b.max_lat));
            hb.set_bottom(nano(b.min_lat));
            header.bbox = MessageField::some(hb);
        }
        self.write_blob(OSM_HEADER, &header.write_to_bytes().map_err(proto_err)?)
    }

    pub fn write_block(&mut self, block: PrimitiveBlock) -> Result<()> {
        self.write_blob(OSM_DATA, &block.write_to_bytes().map_err(proto_err)?)
    }

    fn write_blob(&mut self, kind: &str, payload: &[u8]) -> Result<()> {
        let mut blob = Blob::new();
        blob.set_raw_size(payload.len() as i32);
        if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            blob.set_zlib_data(encoder.finish()?);
        } else {
            blob.set_raw(payload.to_vec());
        }
        let body = blob.write_to_bytes().map_err(proto_err)?;

        let mut header = BlobHeader::new();
        header.set_type(kind.to_string());
        header.set_datasize(body.len() as i32);
        let header = header.write_to_bytes().map_err(proto_err)?;

        self.inner.write_i32::<BigEndian>(header.len() as i32)?;
        self.inner.write_all(&header)?;
        self.inner.write_all(&body)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn proto_err(e: protobuf::Error) -> butterfly_common::Error {
    butterfly_common::Error::InvalidInput(format!("protobuf encoding: {e}"))
}
