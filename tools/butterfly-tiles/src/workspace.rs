//! Per-LOD working copy of a drained Entity Model.
//!
//! Generalization rewrites ways and relations, so every LOD starts from a
//! fresh copy of them. Nodes are shared: new vertices (border crossings,
//! merged rings) go into an overlay appended after the drained arena.

use butterfly_common::{Error, Result};
use butterfly_extract::model::{Member, MemberKind, Node, NodeLookup, Relation, Role, Single, Way};
use butterfly_extract::{EntityStore, SemanticType, INTERSECTION_ID};
use butterfly_geometry::kernel::polygon_area;
use butterfly_geometry::{Vec2, Vertex};
use butterfly_io::record::MAX_DEPTH;
use butterfly_io::{Coord, MemberRecord, RelationRecord, WayRecord};

/// The drained node arena plus nodes created while generalizing.
pub struct NodeOverlay<'a> {
    base: &'a [Node],
    extra: Vec<Node>,
}

impl<'a> NodeOverlay<'a> {
    pub fn new(base: &'a [Node]) -> Self {
        Self { base, extra: Vec::new() }
    }

    pub fn push(&mut self, node: Node) -> usize {
        self.extra.push(node);
        self.base.len() + self.extra.len() - 1
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeLookup for NodeOverlay<'_> {
    fn node(&self, index: usize) -> &Node {
        match index.checked_sub(self.base.len()) {
            Some(i) => &self.extra[i],
            None => &self.base[index],
        }
    }
}

pub struct Workspace<'a> {
    pub nodes: NodeOverlay<'a>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    pub singles: &'a [Single],
    simplified: Vec<bool>,
}

impl<'a> Workspace<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self {
            nodes: NodeOverlay::new(&store.nodes),
            ways: store.ways.clone(),
            relations: store.relations.clone(),
            singles: &store.singles,
            simplified: vec![false; store.ways.len()],
        }
    }

    pub fn way_nodes(&self, way: usize) -> Vec<Node> {
        self.ways[way]
            .refs
            .iter()
            .map(|&i| *self.nodes.node(i))
            .collect()
    }

    /// Replace the geometry of `way` with copies of `vertices`.
    pub fn set_geometry(&mut self, way: usize, vertices: &[Node]) {
        let refs = vertices.iter().map(|&n| self.nodes.push(n)).collect();
        self.ways[way].refs = refs;
    }

    /// Add a way cut or merged from others.
    pub fn add_way(&mut self, kind: SemanticType, vertices: &[Node]) -> usize {
        let refs = vertices.iter().map(|&n| self.nodes.push(n)).collect();
        let mut way = Way::new(INTERSECTION_ID, kind, refs);
        way.member_only = true;
        self.ways.push(way);
        self.simplified.push(true);
        self.ways.len() - 1
    }

    pub fn add_relation(&mut self, relation: Relation) -> usize {
        self.relations.push(relation);
        self.relations.len() - 1
    }

    pub fn remove_duplicates(&mut self, way: usize) {
        let Self { nodes, ways, .. } = self;
        ways[way].remove_duplicates(nodes);
    }

    /// Marks `way` simplified, returning false if it already was.
    pub fn mark_simplified(&mut self, way: usize) -> bool {
        !std::mem::replace(&mut self.simplified[way], true)
    }

    /// First vertex of a member, descending into nested relations.
    pub fn member_anchor(&self, member: &Member) -> Result<Option<Vec2>> {
        let mut member = *member;
        let mut parent = None;
        for _ in 0..MAX_DEPTH {
            match member.kind {
                MemberKind::Node => return Ok(Some(self.nodes.node(member.index).pos())),
                MemberKind::Way => {
                    return Ok(self.ways[member.index]
                        .refs
                        .first()
                        .map(|&i| self.nodes.node(i).pos()))
                }
                MemberKind::Relation => {
                    let rel = &self.relations[member.index];
                    parent = Some(rel.id);
                    match rel.members.first() {
                        Some(first) => member = *first,
                        None => return Ok(None),
                    }
                }
            }
        }
        Err(too_deep(parent.unwrap_or_default()))
    }

    /// First vertex of a relation.
    pub fn relation_anchor(&self, relation: usize) -> Result<Option<Vec2>> {
        match self.relations[relation].members.first() {
            Some(first) => self.member_anchor(first),
            None => Ok(None),
        }
    }

    /// Outer ring area minus inner ring area, over every nesting level.
    pub fn relation_area(&self, relation: usize) -> Result<f64> {
        let mut area = 0.0;
        let mut stack = vec![(relation, 1.0, 0)];
        while let Some((r, sign, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(too_deep(self.relations[relation].id));
            }
            for member in &self.relations[r].members {
                let sign = if member.role == Role::Inner { -sign } else { sign };
                match member.kind {
                    MemberKind::Way => {
                        let way = &self.ways[member.index];
                        if way.is_closed(&self.nodes) {
                            area += sign * polygon_area(&way.points(&self.nodes));
                        }
                    }
                    MemberKind::Relation => stack.push((member.index, sign, depth + 1)),
                    MemberKind::Node => {}
                }
            }
        }
        Ok(area)
    }

    /// Indices of every way reachable from `relation`.
    pub fn member_ways(&self, relation: usize) -> Result<Vec<usize>> {
        let mut ways = Vec::new();
        let mut stack = vec![(relation, 0)];
        while let Some((r, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(too_deep(self.relations[relation].id));
            }
            for member in &self.relations[r].members {
                match member.kind {
                    MemberKind::Way => ways.push(member.index),
                    MemberKind::Relation => stack.push((member.index, depth + 1)),
                    MemberKind::Node => {}
                }
            }
        }
        ways.sort_unstable();
        ways.dedup();
        Ok(ways)
    }

    pub fn way_record(&self, way: usize) -> WayRecord {
        let way = &self.ways[way];
        WayRecord {
            kind: way.kind.code(),
            points: way
                .refs
                .iter()
                .map(|&i| {
                    let n = self.nodes.node(i);
                    Coord::new(n.lat, n.lon)
                })
                .collect(),
        }
    }

    pub fn single_record(&self, single: usize) -> WayRecord {
        let single = self.singles[single];
        point_record(single.kind, self.nodes.node(single.node))
    }

    pub fn relation_record(&self, relation: usize) -> Result<RelationRecord> {
        self.relation_record_at(relation, 0)
    }

    fn relation_record_at(&self, relation: usize, depth: usize) -> Result<RelationRecord> {
        if depth > MAX_DEPTH {
            return Err(too_deep(self.relations[relation].id));
        }
        let rel = &self.relations[relation];
        let members = rel
            .members
            .iter()
            .map(|m| {
                let role = m.role.code();
                Ok(match m.kind {
                    MemberKind::Node => MemberRecord::Way {
                        role,
                        way: point_record(SemanticType::Empty, self.nodes.node(m.index)),
                    },
                    MemberKind::Way => MemberRecord::Way {
                        role,
                        way: self.way_record(m.index),
                    },
                    MemberKind::Relation => MemberRecord::Relation {
                        role,
                        relation: self.relation_record_at(m.index, depth + 1)?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RelationRecord {
            kind: rel.kind.code(),
            members,
        })
    }
}

fn point_record(kind: SemanticType, node: &Node) -> WayRecord {
    WayRecord {
        kind: kind.code(),
        points: vec![Coord::new(node.lat, node.lon)],
    }
}

fn too_deep(id: i64) -> Error {
    Error::LogicError(format!("relation {id} is nested deeper than {MAX_DEPTH} levels"))
}
