//! Entity Model for one sub-pass: arenas plus id-to-index maps.

use std::collections::HashMap;

use crate::model::{
    MemberKind, MemberValue, MemberX, Node, Relation, RelationX, Single, Slot, Way, WayX,
};
use crate::pending::Lookup;

/// Arena storage of the entities ingested in the current sub-pass.
///
/// Nodes read from the file come first in the node arena; node copies
/// appended while promoting pending entities follow them and have no id
/// mapping.
#[derive(Debug, Default)]
pub struct EntityStore {
    pub nodes: Vec<Node>,
    pub singles: Vec<Single>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    node_ids: HashMap<i64, usize>,
    way_ids: HashMap<i64, usize>,
    relation_ids: HashMap<i64, usize>,
    resident_nodes: usize,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes read from the file, excluding promoted copies.
    pub fn node_count(&self) -> usize {
        self.resident_nodes
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn add_node(&mut self, node: Node) -> usize {
        debug_assert_eq!(self.nodes.len(), self.resident_nodes, "file node after promoted copies");
        let index = self.nodes.len();
        self.node_ids.insert(node.id, index);
        self.nodes.push(node);
        self.resident_nodes += 1;
        index
    }

    /// Append a node value without registering its id.
    pub fn add_node_copy(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_single(&mut self, single: Single) {
        self.singles.push(single);
    }

    pub fn add_way(&mut self, way: Way) -> usize {
        let index = self.ways.len();
        if !way.member_only {
            self.way_ids.insert(way.id, index);
        }
        self.ways.push(way);
        index
    }

    pub fn add_relation(&mut self, relation: Relation) -> usize {
        let index = self.relations.len();
        if !relation.member_only {
            self.relation_ids.insert(relation.id, index);
        }
        self.relations.push(relation);
        index
    }

    pub fn node_index(&self, id: i64) -> Option<usize> {
        self.node_ids.get(&id).copied()
    }

    pub fn way_index(&self, id: i64) -> Option<usize> {
        self.way_ids.get(&id).copied()
    }

    pub fn relation_index(&self, id: i64) -> Option<usize> {
        self.relation_ids.get(&id).copied()
    }

    /// Forget everything drained in this sub-pass.
    ///
    /// With `keep_nodes`, nodes read from the file stay resident for the
    /// next sub-pass and only promoted copies are dropped.
    pub fn clear(&mut self, keep_nodes: bool) {
        self.singles.clear();
        self.ways.clear();
        self.relations.clear();
        self.way_ids.clear();
        self.relation_ids.clear();
        if keep_nodes {
            self.nodes.truncate(self.resident_nodes);
        } else {
            self.nodes.clear();
            self.node_ids.clear();
            self.resident_nodes = 0;
        }
    }

    fn way_value(&self, way: &Way) -> WayX {
        WayX {
            id: way.id,
            kind: way.kind,
            nodes: way.refs.iter().map(|&i| Slot::Resolved(self.nodes[i])).collect(),
        }
    }
}

impl Lookup for EntityStore {
    fn node(&self, id: i64) -> Option<Node> {
        self.node_index(id).map(|i| self.nodes[i])
    }

    fn way(&self, id: i64) -> Option<WayX> {
        self.way_index(id).map(|i| self.way_value(&self.ways[i]))
    }

    /// Nested relation members stay unresolved; the caller fills them.
    fn relation(&self, id: i64) -> Option<RelationX> {
        let rel = &self.relations[self.relation_index(id)?];
        let members = rel
            .members
            .iter()
            .map(|m| MemberX {
                role: m.role,
                value: match m.kind {
                    MemberKind::Node => MemberValue::Node(Slot::Resolved(self.nodes[m.index])),
                    MemberKind::Way => {
                        MemberValue::Way(Slot::Resolved(self.way_value(&self.ways[m.index])))
                    }
                    MemberKind::Relation => {
                        MemberValue::Relation(Slot::Missing(self.relations[m.index].id))
                    }
                },
            })
            .collect();
        Some(RelationX {
            id: rel.id,
            kind: rel.kind,
            members,
        })
    }
}
