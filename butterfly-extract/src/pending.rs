//! Reference Resolver: the pending pool of entities with unresolved
//! references, filled and promoted as their targets become available.

use std::collections::{HashMap, HashSet};

use butterfly_common::{Error, Result};
use log::{debug, warn};

use crate::decode::DecodedRelation;
use crate::model::{
    Member, MemberKind, MemberValue, MemberX, Node, NodeLookup, Relation, RelationX, Role,
    SemanticType, Slot, Way, WayX,
};
use crate::store::EntityStore;

/// Source of entity values by OSM id.
pub trait Lookup {
    fn node(&self, id: i64) -> Option<Node>;
    fn way(&self, id: i64) -> Option<WayX>;
    /// A relation whose own relation members may still be missing.
    fn relation(&self, id: i64) -> Option<RelationX>;
}

/// Entities collected by a targeted re-read of the input.
#[derive(Debug, Default)]
pub struct Found {
    pub nodes: HashMap<i64, Node>,
    pub ways: HashMap<i64, WayX>,
    pub relations: HashMap<i64, RelationX>,
}

impl Found {
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lookup for Found {
    fn node(&self, id: i64) -> Option<Node> {
        self.nodes.get(&id).copied()
    }

    fn way(&self, id: i64) -> Option<WayX> {
        self.ways.get(&id).cloned()
    }

    fn relation(&self, id: i64) -> Option<RelationX> {
        self.relations.get(&id).cloned()
    }
}

/// Ids still missing somewhere in the pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Wanted {
    pub nodes: HashSet<i64>,
    pub ways: HashSet<i64>,
    pub relations: HashSet<i64>,
}

impl Wanted {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}

/// Outcome of one promotion round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub ways: u64,
    pub relations: u64,
    /// Completed ways that failed geometry validation.
    pub corrupt: u64,
    /// Completed relations holding a member way that failed it.
    pub corrupt_relations: u64,
}

/// Remove repeated points, orient areas clockwise and check the point-count
/// invariant.
pub fn normalise_way<N: NodeLookup + ?Sized>(way: &mut Way, nodes: &N) -> bool {
    way.remove_duplicates(nodes);
    if way.is_area() {
        way.make_clockwise(nodes);
    }
    way.satisfies_invariant(nodes)
}

/// Pending way with every reference as a missing slot.
pub fn way_shell(id: i64, kind: SemanticType, refs: &[i64]) -> WayX {
    WayX {
        id,
        kind,
        nodes: refs.iter().map(|&r| Slot::Missing(r)).collect(),
    }
}

/// Pending relation with every member as a missing slot, `None` if a role
/// is not valid for the relation type.
pub fn relation_shell(rel: &DecodedRelation<'_>, kind: SemanticType) -> Option<RelationX> {
    let members = rel
        .members
        .iter()
        .map(|m| {
            let role = Role::for_relation(m.role, kind)?;
            let value = match m.kind {
                MemberKind::Node => MemberValue::Node(Slot::Missing(m.id)),
                MemberKind::Way => MemberValue::Way(Slot::Missing(m.id)),
                MemberKind::Relation => MemberValue::Relation(Slot::Missing(m.id)),
            };
            Some(MemberX { role, value })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(RelationX {
        id: rel.id,
        kind,
        members,
    })
}

fn fill_way<L: Lookup + ?Sized>(way: &mut WayX, lookup: &L) {
    for slot in &mut way.nodes {
        if let Slot::Missing(id) = *slot {
            if let Some(node) = lookup.node(id) {
                *slot = Slot::Resolved(node);
            }
        }
    }
}

/// Resolve every missing slot `lookup` can provide, at any depth.
///
/// Nested relations are visited through an explicit worklist carrying the
/// chain of enclosing relation ids; meeting one of them again is a cycle.
pub fn fill_relation<L: Lookup + ?Sized>(rel: &mut RelationX, lookup: &L) -> Result<()> {
    let root = rel.id;
    let mut work: Vec<(Vec<usize>, Vec<i64>)> = vec![(Vec::new(), vec![root])];

    while let Some((path, ancestors)) = work.pop() {
        let Some(current) = rel.at_path_mut(&path) else {
            continue;
        };
        for (i, member) in current.members.iter_mut().enumerate() {
            match &mut member.value {
                MemberValue::Node(slot) => {
                    if let Slot::Missing(id) = *slot {
                        if let Some(node) = lookup.node(id) {
                            *slot = Slot::Resolved(node);
                        }
                    }
                }
                MemberValue::Way(slot) => {
                    if let Slot::Missing(id) = *slot {
                        if let Some(way) = lookup.way(id) {
                            *slot = Slot::Resolved(way);
                        }
                    }
                    if let Slot::Resolved(way) = slot {
                        fill_way(way, lookup);
                    }
                }
                MemberValue::Relation(slot) => {
                    let id = match slot {
                        Slot::Missing(id) => *id,
                        Slot::Resolved(inner) => inner.id,
                    };
                    if ancestors.contains(&id) {
                        return Err(Error::DataError(format!(
                            "relation cycle: {} -> {id}",
                            ancestors
                                .iter()
                                .map(i64::to_string)
                                .collect::<Vec<_>>()
                                .join(" -> ")
                        )));
                    }
                    if slot.is_missing() {
                        if let Some(inner) = lookup.relation(id) {
                            *slot = Slot::Resolved(inner);
                        }
                    }
                    if !slot.is_missing() {
                        let mut inner_path = path.clone();
                        inner_path.push(i);
                        let mut chain = ancestors.clone();
                        chain.push(id);
                        work.push((inner_path, chain));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Bounded pool of pending ways and relations.
#[derive(Debug)]
pub struct PendingPool {
    ways: Vec<WayX>,
    relations: Vec<RelationX>,
    max_ways: usize,
    max_relations: usize,
    /// Entries refused because the pool was full.
    pub overflow: u64,
}

impl PendingPool {
    pub fn new(max_ways: usize, max_relations: usize) -> Self {
        Self {
            ways: Vec::new(),
            relations: Vec::new(),
            max_ways,
            max_relations,
            overflow: 0,
        }
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ways.is_empty() && self.relations.is_empty()
    }

    /// Queue a way; `false` if the pool is full and the way was dropped.
    pub fn push_way(&mut self, way: WayX) -> bool {
        if self.ways.len() >= self.max_ways {
            self.overflow += 1;
            debug!("Pending pool full, dropping way {}", way.id);
            return false;
        }
        self.ways.push(way);
        true
    }

    pub fn push_relation(&mut self, relation: RelationX) -> bool {
        if self.relations.len() >= self.max_relations {
            self.overflow += 1;
            debug!("Pending pool full, dropping relation {}", relation.id);
            return false;
        }
        self.relations.push(relation);
        true
    }

    pub fn fill<L: Lookup + ?Sized>(&mut self, lookup: &L) -> Result<()> {
        for way in &mut self.ways {
            fill_way(way, lookup);
        }
        for relation in &mut self.relations {
            fill_relation(relation, lookup)?;
        }
        Ok(())
    }

    /// Move every complete entry into `store`, keeping the rest queued.
    pub fn promote(&mut self, store: &mut EntityStore) -> Promotion {
        let mut outcome = Promotion::default();

        let (done, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.ways).into_iter().partition(WayX::is_complete);
        self.ways = waiting;
        for way in done {
            let id = way.id;
            let mut promoted = promote_way(way, store);
            if normalise_way(&mut promoted, &store.nodes) {
                store.add_way(promoted);
                outcome.ways += 1;
            } else {
                warn!("Way {id} is corrupt after resolution, skipping");
                outcome.corrupt += 1;
            }
        }

        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.relations)
            .into_iter()
            .partition(RelationX::is_complete);
        self.relations = waiting;
        for relation in done {
            if member_ways_are_sound(&relation) {
                promote_relation(relation, store, false);
                outcome.relations += 1;
            } else {
                warn!("Relation {} has a corrupt member way, skipping", relation.id);
                outcome.corrupt_relations += 1;
            }
        }
        outcome
    }

    /// Ids that would complete some pending entry.
    pub fn wanted(&self) -> Wanted {
        let mut wanted = Wanted::default();
        for way in &self.ways {
            wanted.nodes.extend(way.missing_nodes());
        }
        let mut stack: Vec<&RelationX> = self.relations.iter().collect();
        while let Some(rel) = stack.pop() {
            for member in &rel.members {
                match &member.value {
                    MemberValue::Node(Slot::Missing(id)) => {
                        wanted.nodes.insert(*id);
                    }
                    MemberValue::Node(Slot::Resolved(_)) => {}
                    MemberValue::Way(Slot::Missing(id)) => {
                        wanted.ways.insert(*id);
                    }
                    MemberValue::Way(Slot::Resolved(way)) => {
                        wanted.nodes.extend(way.missing_nodes())
                    }
                    MemberValue::Relation(Slot::Missing(id)) => {
                        wanted.relations.insert(*id);
                    }
                    MemberValue::Relation(Slot::Resolved(inner)) => stack.push(inner),
                }
            }
        }
        wanted
    }

    /// Discard everything still queued, returning (ways, relations) dropped.
    pub fn drop_incomplete(&mut self) -> (u64, u64) {
        let counts = (self.ways.len() as u64, self.relations.len() as u64);
        for way in &self.ways {
            debug!("Dropping incomplete way {}", way.id);
        }
        for relation in &self.relations {
            debug!("Dropping incomplete relation {}", relation.id);
        }
        self.ways.clear();
        self.relations.clear();
        counts
    }
}

fn promote_way(way: WayX, store: &mut EntityStore) -> Way {
    let refs = way
        .nodes
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Resolved(node) => Some(store.add_node_copy(node)),
            Slot::Missing(_) => None,
        })
        .collect();
    Way::new(way.id, way.kind, refs)
}

/// Every way reachable from `relation` passes geometry validation.
fn member_ways_are_sound(relation: &RelationX) -> bool {
    let mut stack = vec![relation];
    while let Some(rel) = stack.pop() {
        for member in &rel.members {
            match &member.value {
                MemberValue::Way(Slot::Resolved(way)) if !way_is_sound(way) => {
                    debug!("Member way {} of relation {} is corrupt", way.id, rel.id);
                    return false;
                }
                MemberValue::Relation(Slot::Resolved(inner)) => stack.push(inner),
                _ => {}
            }
        }
    }
    true
}

fn way_is_sound(way: &WayX) -> bool {
    let nodes: Vec<Node> = way
        .nodes
        .iter()
        .filter_map(|slot| match slot {
            Slot::Resolved(node) => Some(*node),
            Slot::Missing(_) => None,
        })
        .collect();
    let mut check = Way::new(way.id, way.kind, (0..nodes.len()).collect());
    normalise_way(&mut check, &nodes)
}

/// Append a complete relation and all its nested members to `store`.
/// Member ways must already have passed [`member_ways_are_sound`].
fn promote_relation(relation: RelationX, store: &mut EntityStore, member_only: bool) -> usize {
    let mut members = Vec::with_capacity(relation.members.len());
    for member in relation.members {
        let (index, kind) = match member.value {
            MemberValue::Node(Slot::Resolved(node)) => {
                (store.add_node_copy(node), MemberKind::Node)
            }
            MemberValue::Way(Slot::Resolved(way)) => {
                let mut way = promote_way(way, store);
                normalise_way(&mut way, &store.nodes);
                way.member_only = true;
                (store.add_way(way), MemberKind::Way)
            }
            MemberValue::Relation(Slot::Resolved(inner)) => {
                (promote_relation(inner, store, true), MemberKind::Relation)
            }
            // complete relations have no missing slots
            MemberValue::Node(Slot::Missing(_))
            | MemberValue::Way(Slot::Missing(_))
            | MemberValue::Relation(Slot::Missing(_)) => continue,
        };
        members.push(Member {
            index,
            kind,
            role: member.role,
        });
    }
    let mut promoted = Relation::new(relation.id, relation.kind, members);
    promoted.member_only = member_only;
    store.add_relation(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedMember;

    fn node(id: i64, lat: f64, lon: f64) -> Node {
        Node::new(id, lat, lon)
    }

    fn square(store: &mut EntityStore, first_id: i64) -> Vec<i64> {
        let ids: Vec<i64> = (first_id..first_id + 4).collect();
        for (&id, (lat, lon)) in ids.iter().zip([(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]) {
            store.add_node(node(id, lat, lon));
        }
        ids
    }

    fn multipolygon(id: i64, members: &[(MemberKind, i64, &'static str)]) -> RelationX {
        let decoded = DecodedRelation {
            id,
            members: members
                .iter()
                .map(|&(kind, id, role)| DecodedMember { kind, id, role })
                .collect(),
            tags: vec![],
        };
        relation_shell(&decoded, SemanticType::Forest).unwrap()
    }

    #[test]
    fn invalid_role_rejects_the_shell() {
        let decoded = DecodedRelation {
            id: 1,
            members: vec![DecodedMember { kind: MemberKind::Way, id: 2, role: "main_stream" }],
            tags: vec![],
        };
        assert!(relation_shell(&decoded, SemanticType::Forest).is_none());
        assert!(relation_shell(&decoded, SemanticType::Waterway).is_some());
    }

    #[test]
    fn pending_way_completes_and_is_promoted() {
        let mut store = EntityStore::new();
        let ids = square(&mut store, 1);
        let mut pool = PendingPool::new(10, 10);
        // counter-clockwise ring, closed on its first id
        let ring = [ids[0], ids[1], ids[2], ids[3], ids[0]];
        pool.push_way(way_shell(50, SemanticType::Water, &ring));

        assert_eq!(pool.wanted().nodes.len(), 4);
        pool.fill(&store).unwrap();
        assert!(pool.wanted().is_empty());

        let outcome = pool.promote(&mut store);
        assert_eq!(outcome, Promotion { ways: 1, ..Promotion::default() });
        assert!(pool.is_empty());
        let way = &store.ways[0];
        assert_eq!(way.refs.len(), 5);
        assert!(way.is_closed(&store.nodes));
        assert!(!butterfly_geometry::kernel::is_counter_clockwise(&way.points(&store.nodes)));
        assert_eq!(store.node_count(), 4);
        assert_eq!(store.nodes.len(), 9);
    }

    #[test]
    fn degenerate_completed_way_is_corrupt() {
        let mut store = EntityStore::new();
        store.add_node(node(1, 0.0, 0.0));
        store.add_node(node(2, 0.0, 0.0));
        let mut pool = PendingPool::new(10, 10);
        pool.push_way(way_shell(7, SemanticType::Path, &[1, 2]));
        pool.fill(&store).unwrap();
        assert_eq!(pool.promote(&mut store).corrupt, 1);
        assert!(store.ways.is_empty());
    }

    #[test]
    fn nested_relations_resolve_across_lookups() {
        let mut store = EntityStore::new();
        let ids = square(&mut store, 1);
        let mut pool = PendingPool::new(10, 10);
        pool.push_relation(multipolygon(
            100,
            &[(MemberKind::Way, 10, "outer"), (MemberKind::Relation, 101, "inner")],
        ));

        let mut found = Found::default();
        let triangle = [ids[0], ids[1], ids[2], ids[0]];
        found.ways.insert(10, way_shell(10, SemanticType::Empty, &triangle));
        found
            .relations
            .insert(101, multipolygon(101, &[(MemberKind::Node, ids[3], "outer")]));

        pool.fill(&found).unwrap();
        let wanted = pool.wanted();
        assert!(wanted.ways.is_empty() && wanted.relations.is_empty());
        assert_eq!(wanted.nodes.len(), 4);

        pool.fill(&store).unwrap();
        assert_eq!(pool.promote(&mut store).relations, 1);

        // nested relation first, then the outer one
        assert_eq!(store.relations.len(), 2);
        assert!(store.relations[0].member_only);
        assert!(!store.relations[1].member_only);
        assert_eq!(store.relation_index(100), Some(1));
        assert!(store.relation_index(101).is_none());
        assert!(store.ways[0].member_only);
        assert!(store.way_index(10).is_none());
    }

    #[test]
    fn relation_with_a_degenerate_member_way_is_corrupt() {
        let mut store = EntityStore::new();
        store.add_node(node(1, 0.0, 0.0));
        let mut pool = PendingPool::new(10, 10);
        pool.push_relation(multipolygon(200, &[(MemberKind::Way, 100, "outer")]));
        let mut found = Found::default();
        found.ways.insert(100, way_shell(100, SemanticType::Empty, &[1, 1]));

        pool.fill(&found).unwrap();
        pool.fill(&store).unwrap();
        let outcome = pool.promote(&mut store);
        assert_eq!(outcome.relations, 0);
        assert_eq!(outcome.corrupt_relations, 1);
        assert!(pool.is_empty());
        assert!(store.relations.is_empty());
        assert!(store.ways.is_empty());
    }

    #[test]
    fn promoted_member_ways_keep_the_invariant() {
        let mut store = EntityStore::new();
        let ids = square(&mut store, 1);
        let mut pool = PendingPool::new(10, 10);
        pool.push_relation(multipolygon(200, &[(MemberKind::Way, 100, "outer")]));
        let mut found = Found::default();
        // repeated vertex, counter-clockwise
        let refs = [ids[0], ids[1], ids[1], ids[2], ids[3], ids[0]];
        found.ways.insert(100, way_shell(100, SemanticType::Water, &refs));

        pool.fill(&found).unwrap();
        pool.fill(&store).unwrap();
        assert_eq!(pool.promote(&mut store).relations, 1);
        let way = &store.ways[0];
        assert!(way.member_only);
        assert_eq!(way.refs.len(), 5);
        assert!(way.satisfies_invariant(&store.nodes));
        assert!(!butterfly_geometry::kernel::is_counter_clockwise(&way.points(&store.nodes)));
    }

    #[test]
    fn relation_cycles_are_data_errors() {
        let mut pool = PendingPool::new(10, 10);
        pool.push_relation(multipolygon(1, &[(MemberKind::Relation, 2, "outer")]));
        let mut found = Found::default();
        found.relations.insert(2, multipolygon(2, &[(MemberKind::Relation, 1, "outer")]));
        assert!(pool.fill(&found).unwrap_err().is_data_error());

        let mut pool = PendingPool::new(10, 10);
        pool.push_relation(multipolygon(3, &[(MemberKind::Relation, 3, "inner")]));
        assert!(pool.fill(&Found::default()).unwrap_err().is_data_error());
    }

    #[test]
    fn full_pool_drops_entries() {
        let mut pool = PendingPool::new(1, 0);
        assert!(pool.push_way(way_shell(1, SemanticType::Path, &[1, 2])));
        assert!(!pool.push_way(way_shell(2, SemanticType::Path, &[1, 2])));
        assert!(!pool.push_relation(multipolygon(3, &[])));
        assert_eq!(pool.overflow, 2);
        assert_eq!(pool.drop_incomplete(), (1, 0));
    }
}
