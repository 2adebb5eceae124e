//! Generalization of one LOD.
//!
//! Every drawable way and relation is checked against the LOD's visibility
//! rules. Small areas are merged with a neighbour of the same type when
//! possible and dropped when they stay too small; what survives is
//! simplified and handed to the [`Placer`].

use butterfly_common::{LineSimplification, Result};
use butterfly_extract::model::{MemberKind, NodeLookup, Way};
use butterfly_extract::{INVALID_ID, MERGED_ID};
use butterfly_geometry::{douglas_peucker, try_merge, visvalingam_whyatt, vw_keep, Vec2, Vertex};
use log::{debug, warn};

use crate::assign::{Placement, Placer};
use crate::lod::{area_threshold, epsilon, is_lod_type, retention, MAX_LOD};
use crate::workspace::Workspace;

/// Following ways searched for a merge partner.
const WAY_MERGE_WINDOW: usize = 25;
/// Following members of the same relation searched for a merge partner.
const MEMBER_MERGE_WINDOW: usize = 5;

/// What one LOD's generalization did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SortStats {
    pub merged_ways: u64,
    pub merged_members: u64,
    pub dropped_ways: u64,
    pub dropped_relations: u64,
    pub simplified: u64,
}

pub struct Generalizer<'g> {
    lod: usize,
    line: LineSimplification,
    placer: Placer<'g>,
}

impl<'g> Generalizer<'g> {
    pub fn new(lod: usize, line: LineSimplification, placer: Placer<'g>) -> Self {
        Self { lod, line, placer }
    }

    fn finest(&self) -> bool {
        self.lod == MAX_LOD
    }

    /// Generalize and place everything in `ws`. Singles are placed only
    /// when `with_singles` is set.
    pub fn run(
        &self,
        ws: &mut Workspace<'_>,
        with_singles: bool,
    ) -> Result<(Vec<Placement>, SortStats)> {
        let mut out = Vec::with_capacity(ws.ways.len() + ws.relations.len());
        let mut stats = SortStats::default();
        if with_singles {
            for single in 0..ws.singles.len() {
                self.placer.place_single(ws, single, &mut out);
            }
        }
        self.sort_ways(ws, &mut out, &mut stats)?;
        self.sort_relations(ws, &mut out, &mut stats)?;
        debug!("LOD {}: {stats:?}", self.lod);
        Ok((out, stats))
    }

    fn sort_ways(
        &self,
        ws: &mut Workspace<'_>,
        out: &mut Vec<Placement>,
        stats: &mut SortStats,
    ) -> Result<()> {
        let threshold = area_threshold(self.lod);
        let count = ws.ways.len();
        for i in 0..count {
            let way = &ws.ways[i];
            if !drawable(way) || !is_lod_type(self.lod, way.kind) {
                continue;
            }
            if way.refs.is_empty() {
                warn!("Way {} has no vertices", way.id);
                continue;
            }
            if !self.finest()
                && small_area(way, ws, threshold)
                && self.merge_neighbours(ws, i, count)
            {
                stats.merged_ways += 1;
            }
            let way = &ws.ways[i];
            let keep = self.finest()
                || !way.is_area()
                || way.kind.is_house()
                || way.area(&ws.nodes) >= threshold;
            if !keep {
                stats.dropped_ways += 1;
                continue;
            }
            if self.simplify(ws, i) {
                stats.simplified += 1;
            }
            self.placer.place_way(ws, i, out)?;
        }
        Ok(())
    }

    fn sort_relations(
        &self,
        ws: &mut Workspace<'_>,
        out: &mut Vec<Placement>,
        stats: &mut SortStats,
    ) -> Result<()> {
        let threshold = area_threshold(self.lod);
        let count = ws.relations.len();
        for r in 0..count {
            let rel = &ws.relations[r];
            if rel.member_only || rel.id == MERGED_ID || !is_lod_type(self.lod, rel.kind) {
                continue;
            }
            if rel.members.is_empty() {
                warn!("Relation {} has no members", rel.id);
                continue;
            }
            let area_kind = rel.kind.is_area();
            if !self.finest() && area_kind && ws.relation_area(r)? < threshold {
                stats.merged_members += self.merge_members(ws, r);
            }
            let keep = self.finest() || !area_kind || ws.relation_area(r)? >= threshold;
            if !keep {
                stats.dropped_relations += 1;
                continue;
            }
            if !self.finest() {
                for way in ws.member_ways(r)? {
                    if self.simplify(ws, way) {
                        stats.simplified += 1;
                    }
                }
            }
            self.placer.place_relation(ws, r, out)?;
        }
        Ok(())
    }

    /// Splice way `i` with the first mergeable area among the following
    /// ways (below `limit`). The absorbed way is marked merged.
    fn merge_neighbours(&self, ws: &mut Workspace<'_>, i: usize, limit: usize) -> bool {
        let kind = ws.ways[i].kind;
        let end = (i + WAY_MERGE_WINDOW).min(limit.saturating_sub(1));
        let gap = area_threshold(self.lod) / 2.0;
        for j in i + 1..=end {
            let other = &ws.ways[j];
            if !drawable(other) || other.kind != kind || !other.is_area() {
                continue;
            }
            let Some(ring) = try_merge(&ws.way_nodes(i), &ws.way_nodes(j), gap) else {
                continue;
            };
            let before = ws.ways[i].refs.clone();
            ws.set_geometry(i, &ring);
            ws.remove_duplicates(i);
            if !ws.ways[i].satisfies_invariant(&ws.nodes) {
                debug!(
                    "Merging way {} into {} degenerates; kept apart",
                    ws.ways[j].id, ws.ways[i].id
                );
                ws.ways[i].refs = before;
                continue;
            }
            ws.ways[j].id = MERGED_ID;
            return true;
        }
        false
    }

    /// Merge closed member rings of relation `r` with a following member
    /// of the same role. Returns the number of merges.
    fn merge_members(&self, ws: &mut Workspace<'_>, r: usize) -> u64 {
        let gap = area_threshold(self.lod) / 2.0;
        let mut members = ws.relations[r].members.clone();
        let mut merged = 0;
        let mut k = 0;
        while k < members.len() {
            if members[k].kind == MemberKind::Way && ring(ws, members[k].index) {
                let end = (k + MEMBER_MERGE_WINDOW).min(members.len() - 1);
                for b in k + 1..=end {
                    let partner = members[b];
                    if partner.kind != MemberKind::Way
                        || partner.role != members[k].role
                        || !ring(ws, partner.index)
                    {
                        continue;
                    }
                    let first = ws.way_nodes(members[k].index);
                    let Some(merged_ring) = try_merge(&first, &ws.way_nodes(partner.index), gap)
                    else {
                        continue;
                    };
                    let kind = ws.ways[members[k].index].kind;
                    let way = ws.add_way(kind, &merged_ring);
                    ws.remove_duplicates(way);
                    if ring(ws, way) {
                        members[k].index = way;
                        members.remove(b);
                        merged += 1;
                        break;
                    }
                }
            }
            k += 1;
        }
        ws.relations[r].members = members;
        merged
    }

    /// Simplify `way` once per LOD. Returns whether it was changed.
    fn simplify(&self, ws: &mut Workspace<'_>, way: usize) -> bool {
        if self.finest() || ws.ways[way].refs.len() <= 4 || !ws.mark_simplified(way) {
            return false;
        }
        let closed = ws.ways[way].is_closed(&ws.nodes);
        let refs = ws.ways[way].refs.clone();
        let body = if closed { &refs[..refs.len() - 1] } else { &refs[..] };
        let points: Vec<Vec2> = body.iter().map(|&i| ws.nodes.node(i).pos()).collect();

        let kept = match self.line {
            LineSimplification::DouglasPeucker => douglas_peucker(&points, epsilon(self.lod)),
            LineSimplification::VisvalingamWhyatt => {
                visvalingam_whyatt(&points, vw_keep(points.len(), retention(self.lod)))
            }
        };
        if kept.len() == body.len() {
            return false;
        }
        let mut simplified: Vec<usize> = kept.into_iter().map(|k| body[k]).collect();
        if closed {
            simplified.push(body[0]);
        }
        ws.ways[way].refs = simplified;
        if !ws.ways[way].satisfies_invariant(&ws.nodes) {
            ws.ways[way].refs = refs;
            return false;
        }
        true
    }
}

/// Drawn on its own: not a relation member copy, not absorbed by a merge.
fn drawable(way: &Way) -> bool {
    !way.member_only && way.id != INVALID_ID && way.id != MERGED_ID
}

fn small_area(way: &Way, ws: &Workspace<'_>, threshold: f64) -> bool {
    way.is_area() && !way.kind.is_house() && way.area(&ws.nodes) < threshold
}

/// A closed ring of at least four vertices.
fn ring(ws: &Workspace<'_>, way: usize) -> bool {
    let way = &ws.ways[way];
    way.refs.len() >= 4 && way.is_closed(&ws.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::Item;
    use crate::grid::Grid;
    use butterfly_common::Sorting;
    use butterfly_extract::model::{Member, Node, Relation, Role};
    use butterfly_extract::{EntityStore, SemanticType};
    use butterfly_geometry::BBox;

    fn add_square(
        store: &mut EntityStore,
        id: i64,
        lat: f64,
        lon: f64,
        size: f64,
        kind: SemanticType,
    ) -> usize {
        let first = store.nodes.len();
        let corners = [(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)];
        for (k, &(dlat, dlon)) in corners.iter().enumerate() {
            store.add_node(Node::new(id * 10 + k as i64, lat + dlat, lon + dlon));
        }
        store.add_way(Way::new(id, kind, vec![first, first + 1, first + 2, first + 3, first]))
    }

    fn add_zigzag(store: &mut EntityStore, id: i64, kind: SemanticType) -> usize {
        let first = store.nodes.len();
        for k in 0..9 {
            let wiggle = if k % 2 == 0 { 0.0 } else { 0.000001 };
            store.add_node(Node::new(id * 100 + k, 1.0 + wiggle, 1.0 + k as f64 * 0.1));
        }
        store.add_way(Way::new(id, kind, (first..first + 9).collect()))
    }

    fn world() -> Grid {
        Grid::new(BBox::new(0.0, 4.0, 0.0, 4.0), 1).unwrap()
    }

    fn run(
        store: &EntityStore,
        lod: usize,
        line: LineSimplification,
    ) -> (Workspace<'_>, Vec<Placement>, SortStats) {
        let grid = world();
        let mut ws = Workspace::new(store);
        let (out, stats) = Generalizer::new(lod, line, Placer::new(&grid, Sorting::FirstNode))
            .run(&mut ws, true)
            .unwrap();
        (ws, out, stats)
    }

    #[test]
    fn invisible_types_are_not_placed() {
        let mut store = EntityStore::new();
        add_square(&mut store, 1, 1.0, 1.0, 0.5, SemanticType::Apartments);
        add_zigzag(&mut store, 2, SemanticType::Path);
        let (_, out, _) = run(&store, 0, LineSimplification::DouglasPeucker);
        assert!(out.is_empty());
        let (_, out, _) = run(&store, MAX_LOD, LineSimplification::DouglasPeucker);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn small_areas_merge_with_a_close_neighbour() {
        let mut store = EntityStore::new();
        add_square(&mut store, 1, 1.0, 1.0, 0.1, SemanticType::Forest);
        add_square(&mut store, 2, 1.0, 1.12, 0.1, SemanticType::Forest);
        // LOD 12 threshold 0.4: both squares are far smaller
        let (ws, _, stats) = run(&store, 12, LineSimplification::DouglasPeucker);
        assert_eq!(stats.merged_ways, 1);
        assert_eq!(ws.ways[1].id, MERGED_ID);
        assert!(ws.ways[0].satisfies_invariant(&ws.nodes));
        assert!(ws.ways[0].area(&ws.nodes) > 0.02 - 1e-9);
    }

    #[test]
    fn small_areas_without_partner_are_dropped_below_the_finest_lod() {
        let mut store = EntityStore::new();
        add_square(&mut store, 1, 1.0, 1.0, 0.1, SemanticType::Forest);
        add_square(&mut store, 2, 3.0, 3.0, 0.1, SemanticType::Water);
        add_square(&mut store, 3, 2.0, 2.0, 0.1, SemanticType::Detached);
        let (_, out, stats) = run(&store, 13, LineSimplification::DouglasPeucker);
        assert_eq!(stats.dropped_ways, 2);
        assert_eq!(out, vec![Placement { tile: 0, item: Item::Way(2) }]);

        let (_, out, stats) = run(&store, MAX_LOD, LineSimplification::DouglasPeucker);
        assert_eq!(stats.dropped_ways, 0);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn lines_are_simplified_except_at_the_finest_lod() {
        let mut store = EntityStore::new();
        add_zigzag(&mut store, 1, SemanticType::LargeRoad);
        let (ws, _, stats) = run(&store, 8, LineSimplification::DouglasPeucker);
        assert_eq!(stats.simplified, 1);
        assert_eq!(ws.ways[0].refs, vec![0, 8]);

        let (ws, _, _) = run(&store, 8, LineSimplification::VisvalingamWhyatt);
        // 65% of 9 vertices
        assert_eq!(ws.ways[0].refs.len(), 5);
        assert_eq!(ws.ways[0].refs.first(), Some(&0));
        assert_eq!(ws.ways[0].refs.last(), Some(&8));

        let (ws, _, stats) = run(&store, MAX_LOD, LineSimplification::DouglasPeucker);
        assert_eq!(stats.simplified, 0);
        assert_eq!(ws.ways[0].refs.len(), 9);
    }

    #[test]
    fn small_relations_merge_member_rings() {
        let mut store = EntityStore::new();
        let a = add_square(&mut store, 1, 1.0, 1.0, 0.1, SemanticType::Empty);
        let b = add_square(&mut store, 2, 1.0, 1.12, 0.1, SemanticType::Empty);
        let member = |index| Member { index, kind: MemberKind::Way, role: Role::Outer };
        store.add_relation(Relation::new(5, SemanticType::Forest, vec![member(a), member(b)]));

        let (ws, out, stats) = run(&store, 12, LineSimplification::DouglasPeucker);
        assert_eq!(stats.merged_members, 1);
        // merged and still too small at this LOD
        assert_eq!(stats.dropped_relations, 1);
        assert!(out.is_empty());
        assert_eq!(ws.relations[0].members.len(), 1);

        let (_, out, _) = run(&store, MAX_LOD, LineSimplification::DouglasPeucker);
        assert_eq!(out, vec![Placement { tile: 0, item: Item::Relation(0) }]);
    }

    #[test]
    fn singles_are_placed_only_on_request() {
        let mut store = EntityStore::new();
        let node = store.add_node(Node::new(1, 1.0, 1.0));
        store.add_single(butterfly_extract::Single { node, kind: SemanticType::Tree });
        let grid = world();
        let mut ws = Workspace::new(&store);
        let generalizer = Generalizer::new(
            MAX_LOD,
            LineSimplification::DouglasPeucker,
            Placer::new(&grid, Sorting::FirstNode),
        );
        let (out, _) = generalizer.run(&mut ws, false).unwrap();
        assert!(out.is_empty());
        let (out, _) = generalizer.run(&mut ws, true).unwrap();
        assert_eq!(out, vec![Placement { tile: 0, item: Item::Single(0) }]);
    }
}
