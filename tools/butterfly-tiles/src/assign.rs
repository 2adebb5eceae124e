//! Tile assignment for ways, relations and single-point objects.

use butterfly_common::{Result, Sorting};
use butterfly_extract::model::{Member, NodeLookup, Relation};
use butterfly_extract::INTERSECTION_ID;
use butterfly_geometry::{clip, Vec2, Vertex};
use log::debug;

use crate::grid::Grid;
use crate::workspace::Workspace;

/// Distinct tiles the most-nodes vote keeps track of per entity.
pub const MAX_VOTE_TILES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Way(usize),
    Relation(usize),
    /// Index into the drained singles.
    Single(usize),
}

/// An entity and the global index of the tile it is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub tile: u64,
    pub item: Item,
}

pub struct Placer<'g> {
    grid: &'g Grid,
    sorting: Sorting,
}

impl<'g> Placer<'g> {
    pub fn new(grid: &'g Grid, sorting: Sorting) -> Self {
        Self { grid, sorting }
    }

    pub fn place_single(&self, ws: &Workspace<'_>, single: usize, out: &mut Vec<Placement>) {
        let node = ws.nodes.node(ws.singles[single].node);
        if !node.in_range() {
            return;
        }
        out.push(Placement {
            tile: self.grid.index_of(node.pos()),
            item: Item::Single(single),
        });
    }

    pub fn place_way(
        &self,
        ws: &mut Workspace<'_>,
        way: usize,
        out: &mut Vec<Placement>,
    ) -> Result<()> {
        let Some(&first) = ws.ways[way].refs.first() else {
            debug!("Way {} has no vertices left", ws.ways[way].id);
            return Ok(());
        };
        let tile = match self.sorting {
            Sorting::FirstNode => self.grid.index_of(ws.nodes.node(first).pos()),
            Sorting::MostNodes => {
                let points: Vec<Vec2> = ws.ways[way].points(&ws.nodes);
                self.vote(ws.ways[way].id, points)
            }
            Sorting::Subdivide => return self.subdivide_way(ws, way, out),
        };
        out.push(Placement { tile, item: Item::Way(way) });
        Ok(())
    }

    pub fn place_relation(
        &self,
        ws: &mut Workspace<'_>,
        relation: usize,
        out: &mut Vec<Placement>,
    ) -> Result<()> {
        let tile = match self.sorting {
            Sorting::FirstNode => ws.relation_anchor(relation)?.map(|p| self.grid.index_of(p)),
            Sorting::MostNodes => {
                let mut anchors = Vec::with_capacity(ws.relations[relation].members.len());
                for member in &ws.relations[relation].members {
                    if let Some(p) = ws.member_anchor(member)? {
                        anchors.push(p);
                    }
                }
                (!anchors.is_empty()).then(|| self.vote(ws.relations[relation].id, anchors))
            }
            Sorting::Subdivide => return self.subdivide_relation(ws, relation, out),
        };
        match tile {
            Some(tile) => out.push(Placement {
                tile,
                item: Item::Relation(relation),
            }),
            None => debug!("Relation {} has no located member", ws.relations[relation].id),
        }
        Ok(())
    }

    /// Tile holding most of `points`; ties go to the tile seen first.
    fn vote(&self, id: i64, points: impl IntoIterator<Item = Vec2>) -> u64 {
        let mut votes: Vec<(u64, usize)> = Vec::with_capacity(MAX_VOTE_TILES);
        let mut ignored = 0usize;
        for p in points {
            let tile = self.grid.index_of(p);
            match votes.iter().position(|&(t, _)| t == tile) {
                Some(i) => votes[i].1 += 1,
                None if votes.len() < MAX_VOTE_TILES => votes.push((tile, 1)),
                None => ignored += 1,
            }
        }
        if ignored > 0 {
            debug!(
                "Entity {id} touches more than {MAX_VOTE_TILES} tiles; {ignored} vertices not counted"
            );
        }
        let mut best = votes.first().copied().unwrap_or_default();
        for &(tile, count) in &votes[1.min(votes.len())..] {
            if count > best.1 {
                best = (tile, count);
            }
        }
        best.0
    }

    /// Cut the way at the border of its first vertex's tile until every
    /// piece lies in one tile.
    fn subdivide_way(
        &self,
        ws: &mut Workspace<'_>,
        way: usize,
        out: &mut Vec<Placement>,
    ) -> Result<()> {
        let closed = ws.ways[way].is_area();
        let kind = ws.ways[way].kind;
        let mut work = vec![way];
        while let Some(w) = work.pop() {
            let vertices = ws.way_nodes(w);
            // border vertices sit on two tiles; the first original vertex decides
            let Some(anchor) = vertices
                .iter()
                .find(|v| !v.is_synthetic())
                .or(vertices.first())
            else {
                continue;
            };
            let tile = self.grid.index_of(anchor.pos());
            let bbox = self.grid.tile_bbox(tile);
            if vertices.iter().all(|v| v.is_synthetic()) {
                out.push(Placement { tile, item: Item::Way(w) });
                continue;
            }

            let clipped = clip(&vertices, &bbox, closed)?;
            if clipped.fragments.is_empty() {
                out.push(Placement { tile, item: Item::Way(w) });
                continue;
            }
            if clipped.inside.is_empty() && clipped.fragments.len() == 1 {
                // nothing valid inside; place the whole piece rather than loop
                out.push(Placement { tile, item: Item::Way(w) });
                continue;
            }
            if clipped.inside.is_empty() {
                ws.ways[w].refs.clear();
            } else {
                ws.set_geometry(w, &clipped.inside);
                out.push(Placement { tile, item: Item::Way(w) });
            }
            for fragment in &clipped.fragments {
                work.push(ws.add_way(kind, fragment));
            }
        }
        Ok(())
    }

    /// Move members located outside the first member's tile into a new
    /// relation of the same type, placed the same way.
    fn subdivide_relation(
        &self,
        ws: &mut Workspace<'_>,
        relation: usize,
        out: &mut Vec<Placement>,
    ) -> Result<()> {
        let mut work = vec![relation];
        while let Some(r) = work.pop() {
            let Some(anchor) = ws.relation_anchor(r)? else {
                debug!("Relation {} has no located member", ws.relations[r].id);
                continue;
            };
            let tile = self.grid.index_of(anchor);

            let members = std::mem::take(&mut ws.relations[r].members);
            let mut kept: Vec<Member> = Vec::with_capacity(members.len());
            let mut moved: Vec<Member> = Vec::new();
            for (i, member) in members.into_iter().enumerate() {
                let here = match ws.member_anchor(&member)? {
                    Some(p) => self.grid.index_of(p) == tile,
                    None => true,
                };
                if here || i == 0 {
                    kept.push(member);
                } else {
                    moved.push(member);
                }
            }
            ws.relations[r].members = kept;
            out.push(Placement {
                tile,
                item: Item::Relation(r),
            });

            if !moved.is_empty() {
                let rel = &ws.relations[r];
                let mut other = Relation::new(INTERSECTION_ID, rel.kind, moved);
                other.member_only = rel.member_only;
                work.push(ws.add_relation(other));
            }
        }
        Ok(())
    }
}
