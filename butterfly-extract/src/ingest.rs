//! Stream Ingestion Controller.
//!
//! Reads the input in bounded sub-passes. Each entity kind (nodes, ways,
//! relations) is read until its cap would be exceeded; the kind and every
//! later kind are then suspended at the current block, the buffered
//! entities are drained to the sink, and the stream is rewound to the
//! earliest suspended position. Once the stream is exhausted, targeted
//! passes re-read it to complete entities left in the pending pool.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use butterfly_common::{ConvertConfig, Error, Limits, Result};
use butterfly_geometry::BBox;
use log::{debug, error, info, warn};

use crate::classify::{classify, classify_relation, classify_single};
use crate::decode::{
    group_kind, BlockContext, BlockCounts, DecodedNode, DecodedRelation, DecodedWay, EntityKind,
};
use crate::model::{Member, MemberKind, Node, Relation, SemanticType, Single, Slot, Way, WayX};
use crate::pbf::{Block, BlockReader};
use crate::pending::{
    fill_relation, normalise_way, relation_shell, way_shell, Found, PendingPool, Wanted,
};
use crate::proto::osmformat::{HeaderBlock, PrimitiveBlock};
use crate::store::EntityStore;

/// Receives the Entity Model each time a sub-pass is drained.
pub trait Drain {
    fn drain(&mut self, world: &BBox, store: &EntityStore) -> Result<()>;
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    pub singles: u64,
    pub out_of_range: u64,
    pub skipped_ways: u64,
    pub skipped_relations: u64,
    pub corrupt_ways: u64,
    pub corrupt_relations: u64,
    pub pending_ways: u64,
    pub pending_relations: u64,
    pub promoted_ways: u64,
    pub promoted_relations: u64,
    pub dropped_ways: u64,
    pub dropped_relations: u64,
    pub skipped_blocks: u64,
    pub sub_passes: u64,
    pub reconcile_passes: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct KindState {
    finished: bool,
    suspended: bool,
    /// Blocks before this offset were consumed by an earlier sub-pass.
    resume: u64,
}

impl KindState {
    fn active(&self) -> bool {
        !self.finished && !self.suspended
    }

    fn reading(&self, pos: u64) -> bool {
        self.active() && pos >= self.resume
    }
}

pub struct Ingestor<R> {
    reader: BlockReader<R>,
    limits: Limits,
    reconcile_passes: usize,
    kinds: [KindState; 3],
    world: Option<BBox>,
    header_at: Option<u64>,
    /// Furthest offset read so far, to count skipped blocks once.
    furthest: u64,
    store: EntityStore,
    pool: PendingPool,
    stats: IngestStats,
}

impl Ingestor<File> {
    pub fn open(config: &ConvertConfig) -> Result<Self> {
        Ok(Self::with_reader(
            BlockReader::open(&config.input)?,
            config.limits,
            config.reconcile_passes,
        ))
    }

    pub fn open_path(path: &Path, limits: Limits, reconcile_passes: usize) -> Result<Self> {
        Ok(Self::with_reader(BlockReader::open(path)?, limits, reconcile_passes))
    }
}

impl<R: Read + Seek> Ingestor<R> {
    pub fn new(inner: R, limits: Limits, reconcile_passes: usize) -> Self {
        Self::with_reader(BlockReader::new(inner), limits, reconcile_passes)
    }

    fn with_reader(reader: BlockReader<R>, limits: Limits, reconcile_passes: usize) -> Self {
        Self {
            reader,
            limits,
            reconcile_passes,
            kinds: [KindState::default(); 3],
            world: None,
            header_at: None,
            furthest: 0,
            store: EntityStore::new(),
            pool: PendingPool::new(limits.max_pending_ways, limits.max_pending_relations),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// World bounding box from the header, once it has been read.
    pub fn world(&self) -> Option<BBox> {
        self.world
    }

    /// Ingest the whole input, draining every sub-pass into `sink`.
    pub fn run<D: Drain + ?Sized>(&mut self, sink: &mut D) -> Result<IngestStats> {
        loop {
            self.stats.sub_passes += 1;
            let start = self.rewind_point();
            debug!("Sub-pass {} starts at byte {start}", self.stats.sub_passes);
            self.reader.seek(start)?;
            self.sub_pass()?;
            self.drain(sink)?;

            if self.kinds.iter().all(|k| k.finished) {
                break;
            }
            for kind in &mut self.kinds {
                kind.suspended = false;
            }
        }

        self.store.clear(false);
        self.reconcile(sink)?;

        let (ways, relations) = self.pool.drop_incomplete();
        if ways + relations > 0 {
            warn!("Dropped {ways} ways and {relations} relations with unresolved references");
        }
        self.stats.dropped_ways += ways;
        self.stats.dropped_relations += relations;
        Ok(self.stats)
    }

    fn rewind_point(&self) -> u64 {
        self.kinds
            .iter()
            .filter(|k| !k.finished)
            .map(|k| k.resume)
            .min()
            .unwrap_or(0)
    }

    fn sub_pass(&mut self) -> Result<()> {
        loop {
            if !self.kinds.iter().any(KindState::active) {
                return Ok(());
            }
            let pos = self.reader.position()?;
            let Some(block) = self.reader.next_block()? else {
                for (kind, state) in EntityKind::ALL.iter().zip(&mut self.kinds) {
                    if state.active() {
                        debug!("{kind:?} reading finished at end of stream");
                        state.finished = true;
                    }
                }
                return Ok(());
            };
            let first_visit = pos >= self.furthest;
            self.furthest = self.furthest.max(pos + 1);

            match block {
                Block::Header(header) => self.header(pos, &header)?,
                Block::Data(block) => {
                    if self.world.is_none() {
                        return Err(Error::DataError(format!(
                            "data block at byte {pos} before the header block"
                        )));
                    }
                    self.data_block(pos, &block)?;
                }
                Block::Skipped => {
                    if first_visit {
                        self.stats.skipped_blocks += 1;
                    }
                }
            }
        }
    }

    fn header(&mut self, pos: u64, header: &HeaderBlock) -> Result<()> {
        if let Some(at) = self.header_at {
            if at != pos {
                warn!("Ignoring repeated header block at byte {pos}");
            }
            return Ok(());
        }
        self.header_at = Some(pos);

        for feature in &header.required_features {
            info!("Required feature: {feature}");
        }
        for feature in &header.optional_features {
            info!("Optional feature: {feature}");
        }
        if let Some(program) = header.writingprogram.as_deref() {
            info!("Written by {program}");
        }
        if let Some(source) = header.source.as_deref() {
            info!("Source: {source}");
        }

        let world = match header.bbox.as_ref() {
            Some(b) => {
                let deg = |nano: i64| nano as f64 * 1e-9;
                let bbox = BBox::new(deg(b.bottom()), deg(b.top()), deg(b.left()), deg(b.right()));
                if !(bbox.min_lat < bbox.max_lat && bbox.min_lon < bbox.max_lon) {
                    return Err(Error::DataError(format!("header bounding box is empty: {bbox:?}")));
                }
                bbox
            }
            None => BBox::WORLD,
        };
        info!(
            "World: lat {:.7}..{:.7}, lon {:.7}..{:.7}",
            world.min_lat, world.max_lat, world.min_lon, world.max_lon
        );
        self.world = Some(world);
        Ok(())
    }

    fn state(&self, kind: EntityKind) -> &KindState {
        &self.kinds[kind.index()]
    }

    fn cap(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Nodes => self.limits.max_nodes,
            EntityKind::Ways => self.limits.max_ways,
            EntityKind::Relations => self.limits.max_relations,
        }
    }

    fn held(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Nodes => self.store.node_count(),
            EntityKind::Ways => self.store.way_count(),
            EntityKind::Relations => self.store.relation_count(),
        }
    }

    /// Stop reading `kind` and every later kind until the next sub-pass,
    /// which resumes them at `pos`.
    fn suspend_from(&mut self, kind: EntityKind, pos: u64) {
        for later in &EntityKind::ALL[kind.index()..] {
            let state = &mut self.kinds[later.index()];
            if state.finished {
                continue;
            }
            state.suspended = true;
            state.resume = state.resume.max(pos);
        }
    }

    fn finish(&mut self, kind: EntityKind) {
        debug!("{kind:?} reading finished");
        self.kinds[kind.index()].finished = true;
    }

    fn data_block(&mut self, pos: u64, block: &PrimitiveBlock) -> Result<()> {
        let counts = BlockCounts::of(block);
        for kind in EntityKind::ALL {
            let n = counts.get(kind) as usize;
            if n == 0 || !self.state(kind).reading(pos) {
                continue;
            }
            let held = self.held(kind);
            if held + n > self.cap(kind) {
                if held == 0 {
                    warn!(
                        "Block at byte {pos} alone holds {n} {kind:?}, above the cap of {}",
                        self.cap(kind)
                    );
                } else {
                    info!("{kind:?} cap reached at byte {pos} with {held} held, suspending");
                    self.suspend_from(kind, pos);
                }
            }
        }

        let ctx = BlockContext::new(block);
        for group in &block.primitivegroup {
            let Some(kind) = group_kind(group) else {
                continue;
            };
            // sorted input: a later kind means the earlier one is complete
            if kind > EntityKind::Nodes && self.state(EntityKind::Nodes).reading(pos) {
                self.finish(EntityKind::Nodes);
            }
            if kind > EntityKind::Ways && self.state(EntityKind::Ways).reading(pos) {
                self.finish(EntityKind::Ways);
            }
            if !self.state(kind).reading(pos) {
                continue;
            }
            match kind {
                EntityKind::Nodes => {
                    for node in ctx.nodes(group)? {
                        self.add_node(node);
                    }
                }
                EntityKind::Ways => {
                    for way in ctx.ways(group)? {
                        self.add_way(way);
                    }
                }
                EntityKind::Relations => {
                    for relation in ctx.relations(group)? {
                        self.add_relation(relation)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_node(&mut self, decoded: DecodedNode<'_>) {
        self.stats.nodes += 1;
        let node = Node::new(decoded.id, decoded.lat, decoded.lon);
        let in_range = node.in_range();
        if !in_range {
            error!("Node {} out of range at ({}, {})", node.id, node.lat, node.lon);
            self.stats.out_of_range += 1;
        }
        let index = self.store.add_node(node);
        if in_range {
            if let Some(kind) = classify_single(decoded.tags.iter().copied()) {
                self.store.add_single(Single { node: index, kind });
                self.stats.singles += 1;
            }
        }
    }

    fn add_way(&mut self, decoded: DecodedWay<'_>) {
        self.stats.ways += 1;
        let kind = classify(decoded.tags.iter().copied());
        if kind == SemanticType::None {
            self.stats.skipped_ways += 1;
            return;
        }

        let resolved: Option<Vec<usize>> = decoded
            .refs
            .iter()
            .map(|&id| self.store.node_index(id))
            .collect();
        match resolved {
            Some(refs) => {
                let mut way = Way::new(decoded.id, kind, refs);
                if normalise_way(&mut way, &self.store.nodes) {
                    self.store.add_way(way);
                } else {
                    warn!("Way {} has an invalid point count, skipping", decoded.id);
                    self.stats.corrupt_ways += 1;
                }
            }
            // untyped ways only matter as relation members, fetched on demand
            None if kind == SemanticType::Empty => {
                debug!("Untyped way {} has unresolved nodes, not queued", decoded.id);
            }
            None => {
                let mut pending = way_shell(decoded.id, kind, &decoded.refs);
                self.resolve_nodes(&mut pending);
                if self.pool.push_way(pending) {
                    self.stats.pending_ways += 1;
                } else {
                    self.stats.dropped_ways += 1;
                }
            }
        }
    }

    fn resolve_nodes(&self, way: &mut WayX) {
        for slot in &mut way.nodes {
            if let Slot::Missing(id) = *slot {
                if let Some(i) = self.store.node_index(id) {
                    *slot = Slot::Resolved(self.store.nodes[i]);
                }
            }
        }
    }

    fn add_relation(&mut self, decoded: DecodedRelation<'_>) -> Result<()> {
        self.stats.relations += 1;
        let kind = classify_relation(decoded.tags.iter().copied());
        if kind == SemanticType::None {
            self.stats.skipped_relations += 1;
            return Ok(());
        }
        let shell = match relation_shell(&decoded, kind) {
            Some(shell) if !shell.members.is_empty() => shell,
            _ => {
                warn!("Relation {} has no members or an invalid role, skipping", decoded.id);
                self.stats.corrupt_relations += 1;
                return Ok(());
            }
        };

        let members: Option<Vec<Member>> = decoded
            .members
            .iter()
            .zip(&shell.members)
            .map(|(m, x)| {
                let index = match m.kind {
                    MemberKind::Node => self.store.node_index(m.id),
                    MemberKind::Way => self.store.way_index(m.id),
                    MemberKind::Relation => self.store.relation_index(m.id),
                }?;
                Some(Member {
                    index,
                    kind: m.kind,
                    role: x.role,
                })
            })
            .collect();

        match members {
            Some(members) => {
                self.store.add_relation(Relation::new(decoded.id, kind, members));
            }
            None => {
                let mut pending = shell;
                fill_relation(&mut pending, &self.store)?;
                if self.pool.push_relation(pending) {
                    self.stats.pending_relations += 1;
                } else {
                    self.stats.dropped_relations += 1;
                }
            }
        }
        Ok(())
    }

    /// Complete what the current store allows, then hand it to the sink.
    fn drain<D: Drain + ?Sized>(&mut self, sink: &mut D) -> Result<()> {
        self.pool.fill(&self.store)?;
        let promoted = self.pool.promote(&mut self.store);
        self.stats.promoted_ways += promoted.ways;
        self.stats.promoted_relations += promoted.relations;
        self.stats.corrupt_ways += promoted.corrupt;
        self.stats.corrupt_relations += promoted.corrupt_relations;

        let store = &self.store;
        if store.ways.is_empty() && store.relations.is_empty() && store.singles.is_empty() {
            debug!("Nothing to drain in sub-pass {}", self.stats.sub_passes);
        } else {
            info!(
                "Draining {} ways, {} relations and {} singles",
                store.ways.len(),
                store.relations.len(),
                store.singles.len()
            );
            sink.drain(&self.world.unwrap_or(BBox::WORLD), store)?;
        }

        let keep_nodes = self.state(EntityKind::Nodes).finished;
        self.store.clear(keep_nodes);
        Ok(())
    }

    /// Re-read the input for the ids still missing in the pending pool.
    fn reconcile<D: Drain + ?Sized>(&mut self, sink: &mut D) -> Result<()> {
        for pass in 1..=self.reconcile_passes {
            let wanted = self.pool.wanted();
            if wanted.is_empty() {
                break;
            }
            info!(
                "Reconcile pass {pass}: looking for {} nodes, {} ways and {} relations",
                wanted.nodes.len(),
                wanted.ways.len(),
                wanted.relations.len()
            );
            self.stats.reconcile_passes += 1;
            let found = self.collect(&wanted)?;
            if found.is_empty() {
                debug!("Reconcile pass {pass} found nothing");
                break;
            }
            self.pool.fill(&found)?;
            drop(found);

            let promoted = self.pool.promote(&mut self.store);
            self.stats.promoted_ways += promoted.ways;
            self.stats.promoted_relations += promoted.relations;
            self.stats.corrupt_ways += promoted.corrupt;
            self.stats.corrupt_relations += promoted.corrupt_relations;
            if promoted.ways + promoted.relations > 0 {
                sink.drain(&self.world.unwrap_or(BBox::WORLD), &self.store)?;
            }
            self.store.clear(false);
        }
        Ok(())
    }

    fn collect(&mut self, wanted: &Wanted) -> Result<Found> {
        let total = wanted.nodes.len() + wanted.ways.len() + wanted.relations.len();
        let mut found = Found::default();
        self.reader.rewind()?;

        while found.len() < total {
            let Some(block) = self.reader.next_block()? else {
                break;
            };
            let Block::Data(block) = block else {
                continue;
            };
            let ctx = BlockContext::new(&block);
            for group in &block.primitivegroup {
                match group_kind(group) {
                    Some(EntityKind::Nodes) if !wanted.nodes.is_empty() => {
                        for n in ctx.nodes(group)? {
                            if wanted.nodes.contains(&n.id) {
                                found.nodes.insert(n.id, Node::new(n.id, n.lat, n.lon));
                            }
                        }
                    }
                    Some(EntityKind::Ways) if !wanted.ways.is_empty() => {
                        for w in ctx.ways(group)? {
                            if wanted.ways.contains(&w.id) {
                                let kind = classify(w.tags.iter().copied());
                                found.ways.insert(w.id, way_shell(w.id, kind, &w.refs));
                            }
                        }
                    }
                    Some(EntityKind::Relations) if !wanted.relations.is_empty() => {
                        for r in ctx.relations(group)? {
                            if !wanted.relations.contains(&r.id) {
                                continue;
                            }
                            let kind = classify_relation(r.tags.iter().copied());
                            match relation_shell(&r, kind) {
                                Some(shell) => {
                                    found.relations.insert(r.id, shell);
                                }
                                None => debug!("Member relation {} has an invalid role", r.id),
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        debug!("Collected {} of {total} wanted entities", found.len());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbf::{BlockBuilder, PbfWriter, RawNode, RawRelation, RawWay};
    use std::io::Cursor;

    /// Records what every drain saw.
    #[derive(Default)]
    struct Recorder {
        drains: Vec<(Vec<i64>, Vec<i64>, usize)>,
    }

    impl Drain for Recorder {
        fn drain(&mut self, _world: &BBox, store: &EntityStore) -> Result<()> {
            self.drains.push((
                store.ways.iter().map(|w| w.id).collect(),
                store.relations.iter().map(|r| r.id).collect(),
                store.singles.len(),
            ));
            Ok(())
        }
    }

    fn square_nodes(first: i64) -> Vec<RawNode> {
        [(0.0, 0.0), (0.0, 0.01), (0.01, 0.01), (0.01, 0.0)]
            .iter()
            .enumerate()
            .map(|(i, &(lat, lon))| RawNode::new(first + i as i64, lat, lon))
            .collect()
    }

    fn ring(first: i64) -> Vec<i64> {
        vec![first, first + 1, first + 2, first + 3, first]
    }

    fn file(blocks: Vec<PrimitiveBlock>) -> Cursor<Vec<u8>> {
        let mut writer = PbfWriter::new(Vec::new(), true);
        writer.write_header(None).unwrap();
        for block in blocks {
            writer.write_block(block).unwrap();
        }
        Cursor::new(writer.into_inner())
    }

    fn run(input: Cursor<Vec<u8>>, limits: Limits) -> (Recorder, IngestStats) {
        let mut recorder = Recorder::default();
        let stats = Ingestor::new(input, limits, 4).run(&mut recorder).unwrap();
        (recorder, stats)
    }

    #[test]
    fn single_pass_reads_everything() {
        let mut nodes = square_nodes(1);
        nodes.push(RawNode::new(9, 0.005, 0.005).tag("natural", "tree"));
        let input = file(vec![
            BlockBuilder::new().dense(&nodes).finish(),
            BlockBuilder::new()
                .ways(&[
                    RawWay::new(100, &ring(1)).tag("landuse", "residential"),
                    RawWay::new(101, &[1, 2]).tag("highway", "residential"),
                    RawWay::new(102, &[1, 2])
                        .tag("admin_level", "9")
                        .tag("boundary", "administrative"),
                ])
                .finish(),
            BlockBuilder::new()
                .relations(&[RawRelation::new(200)
                    .tag("landuse", "forest")
                    .member(MemberKind::Way, 100, "outer")])
                .finish(),
        ]);
        let (recorder, stats) = run(input, Limits::default());

        assert_eq!(recorder.drains, vec![(vec![100, 101], vec![200], 1)]);
        assert_eq!(stats.nodes, 5);
        assert_eq!(stats.ways, 3);
        assert_eq!(stats.skipped_ways, 1);
        assert_eq!(stats.singles, 1);
        assert_eq!(stats.sub_passes, 1);
    }

    #[test]
    fn way_cap_splits_into_sub_passes() {
        let input = file(vec![
            BlockBuilder::new().dense(&square_nodes(1)).finish(),
            BlockBuilder::new().ways(&[RawWay::new(100, &[1, 2]).tag("highway", "path")]).finish(),
            BlockBuilder::new().ways(&[RawWay::new(101, &[2, 3]).tag("highway", "path")]).finish(),
            BlockBuilder::new().ways(&[RawWay::new(102, &[3, 4]).tag("highway", "path")]).finish(),
        ]);
        let limits = Limits { max_ways: 2, ..Limits::default() };
        let (recorder, stats) = run(input, limits);

        let drained: Vec<Vec<i64>> = recorder.drains.iter().map(|d| d.0.clone()).collect();
        assert_eq!(drained, vec![vec![100, 101], vec![102]]);
        assert_eq!(stats.ways, 3);
        assert_eq!(stats.sub_passes, 2);
        assert_eq!(stats.pending_ways, 0);
    }

    #[test]
    fn node_cap_leaves_ways_to_reconciliation() {
        let mut nodes = square_nodes(1);
        nodes.extend(square_nodes(11));
        let input = file(vec![
            BlockBuilder::new().dense(&nodes[..4]).finish(),
            BlockBuilder::new().dense(&nodes[4..]).finish(),
            BlockBuilder::new()
                .ways(&[
                    RawWay::new(100, &ring(1)).tag("building", "yes"),
                    RawWay::new(101, &ring(11)).tag("building", "yes"),
                ])
                .finish(),
        ]);
        let limits = Limits { max_nodes: 4, ..Limits::default() };
        let (recorder, stats) = run(input, limits);

        // sub-pass 1 holds nodes 1..4 only and reads no ways
        // sub-pass 2 holds nodes 11..14: way 101 resolves, way 100 waits
        // the targeted pass completes way 100
        let drained: Vec<Vec<i64>> = recorder.drains.iter().map(|d| d.0.clone()).collect();
        assert_eq!(drained, vec![vec![101], vec![100]]);
        assert_eq!(stats.nodes, 8);
        assert_eq!(stats.pending_ways, 1);
        assert_eq!(stats.promoted_ways, 1);
        assert_eq!(stats.dropped_ways, 0);
        assert_eq!(stats.reconcile_passes, 1);
    }

    #[test]
    fn unresolvable_references_are_dropped() {
        let input = file(vec![
            BlockBuilder::new().dense(&square_nodes(1)).finish(),
            BlockBuilder::new()
                .ways(&[RawWay::new(100, &[1, 2, 999]).tag("highway", "path")])
                .finish(),
            BlockBuilder::new()
                .relations(&[RawRelation::new(200)
                    .tag("natural", "water")
                    .member(MemberKind::Way, 555, "outer")])
                .finish(),
        ]);
        let (recorder, stats) = run(input, Limits::default());
        assert!(recorder.drains.is_empty());
        assert_eq!(stats.dropped_ways, 1);
        assert_eq!(stats.dropped_relations, 1);
    }

    #[test]
    fn invalid_roles_are_corrupt() {
        let input = file(vec![
            BlockBuilder::new().dense(&square_nodes(1)).finish(),
            BlockBuilder::new().ways(&[RawWay::new(100, &[1, 2])]).finish(),
            BlockBuilder::new()
                .relations(&[RawRelation::new(200)
                    .tag("landuse", "forest")
                    .member(MemberKind::Way, 100, "street")])
                .finish(),
        ]);
        let (_, stats) = run(input, Limits::default());
        assert_eq!(stats.corrupt_relations, 1);
    }

    #[test]
    fn corrupt_way_does_not_return_as_a_relation_member() {
        let input = file(vec![
            BlockBuilder::new().dense(&square_nodes(1)).finish(),
            BlockBuilder::new().ways(&[RawWay::new(100, &[1, 1])]).finish(),
            BlockBuilder::new()
                .relations(&[RawRelation::new(200)
                    .tag("landuse", "forest")
                    .member(MemberKind::Way, 100, "outer")])
                .finish(),
        ]);
        let (recorder, stats) = run(input, Limits::default());

        // the way is refused on read, queued by the relation and
        // re-read during reconciliation, where the relation is refused
        assert_eq!(stats.corrupt_ways, 1);
        assert_eq!(stats.pending_relations, 1);
        assert!(stats.reconcile_passes >= 1);
        assert_eq!(stats.promoted_relations, 0);
        assert_eq!(stats.corrupt_relations, 1);
        assert!(recorder.drains.iter().all(|(_, relations, _)| relations.is_empty()));
    }

    #[test]
    fn data_before_header_is_fatal() {
        let mut writer = PbfWriter::new(Vec::new(), false);
        writer.write_block(BlockBuilder::new().dense(&square_nodes(1)).finish()).unwrap();
        let mut ingestor = Ingestor::new(Cursor::new(writer.into_inner()), Limits::default(), 0);
        let err = ingestor.run(&mut Recorder::default()).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn header_bbox_sets_the_world() {
        let mut writer = PbfWriter::new(Vec::new(), false);
        writer.write_header(Some(BBox::new(50.0, 51.0, 4.0, 5.5))).unwrap();
        writer.write_block(BlockBuilder::new().dense(&square_nodes(1)).finish()).unwrap();
        let mut ingestor = Ingestor::new(Cursor::new(writer.into_inner()), Limits::default(), 0);
        ingestor.run(&mut Recorder::default()).unwrap();
        let world = ingestor.world().unwrap();
        assert!((world.min_lat - 50.0).abs() < 1e-9);
        assert!((world.max_lon - 5.5).abs() < 1e-9);
    }
}
