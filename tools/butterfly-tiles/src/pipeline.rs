//! Conversion pipeline.
//!
//! The [`Context`] receives every drained sub-pass of the ingestion and
//! runs generalization for each active LOD, finest first. Each LOD is
//! written band by band through the merging [`LodWriter`], so the output
//! of later sub-passes is appended to the tiles of earlier ones.

use std::sync::Arc;

use butterfly_common::{ConvertConfig, Result};
use butterfly_extract::{Drain, EntityStore, IngestStats, Ingestor};
use butterfly_geometry::BBox;
use butterfly_io::{prepare_output, LodWriter, Meta, TileRecords, WriteSummary, FORMAT_VERSION};
use log::{debug, info};

use crate::assign::{Item, Placement, Placer};
use crate::generalize::Generalizer;
use crate::grid::Grid;
use crate::workspace::Workspace;

/// Progress callback, called from the converting thread.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A sub-pass was drained with this many ways and relations.
    Drain { pass: u64, ways: usize, relations: usize },
    /// A LOD write starts, in `bands` row bands.
    LodStarted { lod: usize, bands: usize },
    BandWritten { lod: usize },
    LodFinished { lod: usize },
}

/// Records written to one LOD over the whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LodSummary {
    pub lod: usize,
    pub tiles: u64,
    pub ways: u64,
    pub relations: u64,
    /// Small areas dropped by generalization.
    pub dropped: u64,
    /// Areas absorbed into a neighbour.
    pub merged: u64,
}

/// Outcome of [`convert`].
#[derive(Debug, Clone)]
pub struct Report {
    pub ingest: IngestStats,
    /// Finest LOD first.
    pub lods: Vec<LodSummary>,
    pub meta: Meta,
}

pub struct Context<'c> {
    config: &'c ConvertConfig,
    /// Active LODs, finest first.
    lods: Vec<usize>,
    summaries: Vec<LodSummary>,
    written: Vec<bool>,
    drains: u64,
    progress: Option<ProgressCallback>,
}

impl<'c> Context<'c> {
    pub fn new(config: &'c ConvertConfig) -> Result<Self> {
        config.validate()?;
        let lods = config.active_lods();
        Ok(Self {
            config,
            summaries: lods.iter().map(|&lod| LodSummary { lod, ..Default::default() }).collect(),
            written: vec![false; lods.len()],
            lods,
            drains: 0,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn summaries(&self) -> &[LodSummary] {
        &self.summaries
    }

    fn report(&self, event: Progress) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Generalize `store` for the LOD at `slot` and append it to the LOD's files.
    fn write_lod(&mut self, slot: usize, world: &BBox, store: &EntityStore) -> Result<()> {
        let lod = self.lods[slot];
        let grid = Grid::new(*world, self.config.lods[lod])?;
        let mut ws = Workspace::new(store);
        let generalizer = Generalizer::new(
            lod,
            self.config.simplification,
            Placer::new(&grid, self.config.sorting),
        );
        // singles are drawn only on the finest active LOD
        let singles = self.config.finest_lod() == Some(lod);
        let (mut placements, stats) = generalizer.run(&mut ws, singles)?;
        placements.sort_by_key(|p| p.tile);

        let written = self.write_bands(lod, &grid, &ws, &placements)?;
        let summary = &mut self.summaries[slot];
        summary.tiles = grid.tile_count();
        summary.ways += written.ways;
        summary.relations += written.relations;
        summary.dropped += stats.dropped_ways + stats.dropped_relations;
        summary.merged += stats.merged_ways + stats.merged_members;
        self.written[slot] = true;
        Ok(())
    }

    /// Write `placements`, sorted by tile, one row band at a time.
    fn write_bands(
        &self,
        lod: usize,
        grid: &Grid,
        ws: &Workspace<'_>,
        placements: &[Placement],
    ) -> Result<WriteSummary> {
        let writer = LodWriter::new(&self.config.output, lod, self.config.debug_text);
        let bands = grid.bands(self.config.max_tiles_per_pass);
        self.report(Progress::LodStarted { lod, bands: bands.len() });
        if bands.len() > 1 {
            debug!("LOD {lod} is written in {} row bands", bands.len());
        }

        let mut total = WriteSummary::default();
        let mut rest = placements;
        for band in bands {
            let range = band.tiles(grid.side());
            let mut tiles: Vec<TileRecords> = range
                .clone()
                .map(|i| TileRecords::new(grid.tile_bbox(i)))
                .collect();
            let split = rest.partition_point(|p| p.tile < range.end);
            for placement in &rest[..split] {
                let tile = &mut tiles[(placement.tile - range.start) as usize];
                match placement.item {
                    Item::Single(s) => tile.ways.push(ws.single_record(s)),
                    Item::Way(w) => tile.ways.push(ws.way_record(w)),
                    Item::Relation(r) => tile.relations.push(ws.relation_record(r)?),
                }
            }
            rest = &rest[split..];

            let written = writer.write(grid.header(), range.start, &tiles)?;
            total.tiles += written.tiles;
            total.ways += written.ways;
            total.relations += written.relations;
            self.report(Progress::BandWritten { lod });
        }
        self.report(Progress::LodFinished { lod });
        Ok(total)
    }

    /// Write empty grids for LODs that never received a sub-pass, then the
    /// meta file.
    pub fn finish(&mut self, world: BBox) -> Result<Meta> {
        let empty = EntityStore::new();
        for slot in 0..self.lods.len() {
            if !self.written[slot] {
                info!("LOD {} received no entities; writing empty tiles", self.lods[slot]);
                self.write_lod(slot, &world, &empty)?;
            }
        }

        let finest = self.summaries.first().copied().unwrap_or_default();
        let mut lods: Vec<i16> = self.lods.iter().map(|&lod| lod as i16).collect();
        lods.sort_unstable();
        let meta = Meta {
            version: FORMAT_VERSION,
            bbox: world,
            way_count: finest.ways,
            relation_count: finest.relations,
            sorting: self.config.sorting,
            simplification: self.config.simplification,
            lods,
        };
        meta.write(&self.config.output, self.config.debug_text)?;
        info!(
            "Wrote meta: {} ways and {} relations at LOD {}",
            meta.way_count, meta.relation_count, finest.lod
        );
        Ok(meta)
    }
}

impl Drain for Context<'_> {
    fn drain(&mut self, world: &BBox, store: &EntityStore) -> Result<()> {
        self.drains += 1;
        info!(
            "Drain {}: {} nodes, {} ways, {} relations, {} singles",
            self.drains,
            store.nodes.len(),
            store.ways.len(),
            store.relations.len(),
            store.singles.len()
        );
        self.report(Progress::Drain {
            pass: self.drains,
            ways: store.ways.len(),
            relations: store.relations.len(),
        });
        for slot in 0..self.lods.len() {
            self.write_lod(slot, world, store)?;
        }
        Ok(())
    }
}

/// Run a whole conversion as described by `config`.
pub fn convert(config: &ConvertConfig, progress: Option<ProgressCallback>) -> Result<Report> {
    let mut context = Context::new(config)?;
    if let Some(progress) = progress {
        context = context.with_progress(progress);
    }
    prepare_output(&config.output)?;

    let mut ingestor = Ingestor::open(config)?;
    let ingest = ingestor.run(&mut context)?;
    let world = ingestor.world().unwrap_or(BBox::WORLD);
    let meta = context.finish(world)?;

    Ok(Report {
        ingest,
        lods: context.summaries().to_vec(),
        meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use butterfly_extract::model::{Node, Way};
    use butterfly_extract::SemanticType;
    use butterfly_io::TileDb;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn config(dir: &TempDir, lods: &[(usize, u64)]) -> ConvertConfig {
        let mut config = ConvertConfig {
            output: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.lods = [0; 16];
        for &(lod, side) in lods {
            config.lods[lod] = side;
        }
        config
    }

    fn store() -> EntityStore {
        let mut store = EntityStore::new();
        for (i, &(lat, lon)) in [(1.0, 1.0), (1.0, 3.0), (3.0, 3.0)].iter().enumerate() {
            store.add_node(Node::new(i as i64 + 1, lat, lon));
        }
        store.add_way(Way::new(10, SemanticType::LargeRoad, vec![0, 1, 2]));
        store
    }

    #[test]
    fn drains_accumulate_into_each_lod() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[(15, 2), (10, 1)]);
        let world = BBox::new(0.0, 4.0, 0.0, 4.0);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut context = Context::new(&config)
            .unwrap()
            .with_progress(Arc::new(move |e| sink.lock().unwrap().push(e)));

        let store = store();
        context.drain(&world, &store).unwrap();
        context.drain(&world, &store).unwrap();
        let meta = context.finish(world).unwrap();

        assert_eq!(meta.lods, vec![10, 15]);
        assert_eq!(meta.way_count, 2);
        assert_eq!(context.summaries()[0].tiles, 4);

        let mut db = TileDb::open(dir.path(), 15).unwrap();
        assert_eq!(db.tile_count(), 4);
        assert_eq!(db.tile(0).unwrap().ways.len(), 2);
        let mut coarse = TileDb::open(dir.path(), 10).unwrap();
        assert_eq!(coarse.tile_count(), 1);
        assert_eq!(coarse.tile(0).unwrap().ways.len(), 2);

        let events = events.lock().unwrap();
        assert_eq!(events[0], Progress::Drain { pass: 1, ways: 1, relations: 0 });
        assert!(events.contains(&Progress::LodFinished { lod: 10 }));
    }

    #[test]
    fn banded_writes_cover_the_whole_grid() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &[(15, 4)]);
        config.max_tiles_per_pass = 4;
        let world = BBox::new(0.0, 4.0, 0.0, 4.0);
        let mut context = Context::new(&config).unwrap();
        context.drain(&world, &store()).unwrap();
        context.finish(world).unwrap();

        let mut db = TileDb::open(dir.path(), 15).unwrap();
        assert_eq!(db.tile_count(), 16);
        // first vertex (lat 1, lon 1) lies in tile x = 1, y = 1
        assert_eq!(db.tile(5).unwrap().ways.len(), 1);
        assert_eq!(db.tile(15).unwrap().bbox, BBox::new(3.0, 4.0, 3.0, 4.0));
    }

    #[test]
    fn lods_without_entities_get_empty_tiles() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[(15, 1), (3, 2)]);
        let mut context = Context::new(&config).unwrap();
        let meta = context.finish(BBox::WORLD).unwrap();
        assert_eq!(meta.way_count, 0);
        let mut db = TileDb::open(dir.path(), 3).unwrap();
        assert_eq!(db.tile_count(), 4);
        assert!(db.tile(3).unwrap().is_empty());
    }
}
