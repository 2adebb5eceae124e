//! Ingestion of a file on disk under caps small enough to force several
//! sub-passes and a reconciliation pass.

use std::fs::File;

use butterfly_common::{Limits, Result};
use butterfly_extract::model::MemberKind;
use butterfly_extract::pbf::{BlockBuilder, PbfWriter, RawNode, RawRelation, RawWay};
use butterfly_extract::{Drain, EntityStore, Ingestor, SemanticType};
use butterfly_geometry::BBox;
use tempfile::TempDir;

/// Keeps a summary of every drained way and relation.
#[derive(Default)]
struct Collect {
    ways: Vec<(i64, SemanticType, usize, bool)>,
    relations: Vec<(i64, SemanticType, usize)>,
    singles: usize,
    drains: usize,
}

impl Drain for Collect {
    fn drain(&mut self, world: &BBox, store: &EntityStore) -> Result<()> {
        assert!(world.min_lat < world.max_lat);
        self.drains += 1;
        self.singles += store.singles.len();
        for way in &store.ways {
            self.ways.push((way.id, way.kind, way.refs.len(), way.member_only));
            // every reference points into the current arena
            assert!(way.refs.iter().all(|&i| i < store.nodes.len()));
        }
        for rel in &store.relations {
            if !rel.member_only {
                self.relations.push((rel.id, rel.kind, rel.members.len()));
            }
        }
        Ok(())
    }
}

fn square(first: i64, lat: f64, lon: f64) -> Vec<RawNode> {
    [(0.0, 0.0), (0.0, 0.001), (0.001, 0.001), (0.001, 0.0)]
        .iter()
        .enumerate()
        .map(|(i, &(dlat, dlon))| RawNode::new(first + i as i64, lat + dlat, lon + dlon))
        .collect()
}

fn ring(first: i64) -> Vec<i64> {
    vec![first, first + 1, first + 2, first + 3, first]
}

#[test]
fn sub_passes_and_reconciliation_cover_every_entity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("input.osm.pbf");
    let mut writer = PbfWriter::new(File::create(&path).unwrap(), true);
    writer.write_header(Some(BBox::new(10.0, 11.0, 20.0, 21.0))).unwrap();
    for chunk in 0..3 {
        let first = 1 + chunk * 10;
        let mut nodes = square(first, 10.1 + chunk as f64 * 0.1, 20.1);
        if chunk == 0 {
            nodes.push(RawNode::new(100, 10.5, 20.5).tag("natural", "tree"));
        }
        writer.write_block(BlockBuilder::new().dense(&nodes).finish()).unwrap();
    }
    writer
        .write_block(
            BlockBuilder::new()
                .ways(&[
                    RawWay::new(1000, &ring(1)).tag("building", "house"),
                    RawWay::new(1001, &ring(11)).tag("landuse", "forest"),
                    RawWay::new(1002, &ring(21)),
                ])
                .finish(),
        )
        .unwrap();
    writer
        .write_block(
            BlockBuilder::new()
                .relations(&[
                    RawRelation::new(2000)
                        .tag("natural", "water")
                        .member(MemberKind::Way, 1002, "outer")
                        .member(MemberKind::Relation, 2001, "inner"),
                    RawRelation::new(2001)
                        .tag("type", "multipolygon")
                        .tag("leisure", "park")
                        .member(MemberKind::Way, 1001, "outer"),
                ])
                .finish(),
        )
        .unwrap();
    drop(writer);

    let limits = Limits {
        max_nodes: 5,
        ..Limits::default()
    };
    let mut ingestor = Ingestor::open_path(&path, limits, 4).unwrap();
    let mut sink = Collect::default();
    let stats = ingestor.run(&mut sink).unwrap();

    assert_eq!(stats.nodes, 13);
    assert_eq!(stats.singles, 1);
    assert_eq!(sink.singles, 1);
    assert!(stats.sub_passes >= 3);

    let standalone: Vec<i64> = sink.ways.iter().filter(|w| !w.3).map(|w| w.0).collect();
    assert!(standalone.contains(&1000));
    assert!(standalone.contains(&1001));
    assert!(sink.ways.iter().all(|w| w.2 == 5));
    assert_eq!(
        sink.relations,
        vec![(2000, SemanticType::Water, 2), (2001, SemanticType::GreenLand, 1)]
    );
    assert_eq!(stats.promoted_relations, 2);
    assert_eq!(stats.dropped_ways + stats.dropped_relations, 0);
}
