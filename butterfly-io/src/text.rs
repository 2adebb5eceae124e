//! Human-readable rendering of the tile database, written beside the
//! binary files in debug mode.

use std::io::{self, Write};

use butterfly_geometry::BBox;

use crate::record::{MemberRecord, RelationRecord, TileRecords, WayRecord};

fn way<W: Write>(out: &mut W, way: &WayRecord) -> io::Result<()> {
    writeln!(out, "{} {}", way.points.len(), way.kind)?;
    for p in &way.points {
        writeln!(out, "{:.7} {:.7}", p.lat, p.lon)?;
    }
    Ok(())
}

fn relation<W: Write>(out: &mut W, relation: &RelationRecord) -> io::Result<()> {
    writeln!(out, "{} {}", relation.members.len(), relation.kind)?;
    for member in &relation.members {
        match member {
            MemberRecord::Way { role, way: w } => {
                write!(out, "1 {role} ")?;
                way(out, w)?;
            }
            MemberRecord::Relation { role, relation: r } => {
                write!(out, "0 {role} ")?;
                self::relation(out, r)?;
            }
        }
    }
    Ok(())
}

fn bbox(b: &BBox) -> String {
    format!("{:.7} {:.7} {:.7} {:.7}", b.min_lat, b.max_lat, b.min_lon, b.max_lon)
}

pub fn write_tile<W: Write>(out: &mut W, tile: &TileRecords) -> io::Result<()> {
    writeln!(out, "{} {} {}", tile.ways.len(), tile.relations.len(), bbox(&tile.bbox))?;
    for w in &tile.ways {
        way(out, w)?;
    }
    for r in &tile.relations {
        relation(out, r)?;
    }
    Ok(())
}

pub fn write_lookup_header<W: Write>(
    out: &mut W,
    count: u64,
    lat_step: f64,
    lon_step: f64,
) -> io::Result<()> {
    writeln!(out, "{count} {lat_step:.7} {lon_step:.7}")
}

pub fn write_lookup_entry<W: Write>(out: &mut W, b: &BBox, offset: u64) -> io::Result<()> {
    writeln!(out, "{} {offset}", bbox(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Coord;

    #[test]
    fn renders_nested_records() {
        let tile = TileRecords {
            bbox: BBox::new(0.0, 1.0, 2.0, 3.0),
            ways: vec![WayRecord {
                kind: 22,
                points: vec![Coord::new(0.5, 2.5), Coord::new(0.25, 2.75)],
            }],
            relations: vec![RelationRecord {
                kind: 18,
                members: vec![MemberRecord::Way {
                    role: 0,
                    way: WayRecord {
                        kind: 1,
                        points: vec![Coord::new(0.1, 2.1)],
                    },
                }],
            }],
        };
        let mut out = Vec::new();
        write_tile(&mut out, &tile).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "1 1 0.0000000 1.0000000 2.0000000 3.0000000\n\
             2 22\n0.5000000 2.5000000\n0.2500000 2.7500000\n\
             1 18\n1 0 1 1\n0.1000000 2.1000000\n"
        );
    }
}
