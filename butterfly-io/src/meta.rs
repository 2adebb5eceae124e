//! The `meta` file: format version, world bounds, record counts and the
//! run settings a reader needs to interpret the tiles.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use butterfly_common::{Error, LineSimplification, Result, Sorting, LOD_COUNT};
use butterfly_geometry::BBox;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::record::{read_bbox, truncated, write_bbox};
use crate::tiledb::meta_path;

pub const FORMAT_VERSION: (i32, i32, i32) = (1, 0, 0);

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub version: (i32, i32, i32),
    pub bbox: BBox,
    /// Way records at the finest LOD.
    pub way_count: u64,
    /// Relation records at the finest LOD.
    pub relation_count: u64,
    pub sorting: Sorting,
    pub simplification: LineSimplification,
    /// Active LODs, coarsest first.
    pub lods: Vec<i16>,
}

impl Meta {
    pub fn write(&self, dir: &Path, debug_text: bool) -> Result<()> {
        let path = meta_path(dir);
        let file = File::create(&path).map_err(|e| Error::io_at(&path, e))?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush()?;

        if debug_text {
            let path = dir.join("meta.txt");
            let file = File::create(&path).map_err(|e| Error::io_at(&path, e))?;
            let mut out = BufWriter::new(file);
            self.write_text(&mut out)?;
            out.flush()?;
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let (major, minor, patch) = self.version;
        for v in [major, minor, patch] {
            out.write_i32::<LittleEndian>(v)?;
        }
        write_bbox(out, &self.bbox)?;
        out.write_u64::<LittleEndian>(self.way_count)?;
        out.write_u64::<LittleEndian>(self.relation_count)?;
        out.write_i32::<LittleEndian>(self.sorting.code())?;
        out.write_u8(u8::from(self.simplification.meta_flag()))?;
        out.write_i16::<LittleEndian>(self.lods.len() as i16)?;
        for &lod in &self.lods {
            out.write_i16::<LittleEndian>(lod)?;
        }
        Ok(())
    }

    fn write_text<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let (major, minor, patch) = self.version;
        let b = &self.bbox;
        writeln!(out, "Version: {major}.{minor}.{patch}")?;
        writeln!(
            out,
            "Bounding Box: {:.7} {:.7} {:.7} {:.7}",
            b.min_lat, b.max_lat, b.min_lon, b.max_lon
        )?;
        writeln!(out, "Ways: {}", self.way_count)?;
        writeln!(out, "Relations: {}", self.relation_count)?;
        writeln!(out, "Sorting: {} ({})", self.sorting.code(), self.sorting)?;
        writeln!(
            out,
            "Line Simplification: {} ({})",
            u8::from(self.simplification.meta_flag()),
            self.simplification
        )?;
        writeln!(out, "LoD Count: {}", self.lods.len())?;
        writeln!(out, "LoDs:")?;
        for lod in &self.lods {
            writeln!(out, "\tlod {lod}")?;
        }
        Ok(())
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = meta_path(dir);
        let file = File::open(&path).map_err(|e| Error::io_at(&path, e))?;
        Self::read_from(&mut BufReader::new(file))
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let mut version = [0i32; 3];
        for v in &mut version {
            *v = input.read_i32::<LittleEndian>().map_err(truncated)?;
        }
        let bbox = read_bbox(input)?;
        let way_count = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let relation_count = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let code = input.read_i32::<LittleEndian>().map_err(truncated)?;
        let sorting = Sorting::from_code(code)
            .ok_or_else(|| Error::DataError(format!("unknown sort code {code} in meta")))?;
        let simplification = if input.read_u8().map_err(truncated)? != 0 {
            LineSimplification::DouglasPeucker
        } else {
            LineSimplification::VisvalingamWhyatt
        };
        let count = input.read_i16::<LittleEndian>().map_err(truncated)?;
        if !(0..=LOD_COUNT as i16).contains(&count) {
            return Err(Error::DataError(format!("meta lists {count} LODs")));
        }
        let lods = (0..count)
            .map(|_| input.read_i16::<LittleEndian>().map_err(truncated))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version: (version[0], version[1], version[2]),
            bbox,
            way_count,
            relation_count,
            sorting,
            simplification,
            lods,
        })
    }
}
