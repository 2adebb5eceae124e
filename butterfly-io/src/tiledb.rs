//! Per-LOD `dataLL`/`lookupLL` files: writing with incremental merge, and
//! reading back.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use butterfly_common::{Error, Result, LOD_COUNT};
use butterfly_geometry::BBox;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use crate::record::{self, read_tile, truncated, TileRecords};
use crate::text;

pub fn data_path(dir: &Path, lod: usize) -> PathBuf {
    dir.join(format!("data{lod:02}"))
}

pub fn lookup_path(dir: &Path, lod: usize) -> PathBuf {
    dir.join(format!("lookup{lod:02}"))
}

pub fn meta_path(dir: &Path) -> PathBuf {
    dir.join("meta")
}

fn text_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".txt");
    PathBuf::from(name)
}

/// Create the output directory and delete database files of earlier runs.
pub fn prepare_output(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io_at(dir, e))?;
    let mut stale = vec![meta_path(dir)];
    for lod in 0..LOD_COUNT {
        stale.push(data_path(dir, lod));
        stale.push(lookup_path(dir, lod));
    }
    for path in stale {
        for p in [text_path(&path), path] {
            if p.exists() {
                debug!("Removing stale {}", p.display());
                fs::remove_file(&p).map_err(|e| Error::io_at(&p, e))?;
            }
        }
    }
    for tmp in ["tmp_data", "tmp_lookup"] {
        let p = dir.join(tmp);
        if p.exists() {
            fs::remove_file(&p).map_err(|e| Error::io_at(&p, e))?;
        }
    }
    Ok(())
}

/// One lookup entry: tile bounds and the tile's byte offset in `dataLL`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupEntry {
    pub bbox: BBox,
    pub offset: u64,
}

/// Parsed `lookupLL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub lat_step: f64,
    pub lon_step: f64,
    pub tiles: Vec<LookupEntry>,
}

impl Lookup {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
        Self::read_from(&mut BufReader::new(file))
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let count = input.read_u64::<LittleEndian>().map_err(truncated)?;
        let lat_step = input.read_f64::<LittleEndian>().map_err(truncated)?;
        let lon_step = input.read_f64::<LittleEndian>().map_err(truncated)?;
        let mut tiles = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            let bbox = record::read_bbox(input)?;
            let offset = input.read_i64::<LittleEndian>().map_err(truncated)?;
            let offset = u64::try_from(offset)
                .map_err(|_| Error::DataError(format!("negative tile offset {offset}")))?;
            tiles.push(LookupEntry { bbox, offset });
        }
        Ok(Self { lat_step, lon_step, tiles })
    }
}

/// Read access to one LOD of a written database.
pub struct TileDb {
    pub lookup: Lookup,
    data: BufReader<File>,
}

impl TileDb {
    pub fn open(dir: &Path, lod: usize) -> Result<Self> {
        let lookup = Lookup::read(&lookup_path(dir, lod))?;
        let path = data_path(dir, lod);
        let data = File::open(&path).map_err(|e| Error::io_at(&path, e))?;
        Ok(Self {
            lookup,
            data: BufReader::new(data),
        })
    }

    pub fn tile_count(&self) -> usize {
        self.lookup.tiles.len()
    }

    pub fn tile(&mut self, index: usize) -> Result<TileRecords> {
        let entry = self.lookup.tiles.get(index).ok_or_else(|| {
            Error::InvalidInput(format!("tile {index} outside {} tiles", self.lookup.tiles.len()))
        })?;
        self.data.seek(SeekFrom::Start(entry.offset))?;
        read_tile(&mut self.data)
    }
}

/// Grid-wide values of a LOD's lookup file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHeader {
    pub lat_step: f64,
    pub lon_step: f64,
}

/// Records added to a LOD by one write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub tiles: u64,
    pub ways: u64,
    pub relations: u64,
}

/// Writes one LOD, merging into files already present.
pub struct LodWriter<'a> {
    dir: &'a Path,
    lod: usize,
    debug_text: bool,
}

impl<'a> LodWriter<'a> {
    pub fn new(dir: &'a Path, lod: usize, debug_text: bool) -> Self {
        Self { dir, lod, debug_text }
    }

    /// Add `tiles` as global tiles `first..first + tiles.len()`.
    ///
    /// Existing tiles keep their records, followed by the new ones; tiles
    /// past the existing count are appended. Everything is written to
    /// `tmp_data`/`tmp_lookup` and renamed over the originals.
    pub fn write(
        &self,
        grid: GridHeader,
        first: u64,
        tiles: &[TileRecords],
    ) -> Result<WriteSummary> {
        let data = data_path(self.dir, self.lod);
        let lookup = lookup_path(self.dir, self.lod);
        let merging = fs::metadata(&data).map(|m| m.len() > 0).unwrap_or(false);

        let mut old = if merging {
            debug!("Merging into existing {}", data.display());
            Some(TileDb::open(self.dir, self.lod)?)
        } else {
            None
        };
        let old_count = old.as_ref().map_or(0, |db| db.tile_count() as u64);
        if first > old_count {
            return Err(Error::LogicError(format!(
                "LOD {} write starts at tile {first} but only {old_count} tiles exist",
                self.lod
            )));
        }
        let total = old_count.max(first + tiles.len() as u64);

        let tmp_data = self.dir.join("tmp_data");
        let tmp_lookup = self.dir.join("tmp_lookup");
        let mut data_out = create(&tmp_data)?;
        let mut lookup_out = create(&tmp_lookup)?;
        let mut text_out = if self.debug_text {
            Some((create(&text_path(&data))?, create(&text_path(&lookup))?))
        } else {
            None
        };

        lookup_out.write_u64::<LittleEndian>(total)?;
        lookup_out.write_f64::<LittleEndian>(grid.lat_step)?;
        lookup_out.write_f64::<LittleEndian>(grid.lon_step)?;
        if let Some((_, look_txt)) = text_out.as_mut() {
            text::write_lookup_header(look_txt, total, grid.lat_step, grid.lon_step)?;
        }

        let mut summary = WriteSummary::default();
        let mut offset = 0u64;
        let mut buf = Vec::new();
        for i in 0..total {
            let fresh = i
                .checked_sub(first)
                .and_then(|k| tiles.get(k as usize));
            let tile = match (old.as_mut(), fresh) {
                (Some(db), fresh) if i < old_count => {
                    let mut tile = db.tile(i as usize)?;
                    if let Some(new) = fresh {
                        tile.ways.extend(new.ways.iter().cloned());
                        tile.relations.extend(new.relations.iter().cloned());
                    }
                    tile
                }
                (_, Some(new)) => new.clone(),
                (_, None) => {
                    return Err(Error::LogicError(format!(
                        "LOD {} tile {i} has no source",
                        self.lod
                    )))
                }
            };
            if let Some(new) = fresh {
                summary.tiles += 1;
                summary.ways += new.ways.len() as u64;
                summary.relations += new.relations.len() as u64;
            }

            buf.clear();
            record::write_tile(&mut buf, &tile)?;
            data_out.write_all(&buf)?;
            record::write_bbox(&mut lookup_out, &tile.bbox)?;
            lookup_out.write_i64::<LittleEndian>(offset as i64)?;
            if let Some((data_txt, look_txt)) = text_out.as_mut() {
                text::write_tile(data_txt, &tile)?;
                text::write_lookup_entry(look_txt, &tile.bbox, offset)?;
            }
            offset += buf.len() as u64;
        }

        data_out.flush()?;
        lookup_out.flush()?;
        if let Some((mut data_txt, mut look_txt)) = text_out {
            data_txt.flush()?;
            look_txt.flush()?;
        }
        drop(data_out);
        drop(lookup_out);
        drop(old);

        replace(&tmp_data, &data)?;
        replace(&tmp_lookup, &lookup)?;
        info!(
            "{} LOD {}: {} tiles, {} ways and {} relations added",
            if merging { "Updated" } else { "Wrote" },
            self.lod,
            summary.tiles,
            summary.ways,
            summary.relations
        );
        Ok(summary)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::io_at(path, e))
}

/// Swap `tmp` in for `dest`, removing `dest` first if present.
fn replace(tmp: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_file(dest).map_err(|e| Error::io_at(dest, e))?;
    }
    fs::rename(tmp, dest).map_err(|e| Error::io_at(dest, e))
}
