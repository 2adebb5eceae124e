use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use butterfly_common::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use log::{debug, error, warn};
use protobuf::Message;

use super::{Block, MAX_BLOB_SIZE, MAX_HEADER_SIZE, OSM_DATA, OSM_HEADER};
use crate::proto::fileformat::{Blob, BlobHeader};
use crate::proto::osmformat::{HeaderBlock, PrimitiveBlock};

/// Sequential, seekable reader over the blocks of a PBF file.
pub struct BlockReader<R> {
    inner: BufReader<R>,
}

impl BlockReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(1 << 20, inner),
        }
    }

    /// Byte offset of the next block.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(0)
    }

    /// Read the next block, `None` at a clean end of stream.
    ///
    /// Oversized or unparseable framing is a data error; a payload that
    /// fails to decompress is logged and returned as [`Block::Skipped`].
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let offset = self.position()?;

        let header_len = self
            .inner
            .read_i32::<BigEndian>()
            .map_err(|e| truncated(offset, "header length", e))?;
        if header_len < 0 || header_len as usize > MAX_HEADER_SIZE {
            return Err(Error::DataError(format!(
                "block header at byte {offset} declares {header_len} bytes (limit {MAX_HEADER_SIZE})"
            )));
        }

        let mut buf = vec![0u8; header_len as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| truncated(offset, "block header", e))?;
        let header = BlobHeader::parse_from_bytes(&buf)
            .map_err(|e| Error::DataError(format!("block header at byte {offset}: {e}")))?;

        let size = header.datasize();
        if size < 0 || size as usize > MAX_BLOB_SIZE {
            return Err(Error::DataError(format!(
                "blob at byte {offset} declares {size} bytes (limit {MAX_BLOB_SIZE})"
            )));
        }
        let mut buf = vec![0u8; size as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| truncated(offset, "blob", e))?;
        let blob = Blob::parse_from_bytes(&buf)
            .map_err(|e| Error::DataError(format!("blob at byte {offset}: {e}")))?;

        let Some(payload) = payload(&blob, offset)? else {
            return Ok(Some(Block::Skipped));
        };

        match header.type_() {
            OSM_HEADER => {
                let block = HeaderBlock::parse_from_bytes(&payload)
                    .map_err(|e| Error::DataError(format!("header block at byte {offset}: {e}")))?;
                Ok(Some(Block::Header(Box::new(block))))
            }
            OSM_DATA => {
                let block = PrimitiveBlock::parse_from_bytes(&payload)
                    .map_err(|e| Error::DataError(format!("data block at byte {offset}: {e}")))?;
                Ok(Some(Block::Data(Box::new(block))))
            }
            other => {
                warn!("Skipping block of unknown type '{other}' at byte {offset}");
                Ok(Some(Block::Skipped))
            }
        }
    }
}

fn truncated(offset: u64, what: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::DataError(format!("truncated {what} in block at byte {offset}"))
    } else {
        Error::IoError(err)
    }
}

/// Uncompressed payload of a blob, `None` if it has to be skipped.
fn payload(blob: &Blob, offset: u64) -> Result<Option<Vec<u8>>> {
    let declared = blob.raw_size.map(|s| s.max(0) as usize);
    if declared.is_some_and(|s| s > MAX_BLOB_SIZE) {
        return Err(Error::DataError(format!(
            "blob at byte {offset} expands to more than {MAX_BLOB_SIZE} bytes"
        )));
    }

    match (&blob.raw, &blob.zlib_data) {
        (Some(raw), zlib) => {
            if zlib.is_some() {
                warn!("Blob at byte {offset} carries raw and zlib data, using raw");
            }
            if declared.is_some_and(|s| s != raw.len()) {
                return Err(Error::DataError(format!(
                    "raw blob at byte {offset} has {} bytes, header says {}",
                    raw.len(),
                    declared.unwrap_or_default()
                )));
            }
            Ok(Some(raw.clone()))
        }
        (None, Some(zlib)) => {
            let mut out = Vec::with_capacity(declared.unwrap_or(zlib.len() * 4));
            let limit = MAX_BLOB_SIZE as u64 + 1;
            match ZlibDecoder::new(zlib.as_slice()).take(limit).read_to_end(&mut out) {
                Ok(_) if out.len() > MAX_BLOB_SIZE => Err(Error::DataError(format!(
                    "blob at byte {offset} expands to more than {MAX_BLOB_SIZE} bytes"
                ))),
                Ok(_) => {
                    debug!("Inflated blob at byte {offset}: {} -> {} bytes", zlib.len(), out.len());
                    Ok(Some(out))
                }
                Err(e) => {
                    error!("Failed to decompress blob at byte {offset}, skipping block: {e}");
                    Ok(None)
                }
            }
        }
        (None, None) => {
            error!("Blob at byte {offset} has no supported payload, skipping block");
            Ok(None)
        }
    }
}
