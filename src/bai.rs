//! BAI coordinate index parsing.
//!
//! A BAI file stores, per reference sequence, a binning index over chunks
//! of alignment records and a linear index: one virtual file offset per
//! 16 kbp tile of the reference. Volume estimation only needs the linear
//! index, so the binning section is skipped field-by-field.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::bgzf::VirtualOffset;

/// Errors reading or resolving a BAI index.
#[derive(Error, Debug)]
pub enum BaiError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid BAI index: {0}")]
    InvalidFormat(String),

    #[error("no index found for {0}; expected {0}.bai")]
    NotFound(PathBuf),

    #[error("either a primary file or an explicit index file is required")]
    NoInput,
}

/// Linear-index entry for one 16 kbp tile of a reference.
///
/// A zero virtual offset means no alignment overlaps the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileOffset(VirtualOffset);

impl TileOffset {
    #[inline]
    pub fn new(offset: VirtualOffset) -> Self {
        Self(offset)
    }

    /// Compressed byte offset of the BGZF block holding the tile's first
    /// record.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.0.compressed()
    }

    /// Uncompressed offset within that block.
    #[inline]
    pub fn block_offset(&self) -> u16 {
        self.0.uncompressed()
    }

    /// Whether the tile holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.raw() == 0
    }
}

/// The linear index of a single reference: one entry per tile, in tile
/// order. May be shorter than the reference (trailing empty tiles are not
/// stored).
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    pub tiles: Vec<TileOffset>,
}

/// A parsed coordinate index: one [`ReferenceIndex`] per reference, in the
/// order the references appear in the alignment file header.
#[derive(Debug, Clone, Default)]
pub struct CoordinateIndex {
    pub refs: Vec<ReferenceIndex>,
}

impl CoordinateIndex {
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Locate the index file for `primary`, honoring an explicit override.
///
/// Resolution order: the explicit `index` path if given, then
/// `<primary>.bai`, then the primary path with its extension replaced by
/// `.bai`.
pub fn resolve_index_file(
    primary: Option<&Path>,
    index: Option<&Path>,
) -> Result<PathBuf, BaiError> {
    if let Some(index) = index {
        return Ok(index.to_path_buf());
    }
    let primary = primary.ok_or(BaiError::NoInput)?;

    let mut appended = primary.as_os_str().to_os_string();
    appended.push(".bai");
    let appended = PathBuf::from(appended);
    if appended.exists() {
        return Ok(appended);
    }

    let replaced = primary.with_extension("bai");
    if replaced.exists() {
        return Ok(replaced);
    }

    Err(BaiError::NotFound(primary.to_path_buf()))
}

/// Parse a BAI file.
pub fn read_bai<P: AsRef<Path>>(path: P) -> Result<CoordinateIndex, BaiError> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    read_bai_from(&mut reader)
}

/// Parse a BAI index from a reader.
pub fn read_bai_from<R: Read + Seek>(reader: &mut R) -> Result<CoordinateIndex, BaiError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != b"BAI\x01" {
        return Err(BaiError::InvalidFormat(format!("bad magic {:?}", magic)));
    }

    let n_ref = reader.read_i32::<LittleEndian>()?;
    if n_ref < 0 {
        return Err(BaiError::InvalidFormat("negative reference count".into()));
    }

    let mut refs = Vec::with_capacity(n_ref as usize);
    for _ in 0..n_ref {
        let n_bin = reader.read_i32::<LittleEndian>()?;
        if n_bin < 0 {
            return Err(BaiError::InvalidFormat("negative bin count".into()));
        }
        for _ in 0..n_bin {
            let _bin = reader.read_u32::<LittleEndian>()?;
            let n_chunk = reader.read_i32::<LittleEndian>()?;
            if n_chunk < 0 {
                return Err(BaiError::InvalidFormat("negative chunk count".into()));
            }
            reader.seek(io::SeekFrom::Current(n_chunk as i64 * 16))?;
        }

        let n_intv = reader.read_i32::<LittleEndian>()?;
        if n_intv < 0 {
            return Err(BaiError::InvalidFormat("negative interval count".into()));
        }
        let mut tiles = Vec::with_capacity(n_intv as usize);
        for _ in 0..n_intv {
            let raw = reader.read_u64::<LittleEndian>()?;
            tiles.push(TileOffset::new(VirtualOffset::from_raw(raw)));
        }
        refs.push(ReferenceIndex { tiles });
    }

    // An optional trailing count of unplaced reads may follow; it is not
    // used for partitioning.
    Ok(CoordinateIndex { refs })
}
