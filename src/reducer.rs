//! Reduction of a coordinate index to volume-annotated intervals.
//!
//! The reducer walks the linear index tile by tile and estimates, for each
//! non-empty tile, how many compressed bytes of the alignment file it
//! accounts for. Offsets only tell how far the file has advanced once the
//! *next* tile begins, so each emitted interval carries the identity of the
//! previous non-empty tile and the offset deltas accumulated since it; a
//! sentinel with zero deltas closes the final reference.
//!
//! Estimated volumes are then coalesced into batches of roughly
//! `batch_volume` bytes: runs of consecutive small tiles merge, oversized
//! tiles split.

use thiserror::Error;

use crate::bai::{CoordinateIndex, TileOffset};
use crate::bgzf::BGZF_BLOCK_SIZE;
use crate::interval::GenomeInterval;
use crate::references::References;
use crate::volume::VolumeInterval;

/// Length of an index tile in bases.
pub const INTERVAL_LEN: u64 = 1 << 14;

/// Multiplier on the target batch volume giving the maximum batch volume.
pub const BATCH_VOLUME_COEFF: f64 = 1.5;

/// Errors reducing an index against a reference table.
#[derive(Error, Debug)]
pub enum ReducerError {
    #[error("index covers {0} references but the reference table has {1}")]
    ReferenceCountMismatch(usize, usize),

    #[error("reference {0} has index tiles beyond its length {1}")]
    TileOutOfRange(String, u64),
}

/// One non-empty tile of the linear index, annotated with offset deltas
/// from the previous non-empty tile and an estimated volume.
#[derive(Debug, Clone)]
pub struct IndexInterval {
    pub interval: GenomeInterval,
    /// Dense reference id of the tile's reference.
    pub ref_num: usize,
    /// Tile number within the reference.
    pub ivl_num: usize,
    /// Compressed offset of the BGZF block holding the tile's first record.
    pub file_offset: u64,
    /// Uncompressed offset within that block.
    pub block_offset: u16,
    /// Compressed bytes advanced since the previous non-empty tile; zero
    /// when both tiles start in the same block.
    pub file_offset_diff: u64,
    /// In-block offset change since the previous non-empty tile; may be
    /// negative across block boundaries.
    pub block_offset_diff: i64,
    /// Whether this is the last non-empty tile of its reference.
    pub contig_end: bool,
    /// Estimated volume in bytes; zero until estimation runs.
    pub volume: u64,
}

impl IndexInterval {
    fn new(
        references: &References,
        ref_num: usize,
        ivl_num: usize,
        offset: TileOffset,
        file_offset_diff: u64,
        block_offset_diff: i64,
        contig_end: bool,
    ) -> Result<Self, ReducerError> {
        let (name, contig_len) = references
            .get(ref_num)
            .ok_or(ReducerError::ReferenceCountMismatch(ref_num + 1, references.len()))?;
        let start = ivl_num as u64 * INTERVAL_LEN;
        if start >= contig_len {
            return Err(ReducerError::TileOutOfRange(name.to_string(), contig_len));
        }
        Ok(Self {
            interval: GenomeInterval::new(name, start, contig_len.min(start + INTERVAL_LEN)),
            ref_num,
            ivl_num,
            file_offset: offset.file_offset(),
            block_offset: offset.block_offset(),
            file_offset_diff,
            block_offset_diff,
            contig_end,
            volume: 0,
        })
    }

    /// Estimate the tile's volume given the observed compressed size of a
    /// single BGZF block.
    ///
    /// Within one block the volume is just the uncompressed offset delta.
    /// Across blocks, the file offset delta divided by the compressed block
    /// size estimates how many blocks were spanned (at least one); the
    /// count scales up to uncompressed bytes, adjusted by the in-block
    /// delta.
    fn estimate_volume(&mut self, compressed_block_size: f64) -> u64 {
        self.volume = if self.file_offset_diff == 0 {
            self.block_offset_diff.max(0) as u64
        } else {
            let num_blocks = (self.file_offset_diff as f64 / compressed_block_size).max(1.0);
            let bytes = num_blocks * BGZF_BLOCK_SIZE as f64 + self.block_offset_diff as f64;
            bytes.ceil().max(0.0) as u64
        };
        self.volume
    }

    fn to_volume_interval(&self) -> VolumeInterval {
        VolumeInterval::from_interval(self.interval.clone(), self.volume)
    }
}

/// Median of a non-empty unsorted sequence, averaging the middle pair.
fn median(mut values: Vec<u64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 1 {
        values[mid] as f64
    } else {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    })
}

/// Stage A: reduce the linear index to one [`IndexInterval`] per non-empty
/// tile, in `(ref_num, ivl_num)` order, closed by a zero-delta sentinel.
pub fn index_to_intervals(
    index: &CoordinateIndex,
    references: &References,
) -> Result<Vec<IndexInterval>, ReducerError> {
    if index.len() > references.len() {
        return Err(ReducerError::ReferenceCountMismatch(
            index.len(),
            references.len(),
        ));
    }

    let mut intervals = Vec::new();
    // Identity and offset of the latest non-empty tile seen, one tile in
    // arrears of the scan: volumes need the offsets of the following tile.
    let mut prev: Option<(usize, usize, TileOffset)> = None;

    for (ref_num, ref_index) in index.refs.iter().enumerate() {
        let tiles = &ref_index.tiles;

        let Some(first_non_empty) = tiles.iter().position(|t| !t.is_empty()) else {
            // No reads on this reference; the leading tiles of the next one
            // still close out whatever reference came before.
            continue;
        };

        let mut scan_from = first_non_empty;
        if prev.is_none() {
            prev = Some((ref_num, first_non_empty, tiles[first_non_empty]));
            scan_from += 1;
        }

        for (ivl_num, tile) in tiles.iter().enumerate().skip(scan_from) {
            if tile.is_empty() {
                continue;
            }
            let (prev_ref, prev_ivl, prev_tile) = prev.expect("seeded before scanning");

            let file_offset_diff = if tile.file_offset() != prev_tile.file_offset() {
                tile.file_offset() - prev_tile.file_offset()
            } else {
                0
            };
            let block_offset_diff = tile.block_offset() as i64 - prev_tile.block_offset() as i64;

            intervals.push(IndexInterval::new(
                references,
                prev_ref,
                prev_ivl,
                prev_tile,
                file_offset_diff,
                block_offset_diff,
                prev_ref != ref_num,
            )?);

            prev = Some((ref_num, ivl_num, *tile));
        }
    }

    // Sentinel closing the last reference.
    if let Some((prev_ref, prev_ivl, prev_tile)) = prev {
        intervals.push(IndexInterval::new(
            references, prev_ref, prev_ivl, prev_tile, 0, 0, true,
        )?);
    }

    Ok(intervals)
}

/// Stages A-C: reduce the index and coalesce per-tile volumes into batch
/// intervals of roughly `batch_volume` bytes (estimated from the data when
/// not supplied).
pub fn iter_index_intervals(
    index: &CoordinateIndex,
    references: &References,
    batch_volume: Option<u64>,
) -> Result<Vec<VolumeInterval>, ReducerError> {
    let mut ivls = index_to_intervals(index, references)?;
    if ivls.is_empty() {
        return Ok(Vec::new());
    }

    // The median positive file-offset delta approximates the compressed
    // size of one full BGZF block.
    let compressed_block_size = median(
        ivls.iter()
            .map(|i| i.file_offset_diff)
            .filter(|&d| d > 0)
            .collect(),
    )
    .unwrap_or(1.0);

    for ivl in &mut ivls {
        ivl.estimate_volume(compressed_block_size);
    }

    let batch_volume = match batch_volume {
        Some(v) => v.max(1),
        None => median(ivls.iter().map(|i| i.volume).filter(|&v| v > 0).collect())
            .unwrap_or(1.0)
            .max(1.0) as u64,
    };
    let max_batch = batch_volume as f64 * BATCH_VOLUME_COEFF;

    let mut out = Vec::new();
    let mut group: Vec<&IndexInterval> = Vec::new();
    let mut group_volume: u64 = 0;

    let flush = |group: &mut Vec<&IndexInterval>, group_volume: &mut u64, out: &mut Vec<VolumeInterval>| {
        if let Some(merged) =
            VolumeInterval::merge_precomputed(group.iter().map(|i| &i.interval), *group_volume)
        {
            out.push(merged);
        }
        group.clear();
        *group_volume = 0;
    };

    let mut prev_tile: Option<(usize, usize)> = None;
    for ivl in &ivls {
        let large = ivl.volume as f64 >= max_batch;
        let consecutive =
            prev_tile == Some((ivl.ref_num, ivl.ivl_num.wrapping_sub(1))) && ivl.ivl_num > 0;

        if !group.is_empty() && (large || !consecutive) {
            flush(&mut group, &mut group_volume, &mut out);
        }

        if large {
            out.extend(ivl.to_volume_interval().split_to_volume(batch_volume));
        } else {
            if !group.is_empty() && (group_volume + ivl.volume) as f64 > max_batch {
                flush(&mut group, &mut group_volume, &mut out);
            }
            group.push(ivl);
            group_volume += ivl.volume;
            prev_tile = Some((ivl.ref_num, ivl.ivl_num));

            if ivl.contig_end {
                flush(&mut group, &mut group_volume, &mut out);
            }
        }
    }
    flush(&mut group, &mut group_volume, &mut out);

    Ok(out)
}
