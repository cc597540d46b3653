//! Tabix index writing for bgzipped BED output.
//!
//! A `.tbi` index is itself a BGZF stream holding, per reference, an
//! R-tree-style binning index of record chunks plus a linear index of
//! 16 kbp windows. The writer here hardcodes the BED preset (sequence,
//! begin, end in columns 1-3, `#` comments, 0-based half-open coordinates).

use std::io::{self, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::bgzf::{BgzfWriter, VirtualOffset};

/// BED preset: generic format with UCSC 0-based coordinates.
const FORMAT_BED: i32 = 0x10000;
const COL_SEQ: i32 = 1;
const COL_BEG: i32 = 2;
const COL_END: i32 = 3;
const META_CHAR: i32 = b'#' as i32;
const LINEAR_SHIFT: u32 = 14;

/// Placement of one BED row in the compressed output stream.
#[derive(Debug, Clone, Copy)]
pub struct TabixRecord {
    pub ref_id: usize,
    pub start: u64,
    pub end: u64,
    pub begin_voffset: VirtualOffset,
    pub end_voffset: VirtualOffset,
}

/// Compute the smallest R-tree bin fully containing `[start, end)`.
fn reg2bin(start: u64, end: u64) -> u32 {
    let end = end - 1;
    if start >> 14 == end >> 14 {
        return (((1 << 15) - 1) / 7 + (start >> 14)) as u32;
    }
    if start >> 17 == end >> 17 {
        return (((1 << 12) - 1) / 7 + (start >> 17)) as u32;
    }
    if start >> 20 == end >> 20 {
        return (((1 << 9) - 1) / 7 + (start >> 20)) as u32;
    }
    if start >> 23 == end >> 23 {
        return (((1 << 6) - 1) / 7 + (start >> 23)) as u32;
    }
    if start >> 26 == end >> 26 {
        return (((1 << 3) - 1) / 7 + (start >> 26)) as u32;
    }
    0
}

#[derive(Default)]
struct RefBins {
    // Bin number -> chunks, kept sorted by bin for deterministic output.
    bins: std::collections::BTreeMap<u32, Vec<(u64, u64)>>,
    linear: Vec<u64>,
}

impl RefBins {
    fn insert(&mut self, rec: &TabixRecord) {
        let bin = reg2bin(rec.start, rec.end);
        let chunks = self.bins.entry(bin).or_default();
        // Extend the previous chunk when the records are back-to-back.
        match chunks.last_mut() {
            Some(last) if last.1 == rec.begin_voffset.raw() => last.1 = rec.end_voffset.raw(),
            _ => chunks.push((rec.begin_voffset.raw(), rec.end_voffset.raw())),
        }

        let first_window = (rec.start >> LINEAR_SHIFT) as usize;
        let last_window = ((rec.end - 1) >> LINEAR_SHIFT) as usize;
        if self.linear.len() <= last_window {
            self.linear.resize(last_window + 1, 0);
        }
        for window in first_window..=last_window {
            let cell = &mut self.linear[window];
            if *cell == 0 || rec.begin_voffset.raw() < *cell {
                *cell = rec.begin_voffset.raw();
            }
        }
    }

    fn fill_linear_gaps(&mut self) {
        let mut prev = 0u64;
        for cell in &mut self.linear {
            if *cell == 0 {
                *cell = prev;
            } else {
                prev = *cell;
            }
        }
    }
}

/// Write a `.tbi` index for bgzipped BED rows to `out`.
///
/// `names` are the reference names in the order their ids were assigned;
/// `records` must cover every data row of the BED stream.
pub fn write_tabix_index<W: Write>(
    out: W,
    names: &[String],
    records: &[TabixRecord],
) -> io::Result<()> {
    let mut refs: Vec<RefBins> = (0..names.len()).map(|_| RefBins::default()).collect();
    for rec in records {
        refs[rec.ref_id].insert(rec);
    }
    for r in &mut refs {
        r.fill_linear_gaps();
    }

    let mut writer = BgzfWriter::new(out);
    writer.write_all(b"TBI\x01")?;
    writer.write_i32::<LittleEndian>(names.len() as i32)?;
    writer.write_i32::<LittleEndian>(FORMAT_BED)?;
    writer.write_i32::<LittleEndian>(COL_SEQ)?;
    writer.write_i32::<LittleEndian>(COL_BEG)?;
    writer.write_i32::<LittleEndian>(COL_END)?;
    writer.write_i32::<LittleEndian>(META_CHAR)?;
    writer.write_i32::<LittleEndian>(0)?; // skip

    let l_nm: usize = names.iter().map(|n| n.len() + 1).sum();
    writer.write_i32::<LittleEndian>(l_nm as i32)?;
    for name in names {
        writer.write_all(name.as_bytes())?;
        writer.write_all(&[0])?;
    }

    for r in &refs {
        writer.write_i32::<LittleEndian>(r.bins.len() as i32)?;
        for (&bin, chunks) in &r.bins {
            writer.write_u32::<LittleEndian>(bin)?;
            writer.write_i32::<LittleEndian>(chunks.len() as i32)?;
            for &(beg, end) in chunks {
                writer.write_u64::<LittleEndian>(beg)?;
                writer.write_u64::<LittleEndian>(end)?;
            }
        }
        writer.write_i32::<LittleEndian>(r.linear.len() as i32)?;
        for &cell in &r.linear {
            writer.write_u64::<LittleEndian>(cell)?;
        }
    }

    writer.finish()?;
    Ok(())
}

/// Write a `.tbi` index alongside a bgzipped BED file.
pub fn write_tabix_file(
    bed_path: &Path,
    names: &[String],
    records: &[TabixRecord],
) -> io::Result<()> {
    let mut tbi = bed_path.as_os_str().to_os_string();
    tbi.push(".tbi");
    let file = std::fs::File::create(tbi)?;
    write_tabix_index(file, names, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    #[test]
    fn test_reg2bin_levels() {
        // Within one 16kb window.
        assert_eq!(reg2bin(0, 100), 4681);
        assert_eq!(reg2bin(16384, 16385), 4682);
        // Spanning two windows climbs a level.
        assert_eq!(reg2bin(16000, 17000), 585);
        // The whole range maps to the root.
        assert_eq!(reg2bin(0, 1 << 29), 0);
    }

    #[test]
    fn test_write_and_reparse() {
        let names = vec!["chr1".to_string(), "chr2".to_string()];
        let records = vec![
            TabixRecord {
                ref_id: 0,
                start: 0,
                end: 100,
                begin_voffset: VirtualOffset::new(0, 0),
                end_voffset: VirtualOffset::new(0, 20),
            },
            TabixRecord {
                ref_id: 0,
                start: 100,
                end: 40_000,
                begin_voffset: VirtualOffset::new(0, 20),
                end_voffset: VirtualOffset::new(0, 45),
            },
            TabixRecord {
                ref_id: 1,
                start: 50,
                end: 60,
                begin_voffset: VirtualOffset::new(0, 45),
                end_voffset: VirtualOffset::new(0, 70),
            },
        ];

        let mut out = Vec::new();
        write_tabix_index(&mut out, &names, &records).unwrap();

        let raw = bgzf::decompress(&out).unwrap();
        let mut r = Cursor::new(raw);

        let mut magic = [0u8; 4];
        std::io::Read::read_exact(&mut r, &mut magic).unwrap();
        assert_eq!(&magic, b"TBI\x01");
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 2); // n_ref
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), FORMAT_BED);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 1);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 2);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 3);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), META_CHAR);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 0);

        let l_nm = r.read_i32::<LittleEndian>().unwrap() as usize;
        let mut nm = vec![0u8; l_nm];
        std::io::Read::read_exact(&mut r, &mut nm).unwrap();
        assert_eq!(&nm, b"chr1\x00chr2\x00");

        // chr1: two bins (one per record: single-window and multi-window).
        let n_bin = r.read_i32::<LittleEndian>().unwrap();
        assert_eq!(n_bin, 2);
    }

    #[test]
    fn test_chunks_merge_when_adjacent() {
        let names = vec!["chr1".to_string()];
        // Two rows in the same bin, back-to-back in the output stream.
        let records = vec![
            TabixRecord {
                ref_id: 0,
                start: 0,
                end: 10,
                begin_voffset: VirtualOffset::new(0, 0),
                end_voffset: VirtualOffset::new(0, 15),
            },
            TabixRecord {
                ref_id: 0,
                start: 10,
                end: 20,
                begin_voffset: VirtualOffset::new(0, 15),
                end_voffset: VirtualOffset::new(0, 30),
            },
        ];

        let mut bins = RefBins::default();
        for rec in &records {
            bins.insert(rec);
        }
        let chunks = bins.bins.get(&4681).unwrap();
        assert_eq!(chunks, &vec![(0u64, 30u64)]);
        write_tabix_index(Vec::new(), &names, &records).unwrap();
    }
}
