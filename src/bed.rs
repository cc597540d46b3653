//! BED file reading and partition BED output.
//!
//! The reader streams BED3+ records, skipping comments and track lines.
//! The writer emits six base columns per partition row (`contig`, `start`,
//! `end`, `name`, `value`, `strand`) plus optional annotation columns, as
//! plain text or bgzipped with a tabix index.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use memchr::memchr;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::bgzf::BgzfWriter;
use crate::interval::GenomeInterval;
use crate::partition::PartitionSet;
use crate::tabix::{self, TabixRecord};
use crate::volume::VolumeInterval;

/// Errors that can occur during BED reading or writing.
#[derive(Error, Debug)]
pub enum BedError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, BedError>;

/// A BED record: the interval plus any of the optional columns present.
#[derive(Debug, Clone, PartialEq)]
pub struct BedInterval {
    pub interval: GenomeInterval,
    pub name: Option<String>,
    pub value: Option<String>,
    pub strand: Option<String>,
    pub other: Vec<String>,
}

impl BedInterval {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            interval: GenomeInterval::new(chrom, start, end),
            name: None,
            value: None,
            strand: None,
            other: Vec::new(),
        }
    }

    #[inline]
    pub fn contig(&self) -> &str {
        &self.interval.contig
    }

    #[inline]
    pub fn start(&self) -> u64 {
        self.interval.start
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.interval.end
    }
}

/// Fast u64 parsing over raw bytes; `None` on empty or non-digit input.
#[inline]
fn parse_u64_bytes(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u64)?;
    }
    Some(n)
}

/// A streaming BED file reader.
pub struct BedReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: String,
}

impl BedReader<File> {
    /// Open a BED file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> BedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: String::with_capacity(1024),
        }
    }

    /// Read the next record, or `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<BedInterval>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buffer.trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("track")
                || line.starts_with("browser")
            {
                continue;
            }

            let parsed = self.parse_line(line)?;
            return Ok(Some(parsed));
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> BedError {
        BedError::Parse {
            line: self.line_number,
            message: message.into(),
        }
    }

    fn parse_line(&self, line: &str) -> Result<BedInterval> {
        let bytes = line.as_bytes();
        let tab1 = memchr(b'\t', bytes)
            .ok_or_else(|| self.parse_error("expected at least 3 tab-delimited fields"))?;
        let rest = &bytes[tab1 + 1..];
        let tab2 = memchr(b'\t', rest)
            .ok_or_else(|| self.parse_error("expected at least 3 tab-delimited fields"))?;
        let end_field = &rest[tab2 + 1..];
        let end_len = memchr(b'\t', end_field).unwrap_or(end_field.len());

        let chrom = &line[..tab1];
        let start = parse_u64_bytes(&rest[..tab2])
            .ok_or_else(|| self.parse_error("invalid start position"))?;
        let end = parse_u64_bytes(&end_field[..end_len])
            .ok_or_else(|| self.parse_error("invalid end position"))?;

        if end <= start {
            return Err(self.parse_error(format!("start ({}) must be < end ({})", start, end)));
        }

        let mut record = BedInterval::new(chrom, start, end);

        let mut extra = line.split('\t').skip(3);
        if let Some(name) = extra.next() {
            record.name = Some(name.to_string());
        }
        if let Some(value) = extra.next() {
            record.value = Some(value.to_string());
        }
        if let Some(strand) = extra.next() {
            record.strand = Some(strand.to_string());
        }
        record.other = extra.map(str::to_string).collect();

        Ok(record)
    }

    /// Iterator over records.
    pub fn records(self) -> Records<R> {
        Records { reader: self }
    }
}

/// Iterator adapter over [`BedReader`].
pub struct Records<R: Read> {
    reader: BedReader<R>,
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<BedInterval>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

/// Read the plain intervals of a BED file.
pub fn read_intervals<P: AsRef<Path>>(path: P) -> Result<Vec<GenomeInterval>> {
    BedReader::from_path(path)?
        .records()
        .map(|r| r.map(|rec| rec.interval))
        .collect()
}

/// Read full BED records.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<BedInterval>> {
    BedReader::from_path(path)?.records().collect()
}

/// Group consecutive records sharing a name (column 4). Records are sorted
/// by name first unless `assume_collated` is set.
pub fn read_record_groups<P: AsRef<Path>>(
    path: P,
    assume_collated: bool,
) -> Result<Vec<Vec<BedInterval>>> {
    let mut records = read_records(path)?;
    if !assume_collated {
        records.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut groups: Vec<Vec<BedInterval>> = Vec::new();
    for record in records {
        match groups.last_mut() {
            Some(group) if group.last().map(|r| &r.name) == Some(&record.name) => {
                group.push(record)
            }
            _ => groups.push(vec![record]),
        }
    }
    Ok(groups)
}

/// An annotation column derived from a partition interval's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Comma-separated lengths of the child intervals.
    ChildLengths,
    /// Comma-separated volumes of the child intervals.
    ChildVolumes,
}

impl Annotation {
    pub fn extract(&self, ivl: &VolumeInterval) -> String {
        if ivl.children.is_empty() {
            return ".".to_string();
        }
        let values: Vec<String> = match self {
            Annotation::ChildLengths => ivl.children.iter().map(|c| c.len().to_string()).collect(),
            Annotation::ChildVolumes => {
                ivl.children.iter().map(|c| c.volume.to_string()).collect()
            }
        };
        values.join(",")
    }
}

impl FromStr for Annotation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "child_lengths" => Ok(Annotation::ChildLengths),
            "child_volumes" => Ok(Annotation::ChildVolumes),
            other => Err(format!(
                "unknown annotation {:?} (expected child_lengths or child_volumes)",
                other
            )),
        }
    }
}

/// Options for partition BED output.
#[derive(Debug, Clone)]
pub struct BedWriteOptions {
    /// Row name pattern; `{group}` and `{row}` expand to 1-based indexes.
    pub name_pattern: String,
    /// Extra columns appended after the six BED columns, in order.
    pub annotations: Vec<Annotation>,
    /// Bgzip the output.
    pub bgzip: bool,
    /// Tabix-index the output (requires `bgzip`).
    pub tabix: bool,
}

impl Default for BedWriteOptions {
    fn default() -> Self {
        Self {
            name_pattern: "Partition_{group}".to_string(),
            annotations: Vec::new(),
            bgzip: false,
            tabix: false,
        }
    }
}

fn format_row(ivl: &VolumeInterval, group: usize, row: usize, opts: &BedWriteOptions) -> Vec<u8> {
    let mut group_buf = itoa::Buffer::new();
    let mut row_buf = itoa::Buffer::new();
    let name = opts
        .name_pattern
        .replace("{group}", group_buf.format(group))
        .replace("{row}", row_buf.format(row));

    let mut num_buf = itoa::Buffer::new();
    let mut line = Vec::with_capacity(64);
    line.extend_from_slice(ivl.contig().as_bytes());
    line.push(b'\t');
    line.extend_from_slice(num_buf.format(ivl.start()).as_bytes());
    line.push(b'\t');
    line.extend_from_slice(num_buf.format(ivl.end()).as_bytes());
    line.push(b'\t');
    line.extend_from_slice(name.as_bytes());
    line.push(b'\t');
    line.extend_from_slice(num_buf.format(ivl.volume).as_bytes());
    line.extend_from_slice(b"\t.");
    for annotation in &opts.annotations {
        line.push(b'\t');
        line.extend_from_slice(annotation.extract(ivl).as_bytes());
    }
    line.push(b'\n');
    line
}

/// Write a partition set as plain-text BED rows.
pub fn write_partition_bed<W: Write>(
    out: W,
    partitions: &PartitionSet,
    opts: &BedWriteOptions,
) -> Result<()> {
    let mut writer = BufWriter::new(out);
    for (row, (group, ivl)) in partitions.rows().enumerate() {
        writer.write_all(&format_row(ivl, group, row + 1, opts))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a partition set to `path`, bgzipping and tabix-indexing per the
/// options.
///
/// The output stream is scoped to this call: on success a bgzipped file is
/// finalized (EOF block) and indexed; on error the partial file is left
/// unindexed.
pub fn write_partition_bed_file(
    path: &Path,
    partitions: &PartitionSet,
    opts: &BedWriteOptions,
) -> Result<()> {
    if !opts.bgzip {
        return write_partition_bed(File::create(path)?, partitions, opts);
    }

    let mut writer = BgzfWriter::new(BufWriter::new(File::create(path)?));

    let mut names: Vec<String> = Vec::new();
    let mut ids: FxHashMap<String, usize> = FxHashMap::default();
    let mut records: Vec<TabixRecord> = Vec::new();

    let rows: io::Result<()> = (|| {
        for (row, (group, ivl)) in partitions.rows().enumerate() {
            let begin_voffset = writer.virtual_offset();
            writer.write_all(&format_row(ivl, group, row + 1, opts))?;

            let next_id = names.len();
            let ref_id = *ids.entry(ivl.contig().to_string()).or_insert_with(|| {
                names.push(ivl.contig().to_string());
                next_id
            });
            records.push(TabixRecord {
                ref_id,
                start: ivl.start(),
                end: ivl.end(),
                begin_voffset,
                end_voffset: writer.virtual_offset(),
            });
        }
        Ok(())
    })();

    // The stream is finished (pending block flushed, EOF marker written)
    // whether or not the rows all made it; indexing only follows a
    // complete write.
    let finished = writer.finish();
    rows?;
    finished?;

    if opts.tabix {
        tabix::write_tabix_file(path, &names, &records)?;
    }
    Ok(())
}
