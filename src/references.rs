//! Reference sequence table.
//!
//! Maps contig names to lengths and dense zero-based ids. Loaded either
//! from a two-column tab-delimited sizes file (`name\tlength`) or from the
//! header of a BAM file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::bgzf;

/// Errors loading or resolving reference tables.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid BAM file: {0}")]
    InvalidBam(String),
}

/// An ordered, immutable table of `(name, length)` reference sequences.
///
/// The position of a reference in the table is its dense id, matching the
/// reference numbering used by coordinate indexes.
#[derive(Debug, Clone, Default)]
pub struct References {
    refs: Vec<(String, u64)>,
    ids: FxHashMap<String, usize>,
}

impl References {
    /// Build a table from `(name, length)` pairs. A repeated name updates
    /// the stored length and keeps the first occurrence's position.
    pub fn new<I>(references: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut table = Self::default();
        for (name, length) in references {
            table.insert(name, length);
        }
        table
    }

    fn insert(&mut self, name: String, length: u64) {
        match self.ids.get(&name) {
            Some(&id) => self.refs[id].1 = length,
            None => {
                self.ids.insert(name.clone(), self.refs.len());
                self.refs.push((name, length));
            }
        }
    }

    /// Load references from a two-column tab-delimited file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut table = Self::default();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default();
            let length_str = fields.next().ok_or_else(|| ReferenceError::Parse {
                line: line_num + 1,
                message: "sizes file requires two columns: name and length".to_string(),
            })?;
            let length: u64 = length_str.parse().map_err(|_| ReferenceError::Parse {
                line: line_num + 1,
                message: format!("invalid reference length: {}", length_str),
            })?;

            table.insert(name.to_string(), length);
        }

        Ok(table)
    }

    /// Load references from the header of a BAM file.
    ///
    /// Only the header is decoded; no alignment records are read.
    pub fn from_bam<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceError> {
        let mut reader = bgzf::reader(path.as_ref())?;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != b"BAM\x01" {
            return Err(ReferenceError::InvalidBam(format!(
                "bad magic {:?} in {}",
                magic,
                path.as_ref().display()
            )));
        }

        let l_text = reader.read_i32::<LittleEndian>()?;
        if l_text < 0 {
            return Err(ReferenceError::InvalidBam("negative header length".into()));
        }
        io::copy(&mut (&mut reader).take(l_text as u64), &mut io::sink())?;

        let n_ref = reader.read_i32::<LittleEndian>()?;
        if n_ref < 0 {
            return Err(ReferenceError::InvalidBam("negative reference count".into()));
        }

        let mut table = Self::default();
        for _ in 0..n_ref {
            let l_name = reader.read_i32::<LittleEndian>()?;
            if l_name <= 0 {
                return Err(ReferenceError::InvalidBam("empty reference name".into()));
            }
            let mut name_buf = vec![0u8; l_name as usize];
            reader.read_exact(&mut name_buf)?;
            // NUL-terminated in the BAM encoding.
            if name_buf.last() == Some(&0) {
                name_buf.pop();
            }
            let name = String::from_utf8(name_buf)
                .map_err(|_| ReferenceError::InvalidBam("non-UTF8 reference name".into()))?;
            let l_ref = reader.read_i32::<LittleEndian>()?;
            table.insert(name, l_ref.max(0) as u64);
        }

        Ok(table)
    }

    /// Length of the named reference, if present.
    #[inline]
    pub fn length(&self, name: &str) -> Option<u64> {
        self.ids.get(name).map(|&id| self.refs[id].1)
    }

    /// Dense id of the named reference, if present.
    #[inline]
    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    /// Name of the reference with the given id, if in range.
    #[inline]
    pub fn name(&self, id: usize) -> Option<&str> {
        self.refs.get(id).map(|(name, _)| name.as_str())
    }

    /// `(name, length)` of the reference with the given id, if in range.
    #[inline]
    pub fn get(&self, id: usize) -> Option<(&str, u64)> {
        self.refs.get(id).map(|(name, len)| (name.as_str(), *len))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Reference names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().map(|(name, _)| name.as_str())
    }

    /// Reference lengths in table order.
    pub fn lengths(&self) -> impl Iterator<Item = u64> + '_ {
        self.refs.iter().map(|(_, len)| *len)
    }

    /// `(name, length)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.refs.iter().map(|(name, len)| (name.as_str(), *len))
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
