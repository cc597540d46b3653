//! Partition command implementation.
//!
//! Resolves the coordinate index, loads the reference table, reduces the
//! index to volume intervals, groups them, and writes the partition BED.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bai::{self, BaiError};
use crate::bed::{self, Annotation, BedError, BedWriteOptions};
use crate::partition::{self, IntervalGrouping, PartitionError, PartitionSet};
use crate::reducer::{self, ReducerError};
use crate::references::{ReferenceError, References};
use crate::regions::{RegionError, RegionSpec};

/// Errors surfaced by command orchestration.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Bai(#[from] BaiError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Reducer(#[from] ReducerError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Bed(#[from] BedError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("either a primary file or a contig sizes file is required for reference lengths")]
    MissingReferences,
}

/// Partition command configuration.
#[derive(Debug, Clone)]
pub struct PartitionCommand {
    /// The alignment file being partitioned; optional when both an explicit
    /// index and a contig sizes file are given.
    pub primary: Option<PathBuf>,
    /// Explicit index path; defaults to `<primary>.bai`.
    pub index: Option<PathBuf>,
    /// Number of partitions to generate.
    pub partitions: usize,
    /// Grouping strategy.
    pub grouping: IntervalGrouping,
    /// Output BED path. Defaults to `<primary stem>.partitions.bed.gz`
    /// next to the working directory, or stdout without a primary file.
    pub outfile: Option<PathBuf>,
    /// Annotation columns appended to each row.
    pub annotations: Vec<Annotation>,
    /// Two-column contig sizes file, used instead of the BAM header.
    pub contig_sizes: Option<PathBuf>,
    /// Target batch volume in bytes; estimated from the index when absent.
    pub batch_volume: Option<u64>,
    /// Row name pattern with `{group}` and `{row}` placeholders.
    pub name_pattern: String,
}

impl Default for PartitionCommand {
    fn default() -> Self {
        Self {
            primary: None,
            index: None,
            partitions: 100,
            grouping: IntervalGrouping::Consecutive,
            outfile: None,
            annotations: Vec::new(),
            contig_sizes: None,
            batch_volume: None,
            name_pattern: "Partition_{group}".to_string(),
        }
    }
}

/// Statistics reported after a partition run.
#[derive(Debug, Clone)]
pub struct PartitionSummary {
    pub references: usize,
    pub rows: usize,
    pub groups: usize,
    pub total_volume: u64,
    pub outfile: Option<PathBuf>,
}

impl std::fmt::Display for PartitionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} references, {} rows in {} groups, {} bytes total",
            self.references, self.rows, self.groups, self.total_volume
        )
    }
}

impl PartitionCommand {
    /// Run the full pipeline and write the partition BED.
    pub fn run(&self, regions: &RegionSpec) -> Result<PartitionSummary, CommandError> {
        let references = self.load_references()?;
        let set = self.compute(&references, regions)?;
        let (outfile, bgzip) = self.resolve_outfile();

        let opts = BedWriteOptions {
            name_pattern: self.name_pattern.clone(),
            annotations: self.annotations.clone(),
            bgzip,
            tabix: bgzip,
        };
        match &outfile {
            Some(path) => bed::write_partition_bed_file(path, &set, &opts)?,
            None => bed::write_partition_bed(io::stdout().lock(), &set, &opts)?,
        }

        Ok(PartitionSummary {
            references: references.len(),
            rows: set.num_rows(),
            groups: set.num_groups(),
            total_volume: set.total_volume(),
            outfile,
        })
    }

    /// Compute the partition set without writing it.
    pub fn compute(
        &self,
        references: &References,
        regions: &RegionSpec,
    ) -> Result<PartitionSet, CommandError> {
        let index_file = bai::resolve_index_file(self.primary.as_deref(), self.index.as_deref())?;
        let coord_index = bai::read_bai(&index_file)?;

        let regions = if regions.is_empty() {
            None
        } else {
            Some(regions.build(references, None)?)
        };

        let ivls = reducer::iter_index_intervals(&coord_index, references, self.batch_volume)?;
        let set =
            partition::group_intervals(ivls, self.partitions, self.grouping, regions.as_ref())?;
        Ok(set)
    }

    fn load_references(&self) -> Result<References, CommandError> {
        match &self.contig_sizes {
            Some(path) => Ok(References::from_file(path)?),
            None => {
                let primary = self
                    .primary
                    .as_ref()
                    .ok_or(CommandError::MissingReferences)?;
                Ok(References::from_bam(primary)?)
            }
        }
    }

    fn resolve_outfile(&self) -> (Option<PathBuf>, bool) {
        match &self.outfile {
            Some(path) => (Some(path.clone()), has_gz_extension(path)),
            None => match &self.primary {
                Some(primary) => {
                    let stem = primary
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "partitions".to_string());
                    (Some(PathBuf::from(format!("{}.partitions.bed.gz", stem))), true)
                }
                None => (None, false),
            },
        }
    }
}

fn has_gz_extension(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}
