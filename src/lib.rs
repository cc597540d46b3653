//! PARTIX: index-driven genomic partitioning.
//!
//! This library estimates the compressed byte footprint ("volume") of each
//! small genomic region of an indexed alignment file by reading only its
//! coordinate index, then partitions the genome into groups of
//! approximately equal total volume. Each partition can be handed to a
//! downstream worker as a BED file of disjoint regions carrying comparable
//! work.
//!
//! # Features
//!
//! - **Index-only**: volumes come from BGZF offset deltas in the `.bai`
//!   linear index; no alignment records are ever read
//! - **Region filtering**: include/exclude sets from region strings,
//!   contig patterns, and BED target files
//! - **BED output**: plain text or bgzipped with a tabix index
//!
//! # Example
//!
//! ```rust,no_run
//! use partix::commands::PartitionCommand;
//! use partix::regions::RegionSpec;
//!
//! let cmd = PartitionCommand {
//!     primary: Some("sample.bam".into()),
//!     partitions: 16,
//!     ..Default::default()
//! };
//! let summary = cmd.run(&RegionSpec::default()).unwrap();
//! eprintln!("{}", summary);
//! ```

pub mod bai;
pub mod bed;
pub mod bgzf;
pub mod commands;
pub mod index;
pub mod interval;
pub mod partition;
pub mod reducer;
pub mod references;
pub mod regions;
pub mod tabix;
pub mod volume;

// Re-export commonly used types
pub use index::IntervalIndex;
pub use interval::{GenomeInterval, Side};
pub use references::References;
pub use regions::{parse_region, RegionSpec, Regions};
pub use volume::VolumeInterval;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bed::{read_intervals, read_records, BedReader};
    pub use crate::commands::{PartitionCommand, TemplateCommand};
    pub use crate::index::IntervalIndex;
    pub use crate::interval::{GenomeInterval, Side};
    pub use crate::partition::{group_intervals, IntervalGrouping, PartitionSet};
    pub use crate::references::References;
    pub use crate::regions::{parse_region, RegionSpec, Regions};
    pub use crate::volume::VolumeInterval;
}
