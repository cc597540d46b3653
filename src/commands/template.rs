//! Command templating from a partition BED.
//!
//! Expands a `{placeholder}` template once per partition group (or per
//! interval), producing one shell command per line. Useful for driving a
//! scatter step: `partix commands -i sample.bam -p partitions.bed
//! --template 'count-reads {primary} {regions} > counts.{rank}.txt'`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::bed::{self, BedInterval};
use crate::commands::partition::CommandError;

/// Template command configuration.
#[derive(Debug, Clone, Default)]
pub struct TemplateCommand {
    /// Template string with `{primary}`, `{rank}`, `{name}`, `{region}`,
    /// and `{regions}` placeholders.
    pub template: String,
    /// The primary file, substituted for `{primary}`.
    pub primary: Option<PathBuf>,
    /// Partition BED file (such as the `partition` command's output).
    pub partitions_bed: PathBuf,
    /// Expand per interval instead of per partition group.
    pub per_interval: bool,
    /// Treat rows with the same name as already consecutive.
    pub assume_collated: bool,
    /// Output file; stdout when absent.
    pub outfile: Option<PathBuf>,
}

impl TemplateCommand {
    pub fn run(&self) -> Result<(), CommandError> {
        match &self.outfile {
            Some(path) => self.write(BufWriter::new(File::create(path)?)),
            None => self.write(io::stdout().lock()),
        }
    }

    fn write<W: Write>(&self, mut out: W) -> Result<(), CommandError> {
        let primary = self
            .primary
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.per_interval {
            for (rank, record) in bed::read_records(&self.partitions_bed)?.iter().enumerate() {
                writeln!(out, "{}", self.expand(&primary, rank, std::slice::from_ref(record)))?;
            }
        } else {
            let groups = bed::read_record_groups(&self.partitions_bed, self.assume_collated)?;
            for (rank, group) in groups.iter().enumerate() {
                writeln!(out, "{}", self.expand(&primary, rank, group))?;
            }
        }
        Ok(())
    }

    fn expand(&self, primary: &str, rank: usize, records: &[BedInterval]) -> String {
        let name = records
            .first()
            .and_then(|r| r.name.as_deref())
            .unwrap_or(".");
        let regions: Vec<String> = records.iter().map(|r| r.interval.region()).collect();

        self.template
            .replace("{primary}", primary)
            .replace("{rank}", &rank.to_string())
            .replace("{name}", name)
            .replace("{region}", regions.first().map(String::as_str).unwrap_or("."))
            .replace("{regions}", &regions.join(" "))
    }
}
