//! PARTIX: index-driven genomic partitioning.
//!
//! Usage: partix <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use partix::bed::Annotation;
use partix::commands::{CommandError, PartitionCommand, TemplateCommand};
use partix::partition::IntervalGrouping;
use partix::regions::{parse_region, Region, RegionSpec};

#[derive(Parser)]
#[command(name = "partix")]
#[command(version)]
#[command(
    about = "PARTIX: index-driven genomic partitioning - equal-volume genome partitions from alignment file indexes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the genome into equal-volume groups from an alignment index
    Partition {
        /// Alignment file (BAM) to partition
        #[arg(short = 'i', long)]
        primary: Option<PathBuf>,

        /// Coordinate index file (defaults to <primary>.bai)
        #[arg(short = 'I', long)]
        index: Option<PathBuf>,

        /// Number of partitions to generate
        #[arg(short = 'n', long, default_value_t = 100)]
        partitions: usize,

        /// Grouping strategy: none, consecutive, round-robin, or lpt
        #[arg(short = 'g', long, default_value = "consecutive")]
        grouping: String,

        /// Output BED file; bgzipped and tabix-indexed when it ends with
        /// .gz. Defaults to <primary stem>.partitions.bed.gz, or stdout
        /// when no primary file is given
        #[arg(short = 'o', long)]
        outfile: Option<PathBuf>,

        /// Annotation column(s) to append: child_lengths, child_volumes
        #[arg(short = 'a', long = "annotation")]
        annotations: Vec<String>,

        /// Two-column contig sizes file (name<TAB>length); required when
        /// the primary file is not given
        #[arg(short = 'z', long)]
        contig_sizes: Option<PathBuf>,

        /// Target batch volume in bytes (default: estimated from the index)
        #[arg(long)]
        batch_volume: Option<u64>,

        /// Row name pattern with {group} and {row} placeholders
        #[arg(long, default_value = "Partition_{group}")]
        name_pattern: String,

        /// Region(s) to include, as contig[:start[-end]]
        #[arg(short = 'r', long = "region")]
        regions: Vec<String>,

        /// Region(s) to exclude
        #[arg(short = 'R', long = "exclude-region")]
        exclude_regions: Vec<String>,

        /// Contig pattern(s) to include: a range like chr1-22 or a regex
        #[arg(short = 'c', long = "contig")]
        contigs: Vec<String>,

        /// Contig pattern(s) to exclude
        #[arg(short = 'C', long = "exclude-contig")]
        exclude_contigs: Vec<String>,

        /// BED file of target regions to include
        #[arg(short = 't', long)]
        targets: Option<PathBuf>,

        /// BED file of target regions to exclude
        #[arg(short = 'T', long)]
        exclude_targets: Option<PathBuf>,

        /// Print partitioning statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Generate one command per partition from a template
    Commands {
        /// Template with {primary}, {rank}, {name}, {region}, and
        /// {regions} placeholders
        #[arg(long)]
        template: String,

        /// The primary file, substituted for {primary}
        #[arg(short = 'i', long)]
        primary: Option<PathBuf>,

        /// Partition BED file (such as the partition command's output)
        #[arg(short = 'p', long)]
        partitions_bed: PathBuf,

        /// Expand the template once per interval instead of per partition
        #[arg(long)]
        per_interval: bool,

        /// Assume rows with the same name are consecutive
        #[arg(long)]
        assume_collated: bool,

        /// Output file with one command per line; stdout when omitted
        #[arg(short = 'o', long)]
        outfile: Option<PathBuf>,
    },
}

fn parse_all_regions(inputs: &[String]) -> Result<Vec<Region>, String> {
    inputs
        .iter()
        .map(|s| parse_region(s).map_err(|e| e.to_string()))
        .collect()
}

fn parse_annotations(inputs: &[String]) -> Result<Vec<Annotation>, String> {
    inputs.iter().map(|s| s.parse()).collect()
}

fn run_partition(
    cmd: PartitionCommand,
    regions: RegionSpec,
    stats: bool,
) -> Result<(), CommandError> {
    let summary = cmd.run(&regions)?;
    if stats {
        eprintln!("Partition stats: {}", summary);
        if let Some(path) = &summary.outfile {
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Commands::Partition {
            primary,
            index,
            partitions,
            grouping,
            outfile,
            annotations,
            contig_sizes,
            batch_volume,
            name_pattern,
            regions,
            exclude_regions,
            contigs,
            exclude_contigs,
            targets,
            exclude_targets,
            stats,
        } => {
            let run = || -> Result<(), String> {
                let grouping: IntervalGrouping = grouping.parse()?;
                let region_spec = RegionSpec {
                    regions: parse_all_regions(&regions)?,
                    exclude_regions: parse_all_regions(&exclude_regions)?,
                    contigs,
                    exclude_contigs,
                    targets,
                    exclude_targets,
                };
                let cmd = PartitionCommand {
                    primary,
                    index,
                    partitions,
                    grouping,
                    outfile,
                    annotations: parse_annotations(&annotations)?,
                    contig_sizes,
                    batch_volume,
                    name_pattern,
                };
                run_partition(cmd, region_spec, stats).map_err(|e| e.to_string())
            };
            run()
        }

        Commands::Commands {
            template,
            primary,
            partitions_bed,
            per_interval,
            assume_collated,
            outfile,
        } => {
            let cmd = TemplateCommand {
                template,
                primary,
                partitions_bed,
                per_interval,
                assume_collated,
                outfile,
            };
            cmd.run().map_err(|e| e.to_string())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
