//! End-to-end partition tests over a synthetic BAI index.
//!
//! The index is laid out so every non-empty tile advances the compressed
//! offset by exactly 100 bytes: the median block size estimate is then 100
//! and every tile's volume is exactly one uncompressed BGZF block (65536),
//! which makes the expected batches and groups fully predictable.

use std::io::Write;
use std::path::Path;

use partix::bed::Annotation;
use partix::bgzf;
use partix::commands::PartitionCommand;
use partix::partition::IntervalGrouping;
use partix::regions::RegionSpec;

const TILE: u64 = 1 << 14;
const BLOCK: u64 = 1 << 16;

/// Serialize a minimal BAI: per reference an empty binning section and the
/// given linear-index virtual offsets (0 = empty tile).
fn write_bai(path: &Path, refs: &[Vec<u64>]) {
    let mut out = Vec::new();
    out.extend_from_slice(b"BAI\x01");
    out.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for tiles in refs {
        out.extend_from_slice(&0i32.to_le_bytes()); // n_bin
        out.extend_from_slice(&(tiles.len() as i32).to_le_bytes());
        for &t in tiles {
            out.extend_from_slice(&t.to_le_bytes());
        }
    }
    std::fs::write(path, out).unwrap();
}

fn write_sizes(path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "chr1\t100000").unwrap();
    writeln!(file, "chr2\t40000").unwrap();
}

/// chr1: six non-empty tiles; chr2: two. Compressed offsets step by 100.
fn default_index(path: &Path) {
    let voffset = |c: u64| c << 16;
    write_bai(
        path,
        &[
            (1..=6).map(|i| voffset(i * 100)).collect(),
            (7..=8).map(|i| voffset(i * 100)).collect(),
        ],
    );
}

fn parse_rows(text: &str) -> Vec<(String, u64, u64, String, u64)> {
    text.lines()
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            (
                fields[0].to_string(),
                fields[1].parse().unwrap(),
                fields[2].parse().unwrap(),
                fields[3].to_string(),
                fields[4].parse().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_partition_consecutive_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let bai = dir.path().join("sample.bam.bai");
    let sizes = dir.path().join("sizes.tsv");
    let out = dir.path().join("partitions.bed");
    default_index(&bai);
    write_sizes(&sizes);

    let cmd = PartitionCommand {
        index: Some(bai),
        contig_sizes: Some(sizes),
        partitions: 3,
        grouping: IntervalGrouping::Consecutive,
        outfile: Some(out.clone()),
        ..Default::default()
    };
    let summary = cmd.run(&RegionSpec::default()).unwrap();

    assert_eq!(summary.groups, 3);
    assert_eq!(summary.rows, 4);

    let rows = parse_rows(&std::fs::read_to_string(&out).unwrap());
    assert_eq!(
        rows,
        vec![
            ("chr1".to_string(), 0, 3 * TILE, "Partition_1".to_string(), 3 * BLOCK),
            ("chr1".to_string(), 3 * TILE, 5 * TILE, "Partition_2".to_string(), 2 * BLOCK),
            ("chr1".to_string(), 5 * TILE, 6 * TILE, "Partition_3".to_string(), BLOCK),
            ("chr2".to_string(), 0, 2 * TILE, "Partition_3".to_string(), BLOCK),
        ]
    );

    // Rows are disjoint across all groups.
    for pair in rows.windows(2) {
        assert!(pair[0].0 != pair[1].0 || pair[0].2 <= pair[1].1);
    }
}

#[test]
fn test_partition_respects_region_filter() {
    let dir = tempfile::tempdir().unwrap();
    let bai = dir.path().join("sample.bam.bai");
    let sizes = dir.path().join("sizes.tsv");
    let out = dir.path().join("partitions.bed");
    default_index(&bai);
    write_sizes(&sizes);

    let cmd = PartitionCommand {
        index: Some(bai),
        contig_sizes: Some(sizes),
        partitions: 2,
        grouping: IntervalGrouping::Consecutive,
        outfile: Some(out.clone()),
        ..Default::default()
    };
    let regions = RegionSpec {
        exclude_contigs: vec!["chr2".to_string()],
        ..Default::default()
    };
    cmd.run(&regions).unwrap();

    let rows = parse_rows(&std::fs::read_to_string(&out).unwrap());
    assert!(rows.iter().all(|r| r.0 == "chr1"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, 0);
    assert_eq!(rows[1].2, 6 * TILE);
}

#[test]
fn test_partition_bgzip_output_with_tabix() {
    let dir = tempfile::tempdir().unwrap();
    let bai = dir.path().join("sample.bam.bai");
    let sizes = dir.path().join("sizes.tsv");
    let plain_out = dir.path().join("plain.bed");
    let gz_out = dir.path().join("partitions.bed.gz");
    default_index(&bai);
    write_sizes(&sizes);

    let cmd = PartitionCommand {
        index: Some(bai.clone()),
        contig_sizes: Some(sizes.clone()),
        partitions: 3,
        outfile: Some(plain_out.clone()),
        ..Default::default()
    };
    cmd.run(&RegionSpec::default()).unwrap();

    let cmd = PartitionCommand {
        index: Some(bai),
        contig_sizes: Some(sizes),
        partitions: 3,
        outfile: Some(gz_out.clone()),
        ..Default::default()
    };
    cmd.run(&RegionSpec::default()).unwrap();

    let plain = std::fs::read_to_string(&plain_out).unwrap();
    let unzipped = bgzf::decompress(&std::fs::read(&gz_out).unwrap()).unwrap();
    assert_eq!(plain.as_bytes(), &unzipped[..]);

    let tbi = dir.path().join("partitions.bed.gz.tbi");
    assert!(tbi.exists());
    let tbi_raw = bgzf::decompress(&std::fs::read(&tbi).unwrap()).unwrap();
    assert_eq!(&tbi_raw[0..4], b"TBI\x01");
}

#[test]
fn test_partition_annotations_column() {
    let dir = tempfile::tempdir().unwrap();
    let bai = dir.path().join("sample.bam.bai");
    let sizes = dir.path().join("sizes.tsv");
    let out = dir.path().join("partitions.bed");
    default_index(&bai);
    write_sizes(&sizes);

    let cmd = PartitionCommand {
        index: Some(bai),
        contig_sizes: Some(sizes),
        partitions: 3,
        annotations: vec![Annotation::ChildVolumes],
        outfile: Some(out.clone()),
        ..Default::default()
    };
    cmd.run(&RegionSpec::default()).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let columns: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();

    // The first group merges three one-block tiles.
    assert_eq!(columns[0][6], format!("{0},{0},{0}", BLOCK));
    // The chr2 group was never merged, so it carries no children.
    assert_eq!(columns[3][6], ".");
}

#[test]
fn test_partition_round_robin_groups() {
    let dir = tempfile::tempdir().unwrap();
    let bai = dir.path().join("sample.bam.bai");
    let sizes = dir.path().join("sizes.tsv");
    let out = dir.path().join("partitions.bed");
    default_index(&bai);
    write_sizes(&sizes);

    let cmd = PartitionCommand {
        index: Some(bai),
        contig_sizes: Some(sizes),
        partitions: 3,
        grouping: IntervalGrouping::RoundRobin,
        outfile: Some(out.clone()),
        ..Default::default()
    };
    let summary = cmd.run(&RegionSpec::default()).unwrap();

    // Seven one-batch pieces dealt to three groups: sizes 3, 2, 2.
    assert_eq!(summary.groups, 3);
    assert_eq!(summary.rows, 7);

    let rows = parse_rows(&std::fs::read_to_string(&out).unwrap());
    let group_sizes: Vec<usize> = (1..=3)
        .map(|g| {
            let name = format!("Partition_{}", g);
            rows.iter().filter(|r| r.3 == name).count()
        })
        .collect();
    assert_eq!(group_sizes, vec![3, 2, 2]);
}
