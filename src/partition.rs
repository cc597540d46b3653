//! Grouping of volume intervals into equal-volume partitions.

use std::str::FromStr;

use crate::interval::IntervalError;
use crate::regions::{RegionError, Regions};
use crate::volume::VolumeInterval;

use thiserror::Error;

/// Errors assigning intervals to partitions.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Interval(#[from] IntervalError),
}

/// Strategy for assigning interval pieces to partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalGrouping {
    /// Do not group; return the flat piece list.
    None,
    /// Equal counts of consecutive pieces per partition, merged per contig.
    #[default]
    Consecutive,
    /// Deal pieces to partitions in rotation.
    RoundRobin,
    /// Longest-processing-time bin packing: largest pieces first, each to
    /// the currently lightest partition.
    Lpt,
}

impl FromStr for IntervalGrouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(IntervalGrouping::None),
            "consecutive" => Ok(IntervalGrouping::Consecutive),
            "round-robin" | "round_robin" => Ok(IntervalGrouping::RoundRobin),
            "lpt" => Ok(IntervalGrouping::Lpt),
            other => Err(format!(
                "unknown grouping {:?} (expected none, consecutive, round-robin, or lpt)",
                other
            )),
        }
    }
}

/// The partitioner's output: a flat piece list (`None` grouping) or one
/// interval list per partition.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionSet {
    Flat(Vec<VolumeInterval>),
    Grouped(Vec<Vec<VolumeInterval>>),
}

impl PartitionSet {
    /// Rows in output order as `(1-based group index, interval)` pairs.
    /// Each flat piece counts as its own group.
    pub fn rows(&self) -> Box<dyn Iterator<Item = (usize, &VolumeInterval)> + '_> {
        match self {
            PartitionSet::Flat(ivls) => {
                Box::new(ivls.iter().enumerate().map(|(i, v)| (i + 1, v)))
            }
            PartitionSet::Grouped(groups) => Box::new(
                groups
                    .iter()
                    .enumerate()
                    .flat_map(|(g, ivls)| ivls.iter().map(move |v| (g + 1, v))),
            ),
        }
    }

    /// Total number of BED rows this set will emit.
    pub fn num_rows(&self) -> usize {
        match self {
            PartitionSet::Flat(ivls) => ivls.len(),
            PartitionSet::Grouped(groups) => groups.iter().map(Vec::len).sum(),
        }
    }

    /// Number of partitions.
    pub fn num_groups(&self) -> usize {
        match self {
            PartitionSet::Flat(ivls) => ivls.len(),
            PartitionSet::Grouped(groups) => groups.len(),
        }
    }

    /// Sum of all interval volumes.
    pub fn total_volume(&self) -> u64 {
        self.rows().map(|(_, v)| v.volume).sum()
    }
}

/// Assign reducer output to `num_groups` partitions of approximately equal
/// volume.
///
/// An optional region filter restricts the intervals first. The input is
/// then split in half repeatedly until there are at least `num_groups`
/// pieces, and the pieces are assigned per the strategy.
pub fn group_intervals(
    intervals: Vec<VolumeInterval>,
    num_groups: usize,
    grouping: IntervalGrouping,
    regions: Option<&Regions>,
) -> Result<PartitionSet, PartitionError> {
    let num_groups = num_groups.max(1);

    let mut ivls = match regions {
        Some(regions) => regions.intersect(intervals)?,
        None => intervals,
    };

    while !ivls.is_empty() && ivls.len() < num_groups {
        ivls = ivls.iter().flat_map(|ivl| ivl.split(2)).collect();
    }

    match grouping {
        IntervalGrouping::None => Ok(PartitionSet::Flat(ivls)),
        IntervalGrouping::RoundRobin => {
            let mut groups: Vec<Vec<VolumeInterval>> = vec![Vec::new(); num_groups];
            for (i, ivl) in ivls.into_iter().enumerate() {
                groups[i % num_groups].push(ivl);
            }
            Ok(PartitionSet::Grouped(groups))
        }
        IntervalGrouping::Consecutive => Ok(PartitionSet::Grouped(group_consecutive(
            ivls, num_groups,
        )?)),
        IntervalGrouping::Lpt => Ok(PartitionSet::Grouped(group_lpt(ivls, num_groups))),
    }
}

/// Blockwise grouping: the first `remainder` partitions take one extra
/// piece; same-contig neighbors within a partition merge into a single
/// interval so each partition emits the fewest possible BED rows.
fn group_consecutive(
    ivls: Vec<VolumeInterval>,
    num_groups: usize,
) -> Result<Vec<Vec<VolumeInterval>>, PartitionError> {
    let mut groups: Vec<Vec<VolumeInterval>> = vec![Vec::new(); num_groups];
    let num_intervals = ivls.len();
    let per_group = num_intervals / num_groups;
    let remainder = num_intervals - per_group * num_groups;

    let mut cur_group = 0;
    let mut cur_ivl: Option<VolumeInterval> = None;
    let mut cur_count = 0;
    let mut target = per_group + usize::from(remainder > 0);

    for ivl in ivls {
        cur_ivl = match cur_ivl.take() {
            Some(cur) if cur.contig() == ivl.contig() => Some(cur.add(&ivl)?),
            Some(cur) => {
                groups[cur_group].push(cur);
                Some(ivl)
            }
            None => Some(ivl),
        };

        cur_count += 1;

        if cur_count >= target && cur_group < num_groups - 1 {
            if let Some(cur) = cur_ivl.take() {
                groups[cur_group].push(cur);
            }
            cur_group += 1;
            cur_count = 0;
            target = per_group + usize::from(cur_group < remainder);
        }
    }
    if let Some(cur) = cur_ivl {
        groups[cur_group].push(cur);
    }

    Ok(groups)
}

/// Longest-processing-time grouping: sort by volume descending and give
/// each piece to the lightest partition, then restore genomic order within
/// each partition.
fn group_lpt(mut ivls: Vec<VolumeInterval>, num_groups: usize) -> Vec<Vec<VolumeInterval>> {
    ivls.sort_by(|a, b| b.volume.cmp(&a.volume).then(a.interval.cmp(&b.interval)));

    let mut groups: Vec<Vec<VolumeInterval>> = vec![Vec::new(); num_groups];
    let mut totals = vec![0u64; num_groups];

    for ivl in ivls {
        let lightest = totals
            .iter()
            .enumerate()
            .min_by_key(|(_, &total)| total)
            .map(|(i, _)| i)
            .unwrap_or(0);
        totals[lightest] += ivl.volume;
        groups[lightest].push(ivl);
    }

    for group in &mut groups {
        group.sort_by(|a, b| a.interval.cmp(&b.interval));
    }
    groups
}
