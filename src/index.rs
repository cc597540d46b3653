//! Interval indexing for fast overlap queries.
//!
//! An [`IntervalIndex`] shards intervals by contig. Each shard is a vector
//! sorted by start position plus the maximum interval length seen in that
//! shard; overlap queries binary-search the vector, shifting the left cut by
//! the maximum length so intervals that start before the query but reach
//! into it are not missed.
//!
//! The index is built in two phases: `add`/`add_all` append, `commit` sorts.
//! Queries on an uncommitted index return [`IndexError::NotCommitted`].

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::interval::{GenomeInterval, Side};

/// Usage errors for [`IntervalIndex`].
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot query an interval index with uncommitted additions")]
    NotCommitted,

    #[error("cannot add intervals to a closed interval index")]
    Closed,
}

#[derive(Debug, Default)]
struct Shard {
    iset: Vec<GenomeInterval>,
    maxlen: u64,
}

impl Shard {
    fn resort(&mut self) {
        self.iset.sort();
        self.maxlen = self.iset.iter().map(|i| i.len()).max().unwrap_or(0);
    }

    /// Lowest index at which an interval starting at `x` could be inserted.
    fn bisect_left_start(&self, x: u64) -> usize {
        self.iset.partition_point(|s| s.start < x)
    }

    /// Highest index at which an interval starting at `x` could be inserted.
    fn bisect_right_start(&self, x: u64) -> usize {
        self.iset.partition_point(|s| s.start <= x)
    }

    /// Candidate window for overlap scans against `q`.
    fn scan_range(&self, q: &GenomeInterval) -> (usize, usize) {
        let left = self.bisect_left_start(q.start.saturating_sub(self.maxlen));
        let right = self.bisect_right_start(q.end);
        (left, right)
    }
}

/// An indexed collection of intervals organized by contig.
///
/// In the default mode, overlapping members are stored as-is. An index
/// created with [`IntervalIndex::coalescing`] instead merges every added
/// interval with the members it overlaps, so the committed set is always
/// disjoint; in that mode each `add` forces a commit.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    shards: FxHashMap<String, Shard>,
    merge_overlapping: bool,
    dirty: bool,
    closed: bool,
    len: usize,
}

impl IntervalIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index that keeps its members disjoint by merging
    /// overlapping additions.
    pub fn coalescing() -> Self {
        Self {
            merge_overlapping: true,
            ..Self::default()
        }
    }

    /// Build a committed index from a collection of intervals.
    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = GenomeInterval>,
    {
        let mut index = Self::new();
        index
            .add_all(intervals)
            .expect("a fresh index is never closed");
        index.commit();
        index
    }

    /// Add one interval.
    pub fn add(&mut self, ivl: GenomeInterval) -> Result<(), IndexError> {
        if self.closed {
            return Err(IndexError::Closed);
        }

        if self.merge_overlapping {
            self.commit();
            let shard = self.shards.entry(ivl.contig.clone()).or_default();
            let (left, right) = shard.scan_range(&ivl);
            let overlapping: Vec<usize> = (left..right)
                .filter(|&i| shard.iset[i].overlaps(&ivl))
                .collect();

            let merged = if overlapping.is_empty() {
                ivl
            } else {
                let mut run: Vec<GenomeInterval> = Vec::with_capacity(overlapping.len() + 1);
                for &i in overlapping.iter().rev() {
                    run.push(shard.iset.remove(i));
                    self.len -= 1;
                }
                run.push(ivl);
                GenomeInterval::merge(run).expect("overlapping run is chainwise mergeable")
            };
            shard.iset.push(merged);
            shard.resort();
            self.len += 1;
        } else {
            self.shards
                .entry(ivl.contig.clone())
                .or_default()
                .iset
                .push(ivl);
            self.len += 1;
            self.dirty = true;
        }
        Ok(())
    }

    /// Add all intervals from an iterator.
    pub fn add_all<I>(&mut self, intervals: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = GenomeInterval>,
    {
        for ivl in intervals {
            self.add(ivl)?;
        }
        Ok(())
    }

    /// Sort each shard and refresh its maximum length. Idempotent; a no-op
    /// when there are no uncommitted additions.
    pub fn commit(&mut self) {
        if self.dirty {
            for shard in self.shards.values_mut() {
                shard.resort();
            }
            self.dirty = false;
        }
    }

    /// Commit and freeze the index; further `add` calls fail.
    pub fn close(&mut self) {
        self.commit();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_committed(&self) -> Result<(), IndexError> {
        if self.dirty {
            return Err(IndexError::NotCommitted);
        }
        Ok(())
    }

    /// Find all committed intervals overlapping `q`, in sorted order.
    pub fn find(&self, q: &GenomeInterval) -> Result<Vec<&GenomeInterval>, IndexError> {
        self.check_committed()?;
        let Some(shard) = self.shards.get(&q.contig) else {
            return Ok(Vec::new());
        };
        let (left, right) = shard.scan_range(q);
        Ok(shard.iset[left..right]
            .iter()
            .filter(|s| s.start < q.end && s.end > q.start)
            .collect())
    }

    /// Check whether any committed interval overlaps `q`.
    pub fn contains(&self, q: &GenomeInterval) -> Result<bool, IndexError> {
        Ok(!self.find(q)?.is_empty())
    }

    /// For each interval overlapping `q`, yield the overlapped sub-range:
    /// the middle two of the four sorted endpoints.
    pub fn intersect(&self, q: &GenomeInterval) -> Result<Vec<GenomeInterval>, IndexError> {
        Ok(self
            .find(q)?
            .into_iter()
            .map(|s| {
                let mut ends = [s.start, s.end, q.start, q.end];
                ends.sort_unstable();
                GenomeInterval::new(q.contig.clone(), ends[1], ends[2])
            })
            .collect())
    }

    /// Find the closest interval(s) to `q` on the given side.
    ///
    /// With `Side::Left` or `Side::Right` at most one interval is returned.
    /// With `Side::Both`, ties are expanded: if any candidate overlaps `q`
    /// all overlapping candidates are returned; otherwise all candidates at
    /// the minimum absolute distance are returned in sorted order. An
    /// interval equal to `q` is never returned.
    pub fn closest(
        &self,
        q: &GenomeInterval,
        side: Side,
    ) -> Result<Vec<&GenomeInterval>, IndexError> {
        self.check_committed()?;
        let Some(shard) = self.shards.get(&q.contig) else {
            return Ok(Vec::new());
        };
        if shard.iset.is_empty() {
            return Ok(Vec::new());
        }
        let iset = &shard.iset;

        let left_anchor = shard
            .bisect_left_start(q.start.saturating_sub(shard.maxlen))
            .saturating_sub(1);
        let right_anchor = (shard.bisect_right_start(q.end) + 2).min(iset.len());

        match side {
            Side::Left => {
                let ivl = &iset[left_anchor];
                Ok(if ivl != q { vec![ivl] } else { Vec::new() })
            }
            Side::Right => {
                let ivl = &iset[right_anchor - 1];
                Ok(if ivl != q { vec![ivl] } else { Vec::new() })
            }
            Side::Both => {
                let mut left = left_anchor;
                let mut right = right_anchor;

                // Widen to keep candidates tied with the anchors: same end
                // leftward, same start rightward.
                while left > 0 && iset[left - 1].end == iset[left].end {
                    left -= 1;
                }
                while right < iset.len() && iset[right - 1].start == iset[right].start {
                    right += 1;
                }

                let candidates: Vec<&GenomeInterval> =
                    iset[left..right].iter().filter(|s| *s != q).collect();

                let overlapping: Vec<&GenomeInterval> = candidates
                    .iter()
                    .copied()
                    .filter(|s| s.overlaps(q))
                    .collect();
                if !overlapping.is_empty() {
                    return Ok(overlapping);
                }

                let mut by_distance: Vec<(i64, &GenomeInterval)> = candidates
                    .into_iter()
                    .map(|s| (s.compare(q).distance.abs(), s))
                    .collect();
                by_distance.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(b.1)));

                let Some(&(min_dist, _)) = by_distance.first() else {
                    return Ok(Vec::new());
                };
                Ok(by_distance
                    .into_iter()
                    .take_while(|(d, _)| *d == min_dist)
                    .map(|(_, s)| s)
                    .collect())
            }
        }
    }

    /// All committed intervals, contigs in lexicographic order.
    pub fn iter(&self) -> Result<Vec<&GenomeInterval>, IndexError> {
        self.check_committed()?;
        let mut contigs: Vec<&String> = self.shards.keys().collect();
        contigs.sort();
        Ok(contigs
            .into_iter()
            .flat_map(|c| self.shards[c].iset.iter())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> IntervalIndex {
        IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 10),
            GenomeInterval::new("chr1", 5, 15),
            GenomeInterval::new("chr2", 3, 7),
        ])
    }

    #[test]
    fn test_find_overlaps_sorted() {
        let index = sample_index();
        let hits = index.find(&GenomeInterval::new("chr1", 3, 7)).unwrap();

        assert_eq!(
            hits,
            vec![
                &GenomeInterval::new("chr1", 0, 10),
                &GenomeInterval::new("chr1", 5, 15),
            ]
        );
    }

    #[test]
    fn test_find_missing_contig() {
        let index = sample_index();
        assert!(index
            .find(&GenomeInterval::new("chr3", 0, 100))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_respects_maxlen() {
        // A long interval starting well before the query must still be found.
        let index = IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 100_000),
            GenomeInterval::new("chr1", 50_000, 50_010),
            GenomeInterval::new("chr1", 99_990, 100_100),
        ]);
        let hits = index
            .find(&GenomeInterval::new("chr1", 99_995, 99_999))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].start, 0);
    }

    #[test]
    fn test_find_exhaustive_against_scan() {
        let intervals = vec![
            GenomeInterval::new("chr1", 0, 5),
            GenomeInterval::new("chr1", 2, 40),
            GenomeInterval::new("chr1", 10, 12),
            GenomeInterval::new("chr1", 11, 13),
            GenomeInterval::new("chr1", 30, 31),
            GenomeInterval::new("chr1", 38, 45),
        ];
        let index = IntervalIndex::from_intervals(intervals.clone());

        for qs in (0..50u64).step_by(3) {
            let q = GenomeInterval::new("chr1", qs, qs + 4);
            let mut expected: Vec<&GenomeInterval> =
                intervals.iter().filter(|s| s.overlaps(&q)).collect();
            expected.sort();
            assert_eq!(index.find(&q).unwrap(), expected, "query {}", q);
        }
    }

    #[test]
    fn test_query_before_commit_fails() {
        let mut index = IntervalIndex::new();
        index.add(GenomeInterval::new("chr1", 0, 10)).unwrap();
        assert!(matches!(
            index.find(&GenomeInterval::new("chr1", 0, 5)),
            Err(IndexError::NotCommitted)
        ));

        index.commit();
        assert!(index.find(&GenomeInterval::new("chr1", 0, 5)).is_ok());
    }

    #[test]
    fn test_add_after_close_fails() {
        let mut index = sample_index();
        index.close();
        assert!(matches!(
            index.add(GenomeInterval::new("chr1", 0, 1)),
            Err(IndexError::Closed)
        ));
    }

    #[test]
    fn test_commit_idempotent() {
        let mut index = IntervalIndex::new();
        index.add(GenomeInterval::new("chr1", 10, 20)).unwrap();
        index.commit();
        index.commit();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_intersect_clips_to_query() {
        let index = sample_index();
        let pieces = index.intersect(&GenomeInterval::new("chr1", 3, 7)).unwrap();
        assert_eq!(
            pieces,
            vec![
                GenomeInterval::new("chr1", 3, 7),
                GenomeInterval::new("chr1", 5, 7),
            ]
        );
    }

    #[test]
    fn test_coalescing_merges_overlaps() {
        let mut index = IntervalIndex::coalescing();
        index.add(GenomeInterval::new("chr1", 0, 10)).unwrap();
        index.add(GenomeInterval::new("chr1", 20, 30)).unwrap();
        index.add(GenomeInterval::new("chr1", 5, 25)).unwrap();

        let all = index.iter().unwrap();
        assert_eq!(all, vec![&GenomeInterval::new("chr1", 0, 30)]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_coalescing_keeps_disjoint_members() {
        let mut index = IntervalIndex::coalescing();
        index.add(GenomeInterval::new("chr1", 0, 10)).unwrap();
        index.add(GenomeInterval::new("chr1", 20, 30)).unwrap();

        assert_eq!(index.len(), 2);
        // No commit call needed: coalescing mode commits on every add.
        assert!(index.contains(&GenomeInterval::new("chr1", 5, 6)).unwrap());
        assert!(!index.contains(&GenomeInterval::new("chr1", 12, 15)).unwrap());
    }

    #[test]
    fn test_closest_left() {
        let index = IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 10),
            GenomeInterval::new("chr1", 20, 30),
            GenomeInterval::new("chr1", 50, 60),
        ]);

        let hits = index
            .closest(&GenomeInterval::new("chr1", 40, 45), Side::Left)
            .unwrap();
        assert_eq!(hits, vec![&GenomeInterval::new("chr1", 20, 30)]);
    }

    #[test]
    fn test_closest_right() {
        let index = IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 10),
            GenomeInterval::new("chr1", 20, 30),
            GenomeInterval::new("chr1", 50, 60),
        ]);

        let hits = index
            .closest(&GenomeInterval::new("chr1", 32, 35), Side::Right)
            .unwrap();
        assert_eq!(hits, vec![&GenomeInterval::new("chr1", 50, 60)]);
    }

    #[test]
    fn test_closest_both_prefers_overlaps() {
        let index = IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 10),
            GenomeInterval::new("chr1", 8, 12),
            GenomeInterval::new("chr1", 40, 50),
        ]);

        let hits = index
            .closest(&GenomeInterval::new("chr1", 9, 11), Side::Both)
            .unwrap();
        assert_eq!(
            hits,
            vec![
                &GenomeInterval::new("chr1", 0, 10),
                &GenomeInterval::new("chr1", 8, 12),
            ]
        );
    }

    #[test]
    fn test_closest_both_distance_ties() {
        // Equidistant on both sides: both are returned, sorted.
        let index = IntervalIndex::from_intervals(vec![
            GenomeInterval::new("chr1", 0, 10),
            GenomeInterval::new("chr1", 30, 40),
        ]);

        let hits = index
            .closest(&GenomeInterval::new("chr1", 15, 25), Side::Both)
            .unwrap();
        assert_eq!(
            hits,
            vec![
                &GenomeInterval::new("chr1", 0, 10),
                &GenomeInterval::new("chr1", 30, 40),
            ]
        );
    }

    #[test]
    fn test_closest_never_yields_query() {
        let index = IntervalIndex::from_intervals(vec![GenomeInterval::new("chr1", 10, 20)]);
        let hits = index
            .closest(&GenomeInterval::new("chr1", 10, 20), Side::Both)
            .unwrap();
        assert!(hits.is_empty());
    }
}
