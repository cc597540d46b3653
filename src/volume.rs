//! Volume-annotated intervals.
//!
//! A [`VolumeInterval`] is a genomic interval carrying an estimated on-disk
//! volume in bytes. Cutting an interval pro-rates its volume over the
//! retained length: a sub-range `[a, b)` of an interval of length `L` and
//! volume `V` carries `ceil(((b - a) / L) * V)` bytes.

use crate::interval::{GenomeInterval, IntervalError, Slice};

/// A genomic interval with an estimated byte volume.
///
/// `children` records the source intervals merged into this one (in order),
/// feeding the `child_lengths` / `child_volumes` BED output columns. An
/// interval built directly from the reducer has no children.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInterval {
    pub interval: GenomeInterval,
    pub volume: u64,
    pub children: Vec<VolumeInterval>,
}

impl VolumeInterval {
    /// Create a new interval with the given volume and no children.
    #[inline]
    pub fn new(contig: impl Into<String>, start: u64, end: u64, volume: u64) -> Self {
        Self::from_interval(GenomeInterval::new(contig, start, end), volume)
    }

    #[inline]
    pub fn from_interval(interval: GenomeInterval, volume: u64) -> Self {
        Self {
            interval,
            volume,
            children: Vec::new(),
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

    #[inline]
    pub fn len(&self) -> u64 {
        self.interval.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Pro-rated volume of the sub-range `[start, end)`, with bounds clamped
    /// to this interval.
    pub fn volume_between(&self, start: Option<u64>, end: Option<u64>) -> u64 {
        let start = start
            .unwrap_or(self.start())
            .clamp(self.start(), self.end());
        let end = end.unwrap_or(self.end()).clamp(self.start(), self.end());
        if end <= start {
            return 0;
        }
        let fraction = (end - start) as f64 / self.len() as f64;
        (fraction * self.volume as f64).ceil() as u64
    }

    /// A flat copy of this interval without its children, used when
    /// recording it as a child of a merged interval.
    fn leaf(&self) -> VolumeInterval {
        VolumeInterval {
            interval: self.interval.clone(),
            volume: self.volume,
            children: Vec::new(),
        }
    }

    /// Merge with another interval on the same contig.
    ///
    /// The result spans `[min(starts), max(ends))`. Its volume is this
    /// interval's volume plus the pro-rated portion of `other` outside this
    /// interval, so an overlapping slice is never double-counted and a gap
    /// between the two contributes nothing. `other` is appended to the
    /// child list, which is seeded with both inputs when absent.
    pub fn add(&self, other: &VolumeInterval) -> Result<VolumeInterval, IntervalError> {
        self.interval.contig_equal(&other.interval)?;

        let mut volume = self.volume;
        if other.start() < self.start() {
            volume += other.volume_between(None, Some(self.start()));
        }
        if other.end() > self.end() {
            volume += other.volume_between(Some(self.end()), None);
        }

        let mut children = if self.children.is_empty() {
            vec![self.leaf(), other.leaf()]
        } else {
            let mut children = self.children.clone();
            children.push(other.leaf());
            children
        };
        children.sort_by(|a, b| a.interval.cmp(&b.interval));

        Ok(VolumeInterval {
            interval: GenomeInterval::new(
                self.contig(),
                self.start().min(other.start()),
                self.end().max(other.end()),
            ),
            volume,
            children,
        })
    }

    /// Remove `other` from this interval, pro-rating the volume of the
    /// remaining fragments.
    pub fn subtract(
        &self,
        other: &GenomeInterval,
    ) -> Result<(Option<VolumeInterval>, Option<VolumeInterval>), IntervalError> {
        let (left, right) = self.interval.subtract(other)?;
        let prorate = |frag: GenomeInterval| {
            let volume = self.volume_between(Some(frag.start), Some(frag.end));
            VolumeInterval::from_interval(frag, volume)
        };
        Ok((left.map(prorate), right.map(prorate)))
    }

    /// Break this interval into `num_pieces` equal-length pieces, each with
    /// a pro-rated volume. The pieces tile the interval exactly.
    pub fn split(&self, num_pieces: usize) -> Vec<VolumeInterval> {
        let num_pieces = num_pieces.max(1) as u64;
        let piece_length = self.len().div_ceil(num_pieces);

        let mut pieces = Vec::new();
        let mut start = self.start();
        while start < self.end() {
            let end = self.end().min(start + piece_length);
            let volume = self.volume_between(Some(start), Some(end));
            pieces.push(VolumeInterval::new(self.contig(), start, end, volume));
            start = end;
        }
        pieces
    }

    /// Break this interval into pieces of approximately `target_volume`
    /// bytes each.
    pub fn split_to_volume(&self, target_volume: u64) -> Vec<VolumeInterval> {
        let target = target_volume.max(1);
        let num_pieces = self.volume.div_ceil(target).max(1);
        self.split(num_pieces as usize)
    }

    /// Merge a group of intervals whose total volume has already been
    /// computed.
    ///
    /// The result spans from the first start to the last end of the sorted
    /// group and carries `volume` as-is, never re-pro-rated. Returns `None`
    /// for an empty group.
    pub fn merge_precomputed<'a, I>(intervals: I, volume: u64) -> Option<VolumeInterval>
    where
        I: IntoIterator<Item = &'a GenomeInterval>,
    {
        let mut spans: Vec<&GenomeInterval> = intervals.into_iter().collect();
        spans.sort();
        let first = spans.first()?;
        let last = spans.last()?;
        Some(VolumeInterval::new(
            first.contig.clone(),
            first.start,
            last.end,
            volume,
        ))
    }
}

impl Slice for VolumeInterval {
    #[inline]
    fn interval(&self) -> &GenomeInterval {
        &self.interval
    }

    fn slice(&self, start: Option<u64>, end: Option<u64>) -> Self {
        let volume = self.volume_between(start, end);
        VolumeInterval::from_interval(self.interval.slice(start, end), volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval;

    #[test]
    fn test_volume_slice_prorates() {
        let v = VolumeInterval::new("chrX", 0, 1000, 500);
        let s = v.slice(Some(200), Some(700));
        assert_eq!(s.interval, GenomeInterval::new("chrX", 200, 700));
        assert_eq!(s.volume, 250);
    }

    #[test]
    fn test_volume_between_rounds_up() {
        let v = VolumeInterval::new("chr1", 0, 3, 10);
        // 1/3 of 10 = 3.33... -> 4
        assert_eq!(v.volume_between(Some(0), Some(1)), 4);
        assert_eq!(v.volume_between(None, None), 10);
        // Out-of-bounds requests clamp to the interval.
        assert_eq!(v.volume_between(Some(0), Some(100)), 10);
    }

    #[test]
    fn test_add_to_the_right() {
        let a = VolumeInterval::new("chr1", 0, 100, 60);
        let b = VolumeInterval::new("chr1", 50, 150, 100);

        let merged = a.add(&b).unwrap();
        assert_eq!(merged.interval, GenomeInterval::new("chr1", 0, 150));
        // a's 60, plus b's half outside a: ceil(50/100 * 100) = 50.
        assert_eq!(merged.volume, 110);
        assert_eq!(merged.children.len(), 2);
    }

    #[test]
    fn test_add_contained_keeps_volume() {
        let a = VolumeInterval::new("chr1", 0, 100, 60);
        let b = VolumeInterval::new("chr1", 20, 40, 1000);

        let merged = a.add(&b).unwrap();
        assert_eq!(merged.interval, GenomeInterval::new("chr1", 0, 100));
        // b lies entirely within a: the overlap is not double-counted.
        assert_eq!(merged.volume, 60);
    }

    #[test]
    fn test_add_spans_gap() {
        let a = VolumeInterval::new("chr1", 0, 10, 5);
        let b = VolumeInterval::new("chr1", 20, 30, 7);

        let merged = a.add(&b).unwrap();
        assert_eq!(merged.interval, GenomeInterval::new("chr1", 0, 30));
        assert_eq!(merged.volume, 12);
    }

    #[test]
    fn test_add_accumulates_children() {
        let a = VolumeInterval::new("chr1", 0, 10, 5);
        let b = VolumeInterval::new("chr1", 10, 20, 7);
        let c = VolumeInterval::new("chr1", 20, 30, 9);

        let merged = a.add(&b).unwrap().add(&c).unwrap();
        assert_eq!(merged.children.len(), 3);
        assert_eq!(
            merged.children.iter().map(|c| c.volume).collect::<Vec<_>>(),
            vec![5, 7, 9]
        );
    }

    #[test]
    fn test_add_rejects_other_contig() {
        let a = VolumeInterval::new("chr1", 0, 10, 5);
        let b = VolumeInterval::new("chr2", 0, 10, 5);
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn test_subtract_prorates() {
        let v = VolumeInterval::new("chr1", 0, 100, 100);
        let (left, right) = v.subtract(&GenomeInterval::new("chr1", 25, 75)).unwrap();

        let left = left.unwrap();
        let right = right.unwrap();
        assert_eq!(left.interval, GenomeInterval::new("chr1", 0, 25));
        assert_eq!(left.volume, 25);
        assert_eq!(right.interval, GenomeInterval::new("chr1", 75, 100));
        assert_eq!(right.volume, 25);
    }

    #[test]
    fn test_split_tiles_exactly() {
        let v = VolumeInterval::new("chr1", 0, 1000, 999);
        let pieces = v.split(3);

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].start(), 0);
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
        assert_eq!(pieces.last().unwrap().end(), 1000);

        // Ceiling rounding: total volume within [v, v + pieces].
        let total: u64 = pieces.iter().map(|p| p.volume).sum();
        assert!(total >= v.volume);
        assert!(total <= v.volume + pieces.len() as u64);
    }

    #[test]
    fn test_split_uneven_length() {
        let v = VolumeInterval::new("chr1", 0, 10, 10);
        let pieces = v.split(3);
        // ceil(10/3) = 4 -> lengths 4, 4, 2.
        assert_eq!(
            pieces.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
    }

    #[test]
    fn test_split_to_volume() {
        let v = VolumeInterval::new("chr1", 0, 1000, 100);
        let pieces = v.split_to_volume(30);
        // ceil(100/30) = 4 pieces.
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0].volume, 25);
    }

    #[test]
    fn test_merge_precomputed_spans_group() {
        let spans = [
            GenomeInterval::new("chr1", 200, 300),
            GenomeInterval::new("chr1", 0, 100),
            GenomeInterval::new("chr1", 100, 200),
        ];

        let merged = VolumeInterval::merge_precomputed(spans.iter(), 777).unwrap();
        assert_eq!(merged.interval, GenomeInterval::new("chr1", 0, 300));
        // The supplied total is carried as-is, not re-pro-rated.
        assert_eq!(merged.volume, 777);
        assert!(merged.children.is_empty());

        assert!(VolumeInterval::merge_precomputed(std::iter::empty(), 1).is_none());
    }

    #[test]
    fn test_intersect_preserves_volume_type() {
        let v = VolumeInterval::new("chr1", 25, 175, 150);
        let targets = vec![
            GenomeInterval::new("chr1", 10, 100),
            GenomeInterval::new("chr1", 150, 200),
        ];

        let pieces = interval::intersect(&v, &targets).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].interval, GenomeInterval::new("chr1", 25, 100));
        assert_eq!(pieces[0].volume, 75);
        assert_eq!(pieces[1].interval, GenomeInterval::new("chr1", 150, 175));
        assert_eq!(pieces[1].volume, 25);
    }
}
