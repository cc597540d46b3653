//! Region filtering: include/exclude sets built from region strings,
//! contig patterns, and BED target files.
//!
//! A [`RegionSpec`] holds the raw user inputs; binding it to a reference
//! table with [`RegionSpec::build`] resolves every input to concrete
//! intervals and produces a [`Regions`] filter exposing `allows`,
//! `iter_allowed`, and `intersect`.

use std::path::{Path, PathBuf};

use regex::Regex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::bed::{self, BedError};
use crate::index::{IndexError, IntervalIndex};
use crate::interval::{self, GenomeInterval, IntervalError, Slice};
use crate::references::References;

/// Errors building or applying region filters.
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("invalid region interval {0}: start must be >= 1")]
    StartBeforeOne(String),

    #[error("invalid region interval {0}: start must be <= end")]
    StartAfterEnd(String),

    #[error("invalid region interval {0}: {1}")]
    Malformed(String, String),

    #[error("contig {0} not found in references")]
    ReferenceMissing(String),

    #[error("invalid contig pattern {0}: {1}")]
    BadPattern(String, String),

    #[error(transparent)]
    Bed(#[from] BedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Interval(#[from] IntervalError),
}

/// End bound of a parsed region string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionEnd {
    /// An explicit 0-based exclusive end position.
    Pos(u64),
    /// `*`: the end of the contig, resolved against the reference table.
    ContigEnd,
}

/// A parsed, not yet resolved region string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub contig: String,
    pub start: u64,
    pub end: RegionEnd,
}

impl Region {
    /// Resolve `*` ends against the reference table.
    pub fn resolve(&self, references: &References) -> Result<GenomeInterval, RegionError> {
        let end = match self.end {
            RegionEnd::Pos(end) => end,
            RegionEnd::ContigEnd => references
                .length(&self.contig)
                .ok_or_else(|| RegionError::ReferenceMissing(self.contig.clone()))?,
        };
        Ok(GenomeInterval::new(self.contig.clone(), self.start, end))
    }
}

/// Parse a region string of the form `contig[:start[-end]]`.
///
/// `start` is 1-based and is converted to 0-based here. A bare contig spans
/// the whole contig; an omitted end means a single position; `*` as the end
/// resolves to the contig length at bind time.
pub fn parse_region(region_str: &str) -> Result<Region, RegionError> {
    let Some((contig, range)) = region_str.split_once(':') else {
        return Ok(Region {
            contig: region_str.to_string(),
            start: 0,
            end: RegionEnd::ContigEnd,
        });
    };

    let parse_pos = |s: &str| -> Result<u64, RegionError> {
        s.parse().map_err(|_| {
            RegionError::Malformed(
                region_str.to_string(),
                format!("invalid position {:?}", s),
            )
        })
    };

    let (start_str, end_str) = match range.split_once('-') {
        Some((s, e)) => (s, Some(e)),
        None => (range, None),
    };

    let start = parse_pos(start_str)?;
    if start < 1 {
        return Err(RegionError::StartBeforeOne(region_str.to_string()));
    }

    let end = match end_str {
        None => RegionEnd::Pos(start),
        Some("*") => RegionEnd::ContigEnd,
        Some(e) => RegionEnd::Pos(parse_pos(e)?),
    };

    // To 0-based; a bare start denotes the single position [start-1, start).
    let start = start - 1;
    if let RegionEnd::Pos(end) = end {
        if start >= end {
            return Err(RegionError::StartAfterEnd(region_str.to_string()));
        }
    }

    Ok(Region {
        contig: contig.to_string(),
        start,
        end,
    })
}

/// A compiled contig pattern: either a numeric range like `chr1-22` or an
/// anchored regular expression.
enum ContigMatcher {
    Range { prefix: String, lo: f64, hi: f64 },
    Pattern(Regex),
}

impl ContigMatcher {
    fn compile(pattern: &str) -> Result<Self, RegionError> {
        if let Some(range) = Self::try_range(pattern) {
            return Ok(range);
        }
        let re = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| RegionError::BadPattern(pattern.to_string(), e.to_string()))?;
        Ok(ContigMatcher::Pattern(re))
    }

    /// `<alpha-prefix><lo>-<hi>`, with the prefix optionally repeated on the
    /// high bound (`chr1-22` and `chr1-chr22` both work).
    fn try_range(pattern: &str) -> Option<ContigMatcher> {
        let (lo_str, hi_str) = pattern.split_once('-')?;
        let split = lo_str.find(|c: char| !c.is_ascii_alphabetic())?;
        let (prefix, lo_num) = lo_str.split_at(split);
        let lo: f64 = lo_num.parse().ok()?;
        let hi: f64 = hi_str
            .strip_prefix(prefix)
            .unwrap_or(hi_str)
            .parse()
            .ok()?;
        Some(ContigMatcher::Range {
            prefix: prefix.to_string(),
            lo,
            hi,
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            ContigMatcher::Range { prefix, lo, hi } => name
                .strip_prefix(prefix.as_str())
                .and_then(|tail| tail.parse::<f64>().ok())
                .map(|n| *lo <= n && n <= *hi)
                .unwrap_or(false),
            ContigMatcher::Pattern(re) => re.is_match(name),
        }
    }
}

/// Expand macro names to their pattern lists, iterating to a fixed point.
/// Each macro key is expanded at most once, so cyclic definitions
/// terminate.
fn expand_macros(patterns: &[String], macros: &FxHashMap<String, Vec<String>>) -> Vec<String> {
    let mut expanded = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut stack: Vec<String> = patterns.iter().rev().cloned().collect();

    while let Some(pattern) = stack.pop() {
        match macros.get(&pattern) {
            Some(replacements) if !seen.contains(&pattern) => {
                seen.push(pattern.clone());
                for r in replacements.iter().rev() {
                    stack.push(r.clone());
                }
            }
            _ => expanded.push(pattern),
        }
    }
    expanded
}

/// Raw, unresolved region filter inputs.
#[derive(Debug, Clone, Default)]
pub struct RegionSpec {
    pub regions: Vec<Region>,
    pub exclude_regions: Vec<Region>,
    pub contigs: Vec<String>,
    pub exclude_contigs: Vec<String>,
    pub targets: Option<PathBuf>,
    pub exclude_targets: Option<PathBuf>,
}

impl RegionSpec {
    /// Whether no filtering input was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
            && self.exclude_regions.is_empty()
            && self.contigs.is_empty()
            && self.exclude_contigs.is_empty()
            && self.targets.is_none()
            && self.exclude_targets.is_none()
    }

    /// Resolve every input against `references` and build the filter.
    pub fn build(
        &self,
        references: &References,
        macros: Option<&FxHashMap<String, Vec<String>>>,
    ) -> Result<Regions, RegionError> {
        let include = self.build_side(
            references,
            macros,
            &self.regions,
            &self.contigs,
            self.targets.as_deref(),
        )?;
        let exclude = self.build_side(
            references,
            macros,
            &self.exclude_regions,
            &self.exclude_contigs,
            self.exclude_targets.as_deref(),
        )?;

        Ok(Regions {
            include,
            exclude,
            references: references.clone(),
        })
    }

    fn build_side(
        &self,
        references: &References,
        macros: Option<&FxHashMap<String, Vec<String>>>,
        regions: &[Region],
        contigs: &[String],
        targets: Option<&Path>,
    ) -> Result<Option<IntervalIndex>, RegionError> {
        if regions.is_empty() && contigs.is_empty() && targets.is_none() {
            return Ok(None);
        }

        let mut index = IntervalIndex::coalescing();

        for region in regions {
            index.add(region.resolve(references)?)?;
        }

        if !contigs.is_empty() {
            let patterns = match macros {
                Some(macros) => expand_macros(contigs, macros),
                None => contigs.to_vec(),
            };
            let matchers = patterns
                .iter()
                .map(|p| ContigMatcher::compile(p))
                .collect::<Result<Vec<_>, _>>()?;

            for (name, length) in references.iter() {
                if length > 0 && matchers.iter().any(|m| m.matches(name)) {
                    index.add(GenomeInterval::new(name, 0, length))?;
                }
            }
        }

        if let Some(path) = targets {
            index.add_all(bed::read_intervals(path)?)?;
        }

        index.close();
        Ok(Some(index))
    }
}

/// A bound region filter: optional include and exclude interval sets.
///
/// No include set means every position is allowed; no exclude set means
/// nothing is subtracted.
pub struct Regions {
    include: Option<IntervalIndex>,
    exclude: Option<IntervalIndex>,
    references: References,
}

impl Regions {
    /// True iff `ivl` is fully contained in some included interval (or no
    /// include set exists) and does not overlap any excluded interval.
    pub fn allows(&self, ivl: &GenomeInterval) -> Result<bool, RegionError> {
        let contained = match &self.include {
            Some(include) => include
                .find(ivl)?
                .iter()
                .any(|hit| ivl.compare(hit).self_covered == 1.0),
            None => true,
        };
        if !contained {
            return Ok(false);
        }
        if let Some(exclude) = &self.exclude {
            if exclude.contains(ivl)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The allowed intervals themselves: the include set (or one
    /// full-contig interval per reference), diced by any excludes.
    pub fn iter_allowed(&self) -> Result<Vec<GenomeInterval>, RegionError> {
        let base: Vec<GenomeInterval> = match &self.include {
            Some(include) => include.iter()?.into_iter().cloned().collect(),
            None => self
                .references
                .iter()
                .filter(|(_, length)| *length > 0)
                .map(|(name, length)| GenomeInterval::new(name, 0, length))
                .collect(),
        };

        let mut allowed = Vec::with_capacity(base.len());
        for ivl in base {
            self.dice_excludes(ivl, &mut allowed)?;
        }
        Ok(allowed)
    }

    fn dice_excludes<T: Slice>(
        &self,
        ivl: T,
        out: &mut Vec<T>,
    ) -> Result<(), RegionError> {
        match &self.exclude {
            Some(exclude) => {
                let overlapping: Vec<GenomeInterval> = exclude
                    .find(ivl.interval())?
                    .into_iter()
                    .cloned()
                    .collect();
                if overlapping.is_empty() {
                    out.push(ivl);
                } else {
                    out.extend(interval::divide(&ivl, &overlapping));
                }
            }
            None => out.push(ivl),
        }
        Ok(())
    }

    /// Constrain `intervals` to this filter: restrict each to the include
    /// set (or keep as-is when no includes), then dice each surviving piece
    /// by the excludes. The input type is preserved.
    pub fn intersect<T, I>(&self, intervals: I) -> Result<Vec<T>, RegionError>
    where
        T: Slice,
        I: IntoIterator<Item = T>,
    {
        let mut out = Vec::new();
        for ivl in intervals {
            let restricted: Vec<T> = match &self.include {
                Some(include) => {
                    let hits: Vec<GenomeInterval> = include
                        .find(ivl.interval())?
                        .into_iter()
                        .cloned()
                        .collect();
                    if hits.is_empty() {
                        Vec::new()
                    } else {
                        interval::intersect(&ivl, &hits)?
                    }
                }
                None => vec![ivl],
            };

            for piece in restricted {
                self.dice_excludes(piece, &mut out)?;
            }
        }
        Ok(out)
    }
}
