//! Region of interest selection over the pixel tensor
//! and the read plan which fetches only the selected samples.

use crate::error::{LoadError, SliceOutOfBoundsSnafu, SliceRankSnafu};
use dimble_core::TensorInfo;
use snafu::{ensure, Snafu};
use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull};
use std::str::FromStr;
use tracing::debug;

/// Runs separated by at most this many bytes are fetched in a single read.
pub const GATHER_GAP: u64 = 4096;

/// A half-open range over one tensor dimension.
/// An open end extends to the end of the dimension.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct DimRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl DimRange {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        DimRange { start, end }
    }

    /// The whole dimension.
    pub fn full() -> Self {
        DimRange::default()
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end.is_none()
    }
}

impl From<Range<usize>> for DimRange {
    fn from(range: Range<usize>) -> Self {
        DimRange::new(range.start, Some(range.end))
    }
}

impl From<RangeFrom<usize>> for DimRange {
    fn from(range: RangeFrom<usize>) -> Self {
        DimRange::new(range.start, None)
    }
}

impl From<RangeFull> for DimRange {
    fn from(_: RangeFull) -> Self {
        DimRange::full()
    }
}

/// A single index, keeping the dimension with extent 1.
///
/// `usize::MAX` has no successor and becomes an empty range,
/// which no shape admits.
impl From<usize> for DimRange {
    fn from(index: usize) -> Self {
        DimRange::new(index, Some(index.saturating_add(1)))
    }
}

impl fmt::Display for DimRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_full() {
            return f.write_str(":");
        }
        write!(f, "{}:", self.start)?;
        if let Some(end) = self.end {
            write!(f, "{}", end)?;
        }
        Ok(())
    }
}

/// A selection of the pixel tensor, one range per leading dimension.
///
/// Dimensions past the given ranges are taken in full,
/// so the default selection is the whole tensor.
///
/// # Example
///
/// ```
/// # use dimble_container::SliceSpec;
/// let spec = SliceSpec::full().dim(0..2).dim(..).dim(1..);
/// assert_eq!(spec, "0:2,:,1:".parse().unwrap());
/// assert_eq!(spec.resolve(&[4, 5, 6])?, vec![0..2, 0..5, 1..6]);
/// # Ok::<(), dimble_container::LoadError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SliceSpec {
    ranges: Vec<DimRange>,
}

impl SliceSpec {
    /// The selection of the whole tensor.
    pub fn full() -> Self {
        SliceSpec::default()
    }

    pub fn new<I>(ranges: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<DimRange>,
    {
        SliceSpec {
            ranges: ranges.into_iter().map(Into::into).collect(),
        }
    }

    /// Append the range of the next dimension.
    pub fn dim(mut self, range: impl Into<DimRange>) -> Self {
        self.ranges.push(range.into());
        self
    }

    pub fn ranges(&self) -> &[DimRange] {
        &self.ranges
    }

    /// Whether this selection takes every dimension in full.
    pub fn is_full(&self) -> bool {
        self.ranges.iter().all(DimRange::is_full)
    }

    /// Resolve the selection against a tensor shape
    /// into one concrete range per dimension.
    pub fn resolve(&self, shape: &[usize]) -> Result<Vec<Range<usize>>, LoadError> {
        ensure!(
            self.ranges.len() <= shape.len(),
            SliceRankSnafu {
                given: self.ranges.len(),
                ndim: shape.len(),
            }
        );
        shape
            .iter()
            .enumerate()
            .map(|(dim, &extent)| {
                let range = self.ranges.get(dim).copied().unwrap_or_default();
                let end = range.end.unwrap_or(extent);
                ensure!(
                    range.start <= end && end <= extent,
                    SliceOutOfBoundsSnafu {
                        dim,
                        start: range.start,
                        end,
                        extent,
                    }
                );
                Ok(range.start..end)
            })
            .collect()
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

/// Could not parse the textual form of a slice.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Invalid slice `{}`: bad bound `{}`", text, bound))]
pub struct ParseSliceError {
    text: String,
    bound: String,
}

/// Parse a comma separated list of `start:end` ranges,
/// where either bound may be omitted,
/// or a single index standing for `i:i+1`.
impl FromStr for SliceSpec {
    type Err = ParseSliceError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SliceSpec::full());
        }

        let bound = |s: &str| -> Result<Option<usize>, ParseSliceError> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse().map(Some).map_err(|_| ParseSliceError {
                text: text.to_string(),
                bound: s.to_string(),
            })
        };

        text.split(',')
            .map(|part| match part.split_once(':') {
                Some((start, end)) => Ok(DimRange::new(bound(start)?.unwrap_or(0), bound(end)?)),
                None => match bound(part)?.and_then(|index| {
                    index.checked_add(1).map(|end| DimRange::new(index, Some(end)))
                }) {
                    Some(range) => Ok(range),
                    None => Err(ParseSliceError {
                        text: text.to_string(),
                        bound: part.trim().to_string(),
                    }),
                },
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|ranges| SliceSpec { ranges })
    }
}

/// One contiguous read from the sample region of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSegment {
    /// Offset relative to the first sample
    pub offset: u64,
    pub len: u64,
    /// Byte ranges of the segment which belong to the selection
    pub pieces: Vec<Range<usize>>,
}

/// The reads needed to fetch a selection of the tensor,
/// in row-major order of the selected samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    /// Shape of the selected tensor
    pub shape: Vec<usize>,
    pub segments: Vec<ReadSegment>,
}

impl ReadPlan {
    /// Plan the reads of the selected `ranges`
    /// of a tensor described by `info`.
    ///
    /// The selection is split into the longest runs
    /// of row-major contiguous samples.
    /// Adjacent runs are merged,
    /// and runs separated by at most [`GATHER_GAP`] bytes
    /// share a single read.
    pub fn new(info: &TensorInfo, ranges: &[Range<usize>]) -> Self {
        let shape: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        let extents = &info.shape;
        let size = info.dtype.size() as u64;

        if shape.iter().any(|&d| d == 0) {
            return ReadPlan {
                shape,
                segments: Vec::new(),
            };
        }

        let ndim = extents.len();
        let mut strides = vec![1u64; ndim];
        for d in (0..ndim.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * extents[d + 1] as u64;
        }

        let mut runs: Vec<(u64, u64)> = Vec::new();
        match (0..ndim).rev().find(|&d| ranges[d] != (0..extents[d])) {
            None => {
                let count: u64 = extents.iter().map(|&d| d as u64).product();
                runs.push((0, count * size));
            }
            Some(inner) => {
                let run_len = ranges[inner].len() as u64 * strides[inner] * size;
                let inner_offset = ranges[inner].start as u64 * strides[inner];
                let mut index: Vec<usize> = ranges[..inner].iter().map(|r| r.start).collect();
                'runs: loop {
                    let element = index
                        .iter()
                        .zip(&strides)
                        .map(|(&i, &s)| i as u64 * s)
                        .sum::<u64>()
                        + inner_offset;
                    push_run(&mut runs, element * size, run_len);

                    let mut d = inner;
                    loop {
                        if d == 0 {
                            break 'runs;
                        }
                        d -= 1;
                        index[d] += 1;
                        if index[d] < ranges[d].end {
                            break;
                        }
                        index[d] = ranges[d].start;
                    }
                }
            }
        }

        let mut segments: Vec<ReadSegment> = Vec::new();
        for (offset, len) in runs {
            match segments.last_mut() {
                Some(segment) if offset - (segment.offset + segment.len) <= GATHER_GAP => {
                    let start = (offset - segment.offset) as usize;
                    segment.pieces.push(start..start + len as usize);
                    segment.len = offset + len - segment.offset;
                }
                _ => segments.push(ReadSegment {
                    offset,
                    len,
                    pieces: vec![0..len as usize],
                }),
            }
        }

        let plan = ReadPlan { shape, segments };
        debug!(
            "Read plan for {:?}: {} segments, {} of {} bytes read",
            ranges,
            plan.segments.len(),
            plan.read_len(),
            plan.output_len()
        );
        plan
    }

    /// Number of selected sample bytes.
    pub fn output_len(&self) -> u64 {
        self.segments
            .iter()
            .flat_map(|s| &s.pieces)
            .map(|p| p.len() as u64)
            .sum()
    }

    /// Number of bytes fetched, gaps included.
    pub fn read_len(&self) -> u64 {
        self.segments.iter().map(|s| s.len).sum()
    }

    /// Run the plan, calling `read(offset, buffer)`
    /// to fill a buffer with the bytes at an offset of the sample region.
    pub fn execute<F, E>(&self, mut read: F) -> Result<Vec<u8>, E>
    where
        F: FnMut(u64, &mut [u8]) -> Result<(), E>,
    {
        let mut out = Vec::with_capacity(self.output_len() as usize);
        let mut buffer = Vec::new();
        for segment in &self.segments {
            buffer.resize(segment.len as usize, 0);
            read(segment.offset, &mut buffer)?;
            for piece in &segment.pieces {
                out.extend_from_slice(&buffer[piece.clone()]);
            }
        }
        Ok(out)
    }
}

fn push_run(runs: &mut Vec<(u64, u64)>, offset: u64, len: u64) {
    match runs.last_mut() {
        Some((last_offset, last_len)) if *last_offset + *last_len == offset => *last_len += len,
        _ => runs.push((offset, len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimble_core::Dtype;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("", SliceSpec::full())]
    #[case(":", SliceSpec::full().dim(..))]
    #[case("0:2,:,1:", SliceSpec::full().dim(0..2).dim(..).dim(1..))]
    #[case("3", SliceSpec::full().dim(3))]
    #[case(" 1 : 4 , :2", SliceSpec::full().dim(1..4).dim(0..2))]
    fn parse_slices(#[case] text: &str, #[case] expected: SliceSpec) {
        assert_eq!(text.parse::<SliceSpec>(), Ok(expected));
    }

    #[rstest]
    #[case("a:b")]
    #[case("1,,2")]
    #[case("-1:")]
    #[case("18446744073709551615")]
    #[case("0,18446744073709551615")]
    fn reject_bad_slices(#[case] text: &str) {
        assert!(text.parse::<SliceSpec>().is_err());
    }

    #[test]
    fn largest_index_is_rejected() {
        let text = usize::MAX.to_string();
        assert_eq!(
            text.parse::<SliceSpec>(),
            Err(ParseSliceError {
                text: text.clone(),
                bound: text.clone(),
            })
        );
        // an open range from the largest index still parses
        assert_eq!(
            format!("{}:", text).parse::<SliceSpec>(),
            Ok(SliceSpec::full().dim(usize::MAX..))
        );
        assert!(matches!(
            SliceSpec::full().dim(usize::MAX).resolve(&[4]),
            Err(LoadError::SliceOutOfBounds { dim: 0, .. })
        ));
    }

    #[test]
    fn display_round_trip() {
        let spec = SliceSpec::full().dim(0..2).dim(..).dim(1..);
        assert_eq!(spec.to_string(), "0:2,:,1:");
        assert_eq!(spec.to_string().parse::<SliceSpec>(), Ok(spec));
    }

    #[test]
    fn resolve_against_shape() {
        let spec = SliceSpec::full().dim(1..3);
        assert_eq!(spec.resolve(&[4, 5]).unwrap(), vec![1..3, 0..5]);
        assert_eq!(SliceSpec::full().dim(2..2).resolve(&[4]).unwrap(), vec![2..2]);

        assert!(matches!(
            SliceSpec::full().dim(..).dim(0..6).resolve(&[4, 5]),
            Err(LoadError::SliceOutOfBounds { dim: 1, end: 6, extent: 5, .. })
        ));
        assert!(matches!(
            SliceSpec::full().dim(3..1).resolve(&[4]),
            Err(LoadError::SliceOutOfBounds { dim: 0, .. })
        ));
        assert!(matches!(
            SliceSpec::full().dim(..).dim(..).resolve(&[4]),
            Err(LoadError::SliceRank { given: 2, ndim: 1, .. })
        ));
    }

    #[test]
    fn full_selection_is_one_read() {
        let info = TensorInfo::new(Dtype::U16, vec![4, 5]);
        let plan = ReadPlan::new(&info, &[0..4, 0..5]);
        assert_eq!(
            plan.segments,
            vec![ReadSegment {
                offset: 0,
                len: 40,
                pieces: vec![0..40]
            }]
        );
    }

    #[test]
    fn leading_dimension_slice_is_contiguous() {
        let info = TensorInfo::new(Dtype::F32, vec![10, 4, 4]);
        let plan = ReadPlan::new(&info, &[2..5, 0..4, 0..4]);
        assert_eq!(plan.shape, vec![3, 4, 4]);
        assert_eq!(
            plan.segments,
            vec![ReadSegment {
                offset: 2 * 64,
                len: 3 * 64,
                pieces: vec![0..192]
            }]
        );
    }

    #[test]
    fn small_gaps_are_gathered() {
        let info = TensorInfo::new(Dtype::U8, vec![3, 8]);
        let plan = ReadPlan::new(&info, &[0..3, 2..5]);
        assert_eq!(
            plan.segments,
            vec![ReadSegment {
                offset: 2,
                len: 19,
                pieces: vec![0..3, 8..11, 16..19]
            }]
        );
        assert_eq!(plan.output_len(), 9);
        assert_eq!(plan.read_len(), 19);
    }

    #[test]
    fn large_gaps_are_separate_reads() {
        let info = TensorInfo::new(Dtype::U16, vec![2, 4096]);
        let plan = ReadPlan::new(&info, &[0..2, 0..2]);
        assert_eq!(
            plan.segments,
            vec![
                ReadSegment {
                    offset: 0,
                    len: 4,
                    pieces: vec![0..4]
                },
                ReadSegment {
                    offset: 8192,
                    len: 4,
                    pieces: vec![0..4]
                },
            ]
        );
    }

    #[test]
    fn empty_selection_reads_nothing() {
        let info = TensorInfo::new(Dtype::U8, vec![3, 8]);
        let plan = ReadPlan::new(&info, &[1..1, 0..8]);
        assert_eq!(plan.shape, vec![0, 8]);
        assert!(plan.segments.is_empty());
    }

    #[test]
    fn execute_collects_selected_bytes() {
        let info = TensorInfo::new(Dtype::U8, vec![3, 4]);
        let samples: Vec<u8> = (0..12).collect();
        let plan = ReadPlan::new(&info, &[1..3, 1..3]);
        let out = plan
            .execute(|offset, buffer: &mut [u8]| {
                let start = offset as usize;
                buffer.copy_from_slice(&samples[start..start + buffer.len()]);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(out, vec![5, 6, 9, 10]);
    }
}
