//! Segment planning: partitions `[0, total_size)` into near-equal byte ranges.

use crate::model::{Segment, SegmentState};

/// Builds a segment plan for a given total size and segment count.
///
/// Segments are as equal as possible; the earliest segments absorb the
/// remainder so no segment differs from the rest by more than one byte.
/// Returns an empty vec if `total_size` is 0 or `segment_count` is 0 (the
/// caller falls back to the single-stream path in that case).
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 || segment_count == 0 {
        return Vec::new();
    }

    let segment_count_u64 = segment_count as u64;
    let base = total_size / segment_count_u64;
    let remainder = total_size % segment_count_u64;

    let mut out = Vec::with_capacity(segment_count);
    let mut offset = 0u64;

    for i in 0..segment_count_u64 {
        let len = base + if i < remainder { 1 } else { 0 };
        out.push(Segment {
            id: i as u32,
            offset,
            length: Some(len),
            downloaded: 0,
            state: SegmentState::NotStarted,
        });
        offset += len;
    }

    out
}

/// Minimum bytes a segment should carry before splitting further is worth the
/// extra connection overhead.
const MIN_BYTES_PER_SEGMENT: u64 = 256 * 1024;

/// Chooses how many segments to split a download of `total_size` bytes into,
/// bounded by `[min_segments, max_segments]`:
/// `N = clamp(ceil(total_size / 256KiB), min_segments, max_segments)`. Uses
/// the ceiling (rather than a strict floor) so a file just under a 256KiB
/// multiple still gets the extra segment spec.md's own worked example
/// (1,000,000 bytes -> 4 segments of 250,000 bytes) requires.
pub fn segment_count_for_size(total_size: u64, min_segments: usize, max_segments: usize) -> usize {
    let min = min_segments.max(1);
    let max = max_segments.max(min);
    if total_size == 0 {
        return min;
    }
    let by_size = total_size.div_ceil(MIN_BYTES_PER_SEGMENT).max(1) as usize;
    by_size.clamp(min, max)
}
