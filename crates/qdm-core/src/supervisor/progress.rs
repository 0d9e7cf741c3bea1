//! Progress channel message shape shared between segment workers and the
//! supervisor task that owns a [`crate::model::Download`].
//!
//! Workers never touch the `Download` record directly (spec §5: no shared
//! mutable state across tasks besides channels); they only ever send deltas
//! down a bounded `mpsc` channel the supervisor drains.

use crate::error::QdmError;

/// How a segment's attempt ended, when it ends.
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    Finished,
    Failed(QdmError),
    /// Observed cancellation (pause or stop); not an error, the supervisor
    /// already knows the intent via `crate::control::JobControl`.
    Cancelled,
}

/// One update from a segment worker to its supervisor.
#[derive(Debug, Clone)]
pub struct ProgressMsg {
    pub segment_id: u32,
    /// Bytes written since the last message for this segment (not cumulative).
    pub delta_bytes: u64,
    /// When set, the supervisor zeroes this segment's `downloaded` before
    /// applying `delta_bytes` (a non-resumable segment restarting from byte
    /// 0 after a pause; its previously counted bytes are no longer valid).
    pub reset_to_zero: bool,
    /// `Some` exactly once per segment, on its last message.
    pub terminal: Option<SegmentOutcome>,
    /// Set when this segment's request landed on a different host than the
    /// one it was issued for (a redirect it followed manually). The
    /// supervisor applies the first one it sees to `Download.source_url`
    /// (spec §3: mutated once per `start`).
    pub redirected_url: Option<String>,
}

impl ProgressMsg {
    pub fn chunk(segment_id: u32, delta_bytes: u64) -> Self {
        Self { segment_id, delta_bytes, reset_to_zero: false, terminal: None, redirected_url: None }
    }

    /// Signals that this segment's prior `downloaded` count is being discarded.
    pub fn reset(segment_id: u32) -> Self {
        Self { segment_id, delta_bytes: 0, reset_to_zero: true, terminal: None, redirected_url: None }
    }

    pub fn finished(segment_id: u32) -> Self {
        Self { segment_id, delta_bytes: 0, reset_to_zero: false, terminal: Some(SegmentOutcome::Finished), redirected_url: None }
    }

    pub fn failed(segment_id: u32, err: QdmError) -> Self {
        Self { segment_id, delta_bytes: 0, reset_to_zero: false, terminal: Some(SegmentOutcome::Failed(err)), redirected_url: None }
    }

    pub fn cancelled(segment_id: u32) -> Self {
        Self { segment_id, delta_bytes: 0, reset_to_zero: false, terminal: Some(SegmentOutcome::Cancelled), redirected_url: None }
    }

    /// Reports that this segment's request followed a redirect to a
    /// different host than `url` it was issued against.
    pub fn redirected(segment_id: u32, url: String) -> Self {
        Self { segment_id, delta_bytes: 0, reset_to_zero: false, terminal: None, redirected_url: Some(url) }
    }
}

/// Channel capacity for a download's progress stream. Small and bounded so a
/// slow supervisor applies backpressure to workers rather than unbounded
/// memory growth (spec §5 resource bounds).
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;
