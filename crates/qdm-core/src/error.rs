//! Error kinds surfaced to callers and persisted as `last_error` on a download.

use std::fmt;

/// Classified failure reasons a download or segment can end up in.
///
/// Each variant maps to one of the error kinds a caller can branch on; the
/// `Display` impl is the human-readable string stored in `Download::last_error`.
#[derive(Debug, Clone)]
pub enum QdmError {
    /// Probe (HEAD / metadata fetch) failed. Soft: the caller may retry.
    ProbeFailed(String),
    /// A segment GET returned a non-2xx status.
    SegmentHttpError { status: u16 },
    /// A segment read/connection failed below the transport layer.
    SegmentIoError { reason: String },
    /// Writing a received chunk to its part-file failed.
    SegmentWriteError { reason: String },
    /// Assembling finished part-files into the final artifact failed.
    AssembleError { reason: String },
    /// Internal sentinel for a cancelled operation. Never surfaced to callers;
    /// callers observe `Stopped`/`Paused` state instead.
    Cancelled,
    /// The ingestion endpoint rejected a malformed request.
    BadRequest(String),
}

impl fmt::Display for QdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QdmError::ProbeFailed(reason) => write!(f, "probe failed: {reason}"),
            QdmError::SegmentHttpError { status } => write!(f, "segment request failed: HTTP {status}"),
            QdmError::SegmentIoError { reason } => write!(f, "segment connection error: {reason}"),
            QdmError::SegmentWriteError { reason } => write!(f, "failed writing segment data: {reason}"),
            QdmError::AssembleError { reason } => write!(f, "failed assembling download: {reason}"),
            QdmError::Cancelled => write!(f, "cancelled"),
            QdmError::BadRequest(reason) => write!(f, "bad request: {reason}"),
        }
    }
}

impl std::error::Error for QdmError {}

impl QdmError {
    /// True for kinds a caller is expected to retry/resume from rather than
    /// treat as a permanent failure of the artifact itself.
    pub fn is_soft(&self) -> bool {
        matches!(self, QdmError::ProbeFailed(_) | QdmError::SegmentHttpError { .. } | QdmError::SegmentIoError { .. })
    }
}
