//! Segment download error type used for retry classification.

use std::fmt;

/// Error from a single segment attempt, kept distinct from [`crate::error::QdmError`]
/// so [`super::classify`] can inspect it before it's turned into a `last_error` string.
#[derive(Debug)]
pub enum SegmentError {
    /// The HTTP client reported a transport-level failure (timeout, connect,
    /// TLS, DNS, stream reset).
    Transport(reqwest::Error),
    /// HTTP response had a non-2xx status.
    Http(u16),
    /// Transfer completed but fewer bytes were written than the segment
    /// expected (e.g. server closed early).
    PartialTransfer { expected: u64, received: u64 },
    /// Disk/storage write failed (e.g. disk full, permission denied). Not retried.
    Storage(std::io::Error),
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Transport(e) => write!(f, "{e}"),
            SegmentError::Http(code) => write!(f, "HTTP {code}"),
            SegmentError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {expected} bytes, got {received}")
            }
            SegmentError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Transport(e) => Some(e),
            SegmentError::Storage(e) => Some(e),
            SegmentError::Http(_) | SegmentError::PartialTransfer { .. } => None,
        }
    }
}
