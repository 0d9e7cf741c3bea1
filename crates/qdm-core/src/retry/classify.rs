//! Classify HTTP status and transport errors into error kinds the worker
//! labels `last_error` with.

use super::error::SegmentError;

/// High-level classification of a segment failure (spec §7: "last_error =
/// most recent segment failure summary"). Distinct from a retry decision —
/// nothing here decides whether to retry; spec §4.5 is explicit that a
/// segment failure is never auto-retried within one `start`, only via the
/// caller's explicit `retry` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is conventionally retryable but not throttling (5xx).
    Http5xx(u16),
    /// Any other error.
    Other,
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a `reqwest::Error`.
pub fn classify_transport_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        return ErrorKind::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a segment error into an [`ErrorKind`].
pub fn classify(e: &SegmentError) -> ErrorKind {
    match e {
        SegmentError::Transport(te) => classify_transport_error(te),
        SegmentError::Http(code) => classify_http_status(*code),
        SegmentError::PartialTransfer { .. } => ErrorKind::Connection,
        SegmentError::Storage(_) => ErrorKind::Other,
    }
}
