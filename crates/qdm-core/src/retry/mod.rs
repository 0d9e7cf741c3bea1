//! Error classification.
//!
//! Used by the segment worker to turn a failed attempt into a human-readable
//! `last_error` label. There is deliberately no automatic retry loop here:
//! spec behavior is that a segment failure is not itself retried within one
//! run (see `crate::supervisor`) — retrying is always an explicit caller
//! action, so this module classifies but never decides a backoff.

mod classify;
mod error;

pub use classify::{classify, classify_http_status, classify_transport_error, ErrorKind};
pub use error::SegmentError;
