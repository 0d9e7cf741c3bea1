//! Safe resume: detect whether the remote resource changed since a
//! download's metadata was last recorded.
//!
//! Unlike a hard validation gate, a changed ETag/Last-Modified/size does not
//! block resuming here — the supervisor state machine has no "confirm
//! before resume" state to route a mismatch through, so a mismatch is
//! recorded as an advisory `last_error` note and the resume proceeds. A
//! caller that wants certainty can inspect the note and explicitly retry
//! with a fresh download instead.

mod check;

pub use check::{check_for_resume, RemoteChange};
