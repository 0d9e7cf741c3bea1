//! Range math and segment planning.
//!
//! Splits a download into N segments whose completion state lives directly on
//! [`crate::model::Segment`] (no separate resume bitmap: per-segment byte
//! counts already tell the supervisor exactly where to resume).

mod range;

pub use range::{plan_segments, segment_count_for_size};
