//! Compares a download's recorded metadata with a fresh probe result.

use crate::model::Download;
use crate::probe::ProbeResult;

/// Which pieces of remote metadata disagree with what a download last
/// recorded, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub etag_changed: bool,
    pub last_modified_changed: bool,
    pub size_changed: bool,
}

impl RemoteChange {
    fn any(&self) -> bool {
        self.etag_changed || self.last_modified_changed || self.size_changed
    }

    /// Human-readable note suitable for `Download::last_error`, describing
    /// what changed and that the resume proceeded anyway.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.etag_changed {
            parts.push("ETag");
        }
        if self.last_modified_changed {
            parts.push("Last-Modified");
        }
        if self.size_changed {
            parts.push("size");
        }
        format!(
            "remote resource changed ({}) since this download was last probed; resumed anyway",
            parts.join(", ")
        )
    }
}

/// Compares `download`'s recorded ETag/Last-Modified/size with a fresh
/// `probe`. Returns `None` if nothing changed (or the download had no
/// recorded metadata yet, e.g. first run), `Some(RemoteChange)` otherwise.
pub fn check_for_resume(download: &Download, probe: &ProbeResult) -> Option<RemoteChange> {
    let has_stored =
        download.total_size.is_some() || download.etag.is_some() || download.last_modified.is_some();
    if !has_stored {
        return None;
    }

    let etag_changed = match (&download.etag, &probe.etag) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };
    let last_modified_changed = match (&download.last_modified, &probe.last_modified) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };
    let size_changed = match (download.total_size, probe.content_length) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };

    let change = RemoteChange {
        etag_changed,
        last_modified_changed,
        size_changed,
    };
    if change.any() {
        Some(change)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn download(total_size: Option<u64>, etag: Option<&str>, last_modified: Option<&str>) -> Download {
        Download {
            id: "d1".into(),
            source_url: "https://example.com/file.bin".into(),
            request_headers: HashMap::new(),
            file_name: "file.bin".into(),
            save_dir: "/tmp".into(),
            total_size,
            resumable: true,
            status: crate::model::DownloadStatus::Paused,
            segments: vec![],
            max_segments: 4,
            downloaded: 0,
            progress_pct: 0.0,
            speed_bps: 0.0,
            eta_s: None,
            date_added: "2026-01-01T00:00:00Z".into(),
            date_completed: None,
            last_error: None,
            category: None,
            etag: etag.map(String::from),
            last_modified: last_modified.map(String::from),
            queue_id: None,
        }
    }

    fn probe(content_length: Option<u64>, etag: Option<&str>, last_modified: Option<&str>) -> ProbeResult {
        ProbeResult {
            content_length,
            accept_ranges: true,
            etag: etag.map(String::from),
            last_modified: last_modified.map(String::from),
            content_disposition: None,
            content_type: None,
            final_url: "https://example.com/file.bin".into(),
        }
    }

    #[test]
    fn no_stored_metadata_is_not_a_change() {
        let d = download(None, None, None);
        let p = probe(Some(1000), Some("e1"), None);
        assert_eq!(check_for_resume(&d, &p), None);
    }

    #[test]
    fn matching_metadata_is_not_a_change() {
        let d = download(Some(1000), Some("e1"), None);
        let p = probe(Some(1000), Some("e1"), None);
        assert_eq!(check_for_resume(&d, &p), None);
    }

    #[test]
    fn etag_mismatch_is_reported_but_not_fatal() {
        let d = download(Some(1000), Some("e1"), None);
        let p = probe(Some(1000), Some("e2"), None);
        let change = check_for_resume(&d, &p).expect("change detected");
        assert!(change.etag_changed);
        assert!(change.describe().contains("ETag"));
    }

    #[test]
    fn size_mismatch_detected() {
        let d = download(Some(1000), None, None);
        let p = probe(Some(2000), None, None);
        let change = check_for_resume(&d, &p).expect("change detected");
        assert!(change.size_changed);
    }
}
