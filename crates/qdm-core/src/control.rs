//! Job control for pause/cancel: shared cancellation tokens per download.
//!
//! Each running download is registered with a [`tokio_util::sync::CancellationToken`]
//! (the async analogue of a shared abort flag): segment workers `select!`
//! between their next chunk and the token, so cancellation is observed within
//! one suspension point rather than a polling interval. A caller (CLI command,
//! ingestion endpoint handler) requests pause or stop; the supervisor reads
//! back which was requested to decide whether to land in `Paused` (scratch
//! kept) or `Stopped` (scratch deleted).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Default path for the CLI's control socket, `~/.local/state/qdm/qdm.sock`
/// (same XDG state directory [`crate::store::default_data_dir`] uses).
pub fn default_socket_path() -> Result<PathBuf> {
    Ok(crate::store::default_data_dir()?.join("qdm.sock"))
}

/// Sentinel error surfaced by a segment worker or supervisor loop when it
/// observes cancellation. Never surfaced to a caller as `last_error` — the
/// supervisor maps it to `Paused` or `Stopped` instead (spec: `cancelled` is
/// an internal sentinel, not a caller-visible error kind).
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Why a running download's cancellation token was tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelIntent {
    /// Caller paused the download; progress and part-files are kept.
    Pause,
    /// Caller stopped the download; scratch directory is deleted.
    Stop,
}

struct Registration {
    token: CancellationToken,
    intent: std::sync::Mutex<Option<CancelIntent>>,
}

/// Shared registry of download id -> cancellation token. One instance is
/// owned by the scheduler and handed to every download supervisor task; the
/// CLI and ingestion endpoint both signal through the same registry.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<String, Arc<Registration>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting download; returns the token its workers select on.
    pub fn register(&self, download_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let reg = Arc::new(Registration {
            token: token.clone(),
            intent: std::sync::Mutex::new(None),
        });
        self.jobs
            .write()
            .unwrap()
            .insert(download_id.to_string(), reg);
        token
    }

    /// Unregister a download (call once its supervisor task exits).
    pub fn unregister(&self, download_id: &str) {
        self.jobs.write().unwrap().remove(download_id);
    }

    pub fn request_pause(&self, download_id: &str) {
        self.request(download_id, CancelIntent::Pause);
    }

    pub fn request_stop(&self, download_id: &str) {
        self.request(download_id, CancelIntent::Stop);
    }

    fn request(&self, download_id: &str, intent: CancelIntent) {
        if let Some(reg) = self.jobs.read().unwrap().get(download_id) {
            *reg.intent.lock().unwrap() = Some(intent);
            reg.token.cancel();
        }
    }

    /// The intent recorded for a download's most recent cancellation, if any.
    pub fn intent(&self, download_id: &str) -> Option<CancelIntent> {
        self.jobs
            .read()
            .unwrap()
            .get(download_id)
            .and_then(|reg| *reg.intent.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_pause_cancels_token_and_records_intent() {
        let jc = JobControl::new();
        let token = jc.register("d1");
        assert!(!token.is_cancelled());
        jc.request_pause("d1");
        assert!(token.is_cancelled());
        assert_eq!(jc.intent("d1"), Some(CancelIntent::Pause));
    }

    #[test]
    fn unregister_drops_the_token() {
        let jc = JobControl::new();
        jc.register("d1");
        jc.unregister("d1");
        assert_eq!(jc.intent("d1"), None);
        // requesting on an unregistered id is a no-op, not a panic
        jc.request_stop("d1");
    }
}
