//! Download Supervisor: one task per active download, owning its
//! [`crate::model::Download`] exclusively for the lifetime of a `start`
//! (spec §4.5/§5).
//!
//! Generalizes the teacher's single `bitmap_tx: Sender<Vec<u8>>` progress
//! channel into the richer [`progress::ProgressMsg`] shape so the
//! monotonic-progress and lifecycle-ordering guarantees in spec §5 hold
//! without ever locking the `Download`: workers only ever send deltas,
//! this module is the sole writer.

pub mod progress;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use tokio_util::sync::CancellationToken;

use crate::control::{CancelIntent, JobControl};
use crate::events::{Event, EventBus};
use crate::host_policy::HostPolicy;
use crate::model::{Download, DownloadStatus, Segment, SegmentState};
use crate::ratelimit::RateLimiter;
use crate::scheduler::GlobalConnectionBudget;
use crate::storage::{StorageWriter, StorageWriterBuilder};
use crate::store::Store;
use crate::{assembler, probe, safe_resume, segmenter, url_model, worker};

use progress::{ProgressMsg, SegmentOutcome, PROGRESS_CHANNEL_CAPACITY};

/// How often the supervisor persists progress and publishes a
/// `download:progress` event while a download is in flight (spec §5's
/// "install a progress ticker at 500ms").
const PROGRESS_TICK: Duration = Duration::from_millis(500);

/// Tuning knobs the supervisor needs from [`crate::config::QdmConfig`],
/// copied in rather than holding the whole config so tests can construct a
/// supervisor without going through disk-backed config loading.
#[derive(Debug, Clone)]
pub struct SupervisorLimits {
    pub min_segments: usize,
    pub max_segments: usize,
    pub speed_limit_kbps: u64,
    /// Process-wide cap on concurrently in-flight segment connections,
    /// across every active download (`QdmConfig::max_total_connections`).
    /// Distinct from a queue's `max_concurrent` (which counts downloads,
    /// not segment connections) and from `speed_limit_kbps` (which caps
    /// bytes/s, not connection count).
    pub max_total_connections: usize,
}

/// Coordinates every active download. Cheap to clone; clones share the same
/// Store, event bus, job-control registry, and HTTP client.
#[derive(Clone)]
pub struct Supervisor {
    store: Store,
    events: EventBus,
    jobs: Arc<JobControl>,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    host_policy: Arc<Mutex<HostPolicy>>,
    connection_budget: Arc<GlobalConnectionBudget>,
    limits: SupervisorLimits,
    /// Per-download status watch, so `pause`/`cancel` callers can await the
    /// actual transition instead of polling the Store.
    watchers: Arc<Mutex<HashMap<String, watch::Sender<DownloadStatus>>>>,
}

impl Supervisor {
    pub fn new(store: Store, events: EventBus, limits: SupervisorLimits) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(PRODUCT_USER_AGENT)
            // Segment workers follow redirects manually (spec §4.3 step 3)
            // so they can re-sanitize headers per hop and report a learned
            // redirect target back to the supervisor.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            store,
            events,
            jobs: Arc::new(JobControl::new()),
            client,
            rate_limiter: RateLimiter::new(limits.speed_limit_kbps),
            host_policy: Arc::new(Mutex::new(HostPolicy::new(limits.min_segments, limits.max_segments))),
            connection_budget: Arc::new(GlobalConnectionBudget::new(limits.max_total_connections)),
            limits,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn jobs(&self) -> Arc<JobControl> {
        self.jobs.clone()
    }

    /// Registers a new download (spec §4.5's `queued` initial state) and
    /// persists it. Does not start it — admission is the caller's (CLI
    /// immediate-start, or the Scheduler's) decision.
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        source_url: String,
        request_headers: HashMap<String, String>,
        save_dir: PathBuf,
        file_name_override: Option<String>,
        max_segments: Option<usize>,
        queue_id: Option<String>,
        now_iso8601: String,
    ) -> anyhow::Result<Download> {
        let id = crate::model::generate_id();
        let probe_result = probe::probe_best_effort(&source_url, &request_headers).await;

        let file_name = url_model::derive_filename_for_download(
            file_name_override.as_deref(),
            probe_result.content_disposition.as_deref(),
            probe_result.content_type.as_deref(),
            &probe_result.final_url,
            &id,
        );

        let category = crate::model::derive_category(&file_name);

        let download = Download {
            id: id.clone(),
            source_url: probe_result.final_url.clone(),
            request_headers,
            file_name,
            save_dir,
            total_size: probe_result.content_length,
            resumable: probe_result.accept_ranges || probe_result.content_length.is_some(),
            status: DownloadStatus::Queued,
            segments: Vec::new(),
            max_segments: max_segments.unwrap_or(self.limits.max_segments),
            downloaded: 0,
            progress_pct: 0.0,
            speed_bps: 0.0,
            eta_s: None,
            date_added: now_iso8601,
            date_completed: None,
            last_error: None,
            category: Some(category),
            etag: probe_result.etag,
            last_modified: probe_result.last_modified,
            queue_id,
        };

        {
            let mut policy = self.host_policy.lock().unwrap();
            let _ = policy.record_range_support(&download.source_url, probe_result.accept_ranges);
        }

        self.store.upsert_download(download.clone()).await?;
        self.events.publish(Event::Added {
            download_id: download.id.clone(),
        });
        Ok(download)
    }

    /// Starts (or resumes) a download: spec §4.5's `start` behavior. Spawns
    /// the supervisor task and returns immediately; completion is observed
    /// via the Event Bus or by polling the Store.
    pub async fn start(&self, download_id: &str) -> anyhow::Result<()> {
        let (downloads, _) = self.store.snapshot().await?;
        let Some(mut download) = downloads.into_iter().find(|d| d.id == download_id) else {
            anyhow::bail!("unknown download id: {download_id}");
        };
        if matches!(download.status, DownloadStatus::Downloading | DownloadStatus::Assembling) {
            // Re-entry while a supervisor task already owns this download is
            // forbidden (spec §5: "callers see `busy` error").
            anyhow::bail!("download {download_id} is busy");
        }

        download.status = DownloadStatus::Downloading;
        download.last_error = None;
        self.store.upsert_download(download.clone()).await?;
        self.publish_status(&download);

        let this = self.clone();
        tokio::spawn(async move {
            this.run_download(download).await;
        });
        Ok(())
    }

    pub fn pause(&self, download_id: &str) {
        self.jobs.request_pause(download_id);
    }

    pub fn cancel(&self, download_id: &str) {
        self.jobs.request_stop(download_id);
    }

    /// Caller-driven retry (spec §4.5 `failed -> downloading`): resets every
    /// non-finished segment and re-enters `start`.
    pub async fn retry(&self, download_id: &str) -> anyhow::Result<()> {
        let (downloads, _) = self.store.snapshot().await?;
        let Some(mut download) = downloads.into_iter().find(|d| d.id == download_id) else {
            anyhow::bail!("unknown download id: {download_id}");
        };
        download.reset_unfinished_segments();
        download.status = DownloadStatus::Queued;
        self.store.upsert_download(download).await?;
        self.start(download_id).await
    }

    /// Removes a download from the catalog (spec §4.5 `-> (removed)`).
    /// Refuses while the download is actively running; callers must cancel
    /// first.
    pub async fn remove(&self, download_id: &str) -> anyhow::Result<()> {
        let (downloads, _) = self.store.snapshot().await?;
        if let Some(d) = downloads.into_iter().find(|d| d.id == download_id) {
            if matches!(d.status, DownloadStatus::Downloading | DownloadStatus::Assembling) {
                anyhow::bail!("download {download_id} is busy; cancel before removing");
            }
        }
        self.store.remove_download(download_id).await?;
        self.events.publish(Event::Removed {
            download_id: download_id.to_string(),
        });
        Ok(())
    }

    fn publish_status(&self, download: &Download) {
        self.events.publish(Event::StatusChanged {
            download_id: download.id.clone(),
            status: download.status,
        });
        if let Some(tx) = self.watchers.lock().unwrap().get(&download.id) {
            let _ = tx.send(download.status);
        }
    }

    /// The supervisor task body: owns `download` exclusively until this
    /// `start` either completes, fails, or is paused/stopped.
    async fn run_download(&self, mut download: Download) {
        let cancel = self.jobs.register(&download.id);

        if download.segments.is_empty() {
            if let Err(e) = self.plan_segments(&mut download).await {
                download.status = DownloadStatus::Failed;
                download.last_error = Some(e.to_string());
                let _ = self.store.upsert_download(download.clone()).await;
                self.publish_status(&download);
                self.events.publish(Event::Failed {
                    download_id: download.id.clone(),
                    reason: e.to_string(),
                });
                self.jobs.unregister(&download.id);
                return;
            }
        } else if let Some(change) = self.check_safe_resume(&mut download).await {
            download.last_error = Some(change.describe());
        }

        let scratch_dir = download.scratch_dir();
        if let Err(e) = std::fs::create_dir_all(&scratch_dir) {
            download.status = DownloadStatus::Failed;
            download.last_error = Some(format!("failed to create scratch dir: {e}"));
            let _ = self.store.upsert_download(download.clone()).await;
            self.publish_status(&download);
            self.jobs.unregister(&download.id);
            return;
        }

        let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressMsg>(PROGRESS_CHANNEL_CAPACITY);
        let mut workers = JoinSet::new();
        let mut remaining_segments = 0usize;

        for segment in download.segments.iter().filter(|s| !s.is_finished()) {
            remaining_segments += 1;
            let storage = match open_segment_storage(&scratch_dir, segment) {
                Ok(s) => s,
                Err(e) => {
                    let _ = progress_tx
                        .send(ProgressMsg::failed(
                            segment.id,
                            crate::error::QdmError::SegmentWriteError { reason: e.to_string() },
                        ))
                        .await;
                    continue;
                }
            };
            let client = self.client.clone();
            let url = download.source_url.clone();
            let headers = download.request_headers.clone();
            let segment = segment.clone();
            let tx = progress_tx.clone();
            let cancel = cancel.clone();
            let rate_limiter = self.rate_limiter.clone();
            let budget = self.connection_budget.clone();
            workers.spawn(async move {
                if !acquire_connection_slot(&budget, &cancel).await {
                    let _ = tx.send(ProgressMsg::cancelled(segment.id)).await;
                    return;
                }
                let _ = worker::run_segment(&client, &url, &headers, &segment, storage, &tx, cancel, &rate_limiter).await;
                budget.release(1);
            });
        }
        drop(progress_tx);

        let mut last_persist = Instant::now();
        let mut speed_window_start = Instant::now();
        let mut speed_window_bytes: u64 = 0;
        let mut finished_or_terminal = 0usize;
        let mut hard_failed = false;
        let mut ticker = tokio::time::interval(PROGRESS_TICK);

        loop {
            tokio::select! {
                msg = progress_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Some(redirected_url) = &msg.redirected_url {
                        // Applied at most once per `start`: later segments
                        // already use `download.source_url` as set here, so
                        // repeat reports for the same host are idempotent.
                        download.source_url = redirected_url.clone();
                    }
                    if let Some(seg) = download.segments.iter_mut().find(|s| s.id == msg.segment_id) {
                        if msg.reset_to_zero {
                            seg.downloaded = 0;
                        }
                        seg.downloaded += msg.delta_bytes;
                        speed_window_bytes += msg.delta_bytes;
                        if let Some(outcome) = &msg.terminal {
                            finished_or_terminal += 1;
                            match outcome {
                                SegmentOutcome::Finished => seg.state = SegmentState::Finished,
                                SegmentOutcome::Failed(err) => {
                                    seg.state = SegmentState::Failed;
                                    download.last_error = Some(err.to_string());
                                    hard_failed = true;
                                }
                                SegmentOutcome::Cancelled => {
                                    // leave segment state as-is (Running if mid-flight);
                                    // the pause/stop path below decides the download's fate.
                                }
                            }
                        }
                    }
                    download.recompute_progress();
                    if finished_or_terminal >= remaining_segments {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let elapsed = speed_window_start.elapsed().as_secs_f64().max(0.001);
                    download.speed_bps = speed_window_bytes as f64 / elapsed;
                    speed_window_start = Instant::now();
                    speed_window_bytes = 0;
                    if let Some(total) = download.total_size {
                        if download.speed_bps > 0.0 {
                            let remaining = total.saturating_sub(download.downloaded);
                            download.eta_s = Some((remaining as f64 / download.speed_bps) as u64);
                        }
                    }
                    if last_persist.elapsed() >= PROGRESS_TICK {
                        let _ = self.store.upsert_download(download.clone()).await;
                        self.events.publish(Event::Progress {
                            download_id: download.id.clone(),
                            downloaded: download.downloaded,
                            total_size: download.total_size,
                            speed_bps: download.speed_bps,
                        });
                        last_persist = Instant::now();
                    }
                }
            }
        }

        while workers.join_next().await.is_some() {}

        let intent = self.jobs.intent(&download.id);
        self.jobs.unregister(&download.id);

        if cancel.is_cancelled() {
            match intent {
                Some(CancelIntent::Stop) => {
                    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                    download.status = DownloadStatus::Stopped;
                    let _ = self.store.upsert_download(download.clone()).await;
                    self.publish_status(&download);
                }
                _ => {
                    download.status = DownloadStatus::Paused;
                    download.speed_bps = 0.0;
                    let _ = self.store.upsert_download(download.clone()).await;
                    self.publish_status(&download);
                }
            }
            return;
        }

        if hard_failed || !download.all_segments_finished() {
            download.status = DownloadStatus::Failed;
            download.speed_bps = 0.0;
            let reason = download.last_error.clone().unwrap_or_else(|| "segment failed".into());
            let _ = self.store.upsert_download(download.clone()).await;
            self.publish_status(&download);
            self.events.publish(Event::Failed {
                download_id: download.id.clone(),
                reason,
            });
            return;
        }

        download.status = DownloadStatus::Assembling;
        download.speed_bps = 0.0;
        let _ = self.store.upsert_download(download.clone()).await;
        self.publish_status(&download);

        match assembler::assemble(&download).await {
            Ok(()) => {
                download.status = DownloadStatus::Completed;
                download.date_completed = Some(crate::model::now_iso8601());
                let _ = self.store.upsert_download(download.clone()).await;
                self.publish_status(&download);
                self.events.publish(Event::Completed {
                    download_id: download.id.clone(),
                });
            }
            Err(e) => {
                download.status = DownloadStatus::Failed;
                download.last_error = Some(e.to_string());
                let _ = self.store.upsert_download(download.clone()).await;
                self.publish_status(&download);
                self.events.publish(Event::Failed {
                    download_id: download.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn plan_segments(&self, download: &mut Download) -> anyhow::Result<()> {
        if download.total_size.is_none() || !download.resumable {
            download.segments = vec![Segment {
                id: 0,
                offset: 0,
                length: None,
                downloaded: 0,
                state: SegmentState::NotStarted,
            }];
            return Ok(());
        }
        let total = download.total_size.unwrap();
        let adaptive = self
            .host_policy
            .lock()
            .unwrap()
            .adaptive_segment_count_for_url(&download.source_url)
            .unwrap_or(download.max_segments);
        let cap = adaptive.min(download.max_segments).max(1);
        let count = segmenter::segment_count_for_size(total, self.limits.min_segments, cap);
        download.segments = segmenter::plan_segments(total, count);
        Ok(())
    }

    /// Re-probes the remote resource before resuming and applies the
    /// "mutate `source_url` once per `start`" rule (spec §3) using the
    /// re-probe's `final_url`, same as `add()` does for a brand-new
    /// download. Takes `&mut Download` so it can write the refreshed URL
    /// back directly rather than handing it back for the caller to apply.
    async fn check_safe_resume(&self, download: &mut Download) -> Option<safe_resume::RemoteChange> {
        let probe_result = probe::probe_best_effort(&download.source_url, &download.request_headers).await;
        let change = safe_resume::check_for_resume(download, &probe_result);
        download.source_url = probe_result.final_url;
        change
    }
}

/// Opens (or creates and preallocates) the part-file storage writer for one
/// segment. Implements the crash-restart rule (spec §9): the part-file is
/// truncated to `segment.downloaded` rather than trusted ahead of it.
fn open_segment_storage(scratch_dir: &std::path::Path, segment: &Segment) -> anyhow::Result<StorageWriter> {
    let part_path = scratch_dir.join(segment.part_file_name());
    if part_path.exists() {
        let writer = StorageWriter::open_existing(&part_path)?;
        truncate_part_file(&part_path, segment.downloaded)?;
        return Ok(writer);
    }
    let mut builder = StorageWriterBuilder::create(&part_path)?;
    if let Some(len) = segment.length {
        builder.preallocate(len)?;
    }
    Ok(builder.build())
}

fn truncate_part_file(path: &std::path::Path, len: u64) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

/// How often a segment waiting on the process-wide connection budget polls
/// for a free slot.
const BUDGET_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Blocks until a slot is reserved from `budget`, or `cancel` fires first.
/// Returns `false` on cancellation (caller reports the segment cancelled
/// without ever issuing its request).
async fn acquire_connection_slot(budget: &GlobalConnectionBudget, cancel: &CancellationToken) -> bool {
    loop {
        if budget.reserve(1) == 1 {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(BUDGET_POLL_INTERVAL) => {}
        }
    }
}

const PRODUCT_USER_AGENT: &str = "qdm/0.1";

#[cfg(test)]
mod tests {
    use super::*;

    fn make_limits() -> SupervisorLimits {
        SupervisorLimits {
            min_segments: 1,
            max_segments: 8,
            speed_limit_kbps: 0,
            max_total_connections: 32,
        }
    }

    #[tokio::test]
    async fn add_registers_a_queued_download_and_publishes_added() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_path_buf()).unwrap();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let supervisor = Supervisor::new(store.clone(), events, make_limits());

        let download = supervisor
            .add(
                "https://example.com/does-not-resolve-in-tests.bin".into(),
                HashMap::new(),
                dir.path().to_path_buf(),
                Some("custom.bin".into()),
                None,
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .await
            .unwrap();

        assert_eq!(download.status, DownloadStatus::Queued);
        assert_eq!(download.file_name, "custom.bin");
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::Added { .. }));
    }

    #[tokio::test]
    async fn start_rejects_unknown_download_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_path_buf()).unwrap();
        let events = EventBus::new();
        let supervisor = Supervisor::new(store, events, make_limits());
        let result = supervisor.start("does-not-exist").await;
        assert!(result.is_err());
    }

    #[test]
    fn open_segment_storage_truncates_existing_part_file_to_persisted_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment {
            id: 0,
            offset: 0,
            length: Some(10),
            downloaded: 4,
            state: SegmentState::Running,
        };
        let part_path = dir.path().join(segment.part_file_name());
        std::fs::write(&part_path, b"this is longer than four bytes").unwrap();

        let _writer = open_segment_storage(dir.path(), &segment).unwrap();
        let len = std::fs::metadata(&part_path).unwrap().len();
        assert_eq!(len, 4);
    }
}
