//! Durable catalog of downloads and queues: two JSON documents
//! (`downloads.json`, `queues.json`) under the application's XDG state
//! directory, written by a single serialized writer task with atomic
//! temp-then-rename replace.
//!
//! Mirrors [`crate::host_policy::HostPolicy`]'s load/save pattern
//! (`host_policy/persist.rs`) applied to the richer `Download`/`Queue`
//! record set, and [`crate::storage::StorageWriter`]'s temp-then-rename
//! idiom for the write itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::model::{Download, DownloadStatus, Queue};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DownloadsFile {
    downloads: Vec<Download>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueuesFile {
    queues: Vec<Queue>,
}

/// Default directory for `downloads.json`/`queues.json`:
/// `~/.local/state/qdm/`.
pub fn default_data_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("qdm")?;
    Ok(xdg_dirs.get_state_home().join("qdm"))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let tmp_path = {
        let mut os = path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    };
    let json = serde_json::to_string_pretty(value).context("serialize store document")?;
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

fn read_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match std::fs::read(path) {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

/// On-disk state after loading, with crash-recovery already applied: any
/// download found `Downloading` or `Assembling` is rewritten to `Paused`
/// (the process died mid-transfer or mid-assembly; neither state is safe
/// to resume into blindly). Grounded on the teacher's
/// `resume_db::recover_running_jobs` (`running -> queued`), generalized to
/// this model's two in-flight states.
fn recover_crashed_downloads(downloads: &mut [Download]) {
    for d in downloads {
        if matches!(d.status, DownloadStatus::Downloading | DownloadStatus::Assembling) {
            tracing::warn!(download_id = %d.id, was = ?d.status, "recovering crashed download to paused");
            d.status = DownloadStatus::Paused;
            d.speed_bps = 0.0;
            d.eta_s = None;
        }
    }
}

/// Commands accepted by the store's single writer task. All mutation goes
/// through this task so concurrent supervisors never race on the same
/// JSON document.
enum Command {
    UpsertDownload(Box<Download>, oneshot::Sender<Result<()>>),
    RemoveDownload(String, oneshot::Sender<Result<()>>),
    UpsertQueue(Box<Queue>, oneshot::Sender<Result<()>>),
    RemoveQueue(String, oneshot::Sender<Result<()>>),
    Snapshot(oneshot::Sender<(Vec<Download>, Vec<Queue>)>),
}

/// Handle to the store's writer task. Cheap to clone; every clone shares
/// the same underlying task and in-memory state.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::Sender<Command>,
}

const COMMAND_CHANNEL_CAPACITY: usize = 64;

impl Store {
    /// Loads `downloads.json`/`queues.json` from `data_dir` (creating the
    /// directory and empty documents if absent), applies crash recovery,
    /// and spawns the single writer task that owns them for the rest of
    /// the process's life.
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        let downloads_path = data_dir.join("downloads.json");
        let queues_path = data_dir.join("queues.json");

        let mut downloads_file: DownloadsFile = read_json_or_default(&downloads_path)?;
        recover_crashed_downloads(&mut downloads_file.downloads);
        write_json_atomic(&downloads_path, &downloads_file)?;

        let queues_file: QueuesFile = read_json_or_default(&queues_path)?;

        let (tx, mut rx) = mpsc::channel::<Command>(COMMAND_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut downloads: HashMap<String, Download> = downloads_file
                .downloads
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect();
            let mut queues: HashMap<String, Queue> = queues_file
                .queues
                .into_iter()
                .map(|q| (q.id.clone(), q))
                .collect();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::UpsertDownload(download, reply) => {
                        downloads.insert(download.id.clone(), *download);
                        let result = flush_downloads(&downloads_path, &downloads);
                        let _ = reply.send(result);
                    }
                    Command::RemoveDownload(id, reply) => {
                        downloads.remove(&id);
                        let result = flush_downloads(&downloads_path, &downloads);
                        let _ = reply.send(result);
                    }
                    Command::UpsertQueue(queue, reply) => {
                        queues.insert(queue.id.clone(), *queue);
                        let result = flush_queues(&queues_path, &queues);
                        let _ = reply.send(result);
                    }
                    Command::RemoveQueue(id, reply) => {
                        queues.remove(&id);
                        let result = flush_queues(&queues_path, &queues);
                        let _ = reply.send(result);
                    }
                    Command::Snapshot(reply) => {
                        let d: Vec<Download> = downloads.values().cloned().collect();
                        let q: Vec<Queue> = queues.values().cloned().collect();
                        let _ = reply.send((d, q));
                    }
                }
            }
        });

        Ok(Self { tx })
    }

    pub async fn upsert_download(&self, download: Download) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::UpsertDownload(Box::new(download), reply_tx))
            .await
            .context("store writer task gone")?;
        reply_rx.await.context("store writer task dropped reply")?
    }

    pub async fn remove_download(&self, id: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveDownload(id.to_string(), reply_tx))
            .await
            .context("store writer task gone")?;
        reply_rx.await.context("store writer task dropped reply")?
    }

    pub async fn upsert_queue(&self, queue: Queue) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::UpsertQueue(Box::new(queue), reply_tx))
            .await
            .context("store writer task gone")?;
        reply_rx.await.context("store writer task dropped reply")?
    }

    pub async fn remove_queue(&self, id: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveQueue(id.to_string(), reply_tx))
            .await
            .context("store writer task gone")?;
        reply_rx.await.context("store writer task dropped reply")?
    }

    /// Snapshot of every download and queue currently known to the store.
    pub async fn snapshot(&self) -> Result<(Vec<Download>, Vec<Queue>)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply_tx))
            .await
            .context("store writer task gone")?;
        reply_rx.await.context("store writer task dropped reply")
    }
}

fn flush_downloads(path: &Path, downloads: &HashMap<String, Download>) -> Result<()> {
    let file = DownloadsFile {
        downloads: downloads.values().cloned().collect(),
    };
    write_json_atomic(path, &file)
}

fn flush_queues(path: &Path, queues: &HashMap<String, Queue>) -> Result<()> {
    let file = QueuesFile {
        queues: queues.values().cloned().collect(),
    };
    write_json_atomic(path, &file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn sample_download(id: &str, status: DownloadStatus) -> Download {
        Download {
            id: id.to_string(),
            source_url: "https://example.com/file.bin".into(),
            request_headers: StdHashMap::new(),
            file_name: "file.bin".into(),
            save_dir: "/tmp".into(),
            total_size: Some(100),
            resumable: true,
            status,
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
            etag: None,
            last_modified: None,
            queue_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_path_buf()).unwrap();
        store
            .upsert_download(sample_download("d1", DownloadStatus::Queued))
            .await
            .unwrap();
        let (downloads, _) = store.snapshot().await.unwrap();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].id, "d1");
    }

    #[tokio::test]
    async fn remove_download_drops_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_path_buf()).unwrap();
        store
            .upsert_download(sample_download("d1", DownloadStatus::Queued))
            .await
            .unwrap();
        store.remove_download("d1").await.unwrap();
        let (downloads, _) = store.snapshot().await.unwrap();
        assert!(downloads.is_empty());
    }

    #[tokio::test]
    async fn crash_recovery_rewrites_downloading_and_assembling_to_paused() {
        let dir = tempfile::tempdir().unwrap();
        let downloads_path = dir.path().join("downloads.json");
        let mut d1 = sample_download("d1", DownloadStatus::Downloading);
        d1.speed_bps = 512_000.0;
        d1.eta_s = Some(42);
        let mut d2 = sample_download("d2", DownloadStatus::Assembling);
        d2.speed_bps = 128_000.0;
        d2.eta_s = Some(7);
        let file = DownloadsFile {
            downloads: vec![
                d1,
                d2,
                sample_download("d3", DownloadStatus::Completed),
            ],
        };
        write_json_atomic(&downloads_path, &file).unwrap();

        let store = Store::open(dir.path().to_path_buf()).unwrap();
        let (downloads, _) = store.snapshot().await.unwrap();
        let mut by_id: HashMap<_, _> = downloads.into_iter().map(|d| (d.id.clone(), d)).collect();
        let recovered_d1 = by_id.remove("d1").unwrap();
        assert_eq!(recovered_d1.status, DownloadStatus::Paused);
        assert_eq!(recovered_d1.speed_bps, 0.0, "speed must reset on crash recovery");
        assert_eq!(recovered_d1.eta_s, None, "eta must reset on crash recovery");
        let recovered_d2 = by_id.remove("d2").unwrap();
        assert_eq!(recovered_d2.status, DownloadStatus::Paused);
        assert_eq!(recovered_d2.speed_bps, 0.0);
        assert_eq!(recovered_d2.eta_s, None);
        assert_eq!(by_id.remove("d3").unwrap().status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path().to_path_buf()).unwrap();
            store
                .upsert_download(sample_download("d1", DownloadStatus::Queued))
                .await
                .unwrap();
        }
        let reopened = Store::open(dir.path().to_path_buf()).unwrap();
        let (downloads, _) = reopened.snapshot().await.unwrap();
        assert_eq!(downloads.len(), 1);
    }
}
