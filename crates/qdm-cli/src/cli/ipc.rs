//! Control socket: a single long-running `qdm serve` process owns the
//! `Store`/`Supervisor`/`QueueManager`; every other subcommand is a thin
//! client that sends one newline-delimited JSON `Request` and reads back one
//! `Response`.
//!
//! Grounded on the teacher's `control_socket.rs` (a Unix-domain-socket
//! listener spawned alongside `ddm run`, fed line-protocol "pause <id>" /
//! "cancel <id>" commands). Generalized from that fire-and-forget line
//! protocol to a request/response JSON protocol carrying every mutating
//! command the CLI now exposes, since a thin client needs a reply (e.g.
//! `status`'s download list, `queue create`'s assigned id) the teacher's
//! protocol never needed to return.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use qdm_core::model::{Download, Queue, Schedule};
use qdm_core::scheduler::QueueManager;
use qdm_core::store::Store;
use qdm_core::supervisor::Supervisor;

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Add {
        url: String,
        save_dir: std::path::PathBuf,
        file_name: Option<String>,
        max_segments: Option<usize>,
        queue_id: Option<String>,
        start: bool,
    },
    Start { id: String },
    Pause { id: String },
    Retry { id: String },
    Cancel { id: String },
    Remove { id: String },
    Status,
    QueueList,
    QueueCreate { name: String, max_concurrent: usize },
    QueueDelete { id: String },
    QueueEnable { id: String, enabled: bool },
    QueueSetMax { id: String, max_concurrent: usize },
    QueueSetSchedule { id: String, schedule: Option<Schedule> },
    QueueMove { download_id: String, queue_id: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Download(Download),
    Downloads(Vec<Download>),
    Queue(Queue),
    Queues(Vec<Queue>),
    Error(String),
}

/// Shared state the server loop dispatches requests against.
#[derive(Clone)]
pub struct Handlers {
    pub store: Store,
    pub supervisor: Supervisor,
    pub queues: QueueManager,
}

impl Handlers {
    async fn dispatch(&self, req: Request) -> Response {
        match self.try_dispatch(req).await {
            Ok(resp) => resp,
            Err(e) => Response::Error(format!("{e:#}")),
        }
    }

    async fn try_dispatch(&self, req: Request) -> Result<Response> {
        match req {
            Request::Add { url, save_dir, file_name, max_segments, queue_id, start } => {
                let download = self
                    .supervisor
                    .add(
                        url,
                        std::collections::HashMap::new(),
                        save_dir,
                        file_name,
                        max_segments,
                        queue_id.clone(),
                        qdm_core::model::now_iso8601(),
                    )
                    .await?;
                if let Some(queue_id) = &queue_id {
                    self.queues.move_to_queue(&download.id, queue_id).await?;
                }
                if start {
                    self.supervisor.start(&download.id).await?;
                }
                Ok(Response::Download(download))
            }
            Request::Start { id } => {
                self.supervisor.start(&id).await?;
                Ok(Response::Ok)
            }
            Request::Pause { id } => {
                self.supervisor.pause(&id);
                Ok(Response::Ok)
            }
            Request::Retry { id } => {
                self.supervisor.retry(&id).await?;
                Ok(Response::Ok)
            }
            Request::Cancel { id } => {
                self.supervisor.cancel(&id);
                Ok(Response::Ok)
            }
            Request::Remove { id } => {
                self.supervisor.remove(&id).await?;
                self.queues.evict(&id).await?;
                Ok(Response::Ok)
            }
            Request::Status => {
                let (downloads, _) = self.store.snapshot().await?;
                Ok(Response::Downloads(downloads))
            }
            Request::QueueList => {
                let (_, queues) = self.store.snapshot().await?;
                Ok(Response::Queues(queues))
            }
            Request::QueueCreate { name, max_concurrent } => {
                Ok(Response::Queue(self.queues.create_queue(name, max_concurrent).await?))
            }
            Request::QueueDelete { id } => {
                self.queues.delete_queue(&id).await?;
                Ok(Response::Ok)
            }
            Request::QueueEnable { id, enabled } => {
                self.queues.set_enabled(&id, enabled).await?;
                Ok(Response::Ok)
            }
            Request::QueueSetMax { id, max_concurrent } => {
                self.queues.set_max_concurrent(&id, max_concurrent).await?;
                Ok(Response::Ok)
            }
            Request::QueueSetSchedule { id, schedule } => {
                self.queues.set_schedule(&id, schedule).await?;
                Ok(Response::Ok)
            }
            Request::QueueMove { download_id, queue_id } => {
                self.queues.move_to_queue(&download_id, &queue_id).await?;
                Ok(Response::Ok)
            }
        }
    }
}

/// Spawns the control socket's accept loop on `path`, removing any stale
/// socket file left behind by a crashed prior `serve` process.
pub fn spawn_control_listener(handlers: Handlers, path: impl AsRef<Path>) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("control socket accept error: {e}");
                    continue;
                }
            };
            let handlers = handlers.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(handlers, stream).await {
                    tracing::debug!("control socket connection error: {e}");
                }
            });
        }
    });
    Ok(handle)
}

async fn serve_connection(handlers: Handlers, stream: UnixStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::Error(format!("malformed request: {e}"));
                write_response(&mut write_half, &resp).await?;
                continue;
            }
        };
        let resp = handlers.dispatch(req).await;
        write_response(&mut write_half, &resp).await?;
    }
    Ok(())
}

async fn write_response(write_half: &mut tokio::net::unix::OwnedWriteHalf, resp: &Response) -> Result<()> {
    let mut line = serde_json::to_string(resp)?;
    line.push('\n');
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Sends one `Request` to the `serve` process listening on `path` and
/// returns its `Response`. Fails fast with a clear message if no daemon is
/// listening, since every mutating command depends on one (spec §4.6/§4.7:
/// admission and the ingestion endpoint both live in that process).
pub async fn send_request(path: &Path, req: &Request) -> Result<Response> {
    if !path.exists() {
        bail!(
            "no qdm daemon running (socket not found at {}); start one with `qdm serve`",
            path.display()
        );
    }
    let stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("connect control socket {}", path.display()))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut line = serde_json::to_string(req)?;
    line.push('\n');
    write_half.write_all(line.as_bytes()).await?;

    let mut lines = BufReader::new(read_half).lines();
    let Some(line) = lines.next_line().await? else {
        bail!("qdm daemon closed the connection without responding");
    };
    let resp: Response = serde_json::from_str(&line).context("parse daemon response")?;
    Ok(resp)
}
