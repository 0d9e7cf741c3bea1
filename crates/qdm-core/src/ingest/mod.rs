//! Ingestion Endpoint: a loopback-only HTTP/1.1 listener that a browser-side
//! agent posts candidate downloads and media URLs to (spec §4.7).
//!
//! No example repo the teacher is drawn from runs an HTTP server of its own;
//! this module is enriched from the broader retrieval pack, specifically
//! `other_examples/manifests/Augani-stormdl` (the closest analog to this
//! spec's domain), which depends on `hyper` with the companion
//! `hyper-util`/`http-body-util` crates. The accept loop below is the
//! minimal idiomatic shape for a single-purpose loopback listener: a
//! `TcpListener::accept` loop handing each connection to
//! `hyper::server::conn::http1`, serving a `tower`-free `service_fn`
//! closure, rather than pulling in a full web framework the teacher never
//! needed elsewhere.

pub mod classify;
pub mod filter;
pub mod message;

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{QdmConfig, INGESTION_PORT_BUMP_ATTEMPTS};
use crate::events::{Event, EventBus};
use crate::model::{MediaItem, MediaKind};
use crate::supervisor::Supervisor;
use crate::url_model;

use classify::classify_media_kind;
use filter::is_admitted;
use message::{IngestionMessage, SyncSnapshot, TabUpdateMessage, VidMessage, VideoListEntry};

struct IngestState {
    config: QdmConfig,
    media: Vec<MediaItem>,
}

/// Owns the ingestion endpoint's in-memory state (config snapshot + observed
/// `MediaItem`s) and the `Supervisor`/`EventBus` handles it drives. Cheap to
/// clone; every clone shares the same state behind an async mutex, since a
/// handler never holds it across an await to another handler.
#[derive(Clone)]
pub struct IngestionEndpoint {
    supervisor: Supervisor,
    events: EventBus,
    state: Arc<AsyncMutex<IngestState>>,
}

impl IngestionEndpoint {
    pub fn new(supervisor: Supervisor, events: EventBus, config: QdmConfig) -> Self {
        Self {
            supervisor,
            events,
            state: Arc::new(AsyncMutex::new(IngestState {
                config,
                media: Vec::new(),
            })),
        }
    }

    /// Binds 127.0.0.1 starting at the configured port, bumping on
    /// `EADDRINUSE` up to [`INGESTION_PORT_BUMP_ATTEMPTS`] times, and spawns
    /// the accept loop on its own task. Returns the port actually bound
    /// (useful for tests that bind port 0 and need the OS-assigned one).
    pub async fn serve(self) -> anyhow::Result<u16> {
        let start_port = self.state.lock().await.config.ingestion_port;
        let (listener, bound_port) = bind_with_bump(start_port).await?;
        tracing::info!("ingestion endpoint listening on 127.0.0.1:{bound_port}");

        tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("ingestion endpoint accept error: {e}");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let this = self.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let this = this.clone();
                        async move { this.handle(req).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!("ingestion endpoint connection error: {e}");
                    }
                });
            }
        });

        Ok(bound_port)
    }

    async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let method = req.method().clone();
        if method == Method::OPTIONS {
            return Ok(cors_response(StatusCode::NO_CONTENT, Bytes::new()));
        }
        let path = req.uri().path().to_string();

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return Ok(cors_response(StatusCode::BAD_REQUEST, Bytes::new())),
        };

        // spec §7: "it always answers 200 with a sync snapshot unless the
        // body is malformed (400) or the handler panicked (500)". Routes
        // never touch in-flight downloads on the happy path, but a handler
        // bug shouldn't take the listener down with it.
        let outcome = AssertUnwindSafe(self.route(method, path, body)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => {
                let snapshot = self.snapshot().await;
                match serde_json::to_vec(&snapshot) {
                    Ok(body) => Ok(cors_response(StatusCode::OK, Bytes::from(body))),
                    Err(_) => Ok(cors_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())),
                }
            }
            Ok(Err(status)) => Ok(cors_response(status, Bytes::new())),
            Err(_) => Ok(cors_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())),
        }
    }

    async fn route(&self, method: Method, path: String, body: Bytes) -> Result<(), StatusCode> {
        match (method, path.as_str()) {
            (Method::GET, "/sync") => Ok(()),
            (Method::POST, "/download") => self.handle_download(&body).await,
            (Method::POST, "/media") => self.handle_media(&body).await,
            (Method::POST, "/vid") => self.handle_vid(&body).await,
            (Method::POST, "/tab-update") => self.handle_tab_update(&body).await,
            (Method::POST, "/clear") => self.handle_clear().await,
            (Method::POST, "/link") => self.handle_link(&body).await,
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn handle_download(&self, body: &Bytes) -> Result<(), StatusCode> {
        let msg: IngestionMessage = parse_body(body)?;
        let (admitted, save_dir) = {
            let state = self.state.lock().await;
            if !state.config.ingestion_enabled {
                return Ok(());
            }
            (
                is_admitted(&msg.url, msg.content_type.as_deref(), &state.config),
                state.config.download_dir.clone(),
            )
        };
        if !admitted {
            return Ok(());
        }
        self.admit_and_start(msg, save_dir, true).await;
        Ok(())
    }

    async fn handle_link(&self, body: &Bytes) -> Result<(), StatusCode> {
        let msgs: Vec<IngestionMessage> = parse_body(body)?;
        let (save_dir, enabled) = {
            let state = self.state.lock().await;
            (state.config.download_dir.clone(), state.config.ingestion_enabled)
        };
        if !enabled {
            return Ok(());
        }
        for msg in msgs {
            let admitted = {
                let state = self.state.lock().await;
                is_admitted(&msg.url, msg.content_type.as_deref(), &state.config)
            };
            if admitted {
                self.admit_and_start(msg, save_dir.clone(), false).await;
            }
        }
        Ok(())
    }

    /// Registers `msg` as a `Download` via the Supervisor, autostarting it
    /// when `autostart` is set (`/download`'s behavior; `/link` only queues).
    async fn admit_and_start(&self, msg: IngestionMessage, save_dir: std::path::PathBuf, autostart: bool) {
        let headers = msg.effective_headers();
        let added = self
            .supervisor
            .add(
                msg.url.clone(),
                headers,
                save_dir,
                msg.file.clone(),
                None,
                None,
                crate::model::now_iso8601(),
            )
            .await;
        match added {
            Ok(download) => {
                if autostart {
                    if let Err(e) = self.supervisor.start(&download.id).await {
                        tracing::warn!("ingestion endpoint: autostart failed for {}: {e}", download.id);
                    }
                }
            }
            Err(e) => tracing::warn!("ingestion endpoint: add failed for {}: {e}", msg.url),
        }
    }

    async fn handle_media(&self, body: &Bytes) -> Result<(), StatusCode> {
        let msg: IngestionMessage = parse_body(body)?;
        let mut state = self.state.lock().await;
        if !state.config.ingestion_enabled {
            return Ok(());
        }

        let kind = classify_media_kind(msg.content_type.as_deref(), &msg.url, msg.tab_url.as_deref());
        let canonical = url_model::normalize_for_dedup(&msg.url);
        let already_known = state
            .media
            .iter()
            .any(|m| url_model::normalize_for_dedup(&m.url) == canonical);
        if already_known {
            return Ok(());
        }

        let item = MediaItem {
            id: crate::model::generate_id(),
            url: canonical,
            page_url: msg.tab_url.clone(),
            title: msg.tab_title.clone(),
            kind,
            mime_type: msg.content_type.clone(),
            size_hint: msg.content_length,
            first_seen: crate::model::now_iso8601(),
            tab_id: msg.tab_id.clone(),
            request_headers: msg.effective_headers(),
        };
        let media_id = item.id.clone();
        state.media.push(item);
        drop(state);
        self.events.publish(Event::MediaAdded { media_id });
        Ok(())
    }

    async fn handle_vid(&self, body: &Bytes) -> Result<(), StatusCode> {
        let msg: VidMessage = parse_body(body)?;
        let known = {
            let state = self.state.lock().await;
            state.media.iter().any(|m| m.id == msg.vid)
        };
        if known {
            // The UI, not this endpoint, turns the requested item into an
            // actual `Download` by calling `/download` with its stored
            // headers once it observes this event (spec §4.7).
            self.events.publish(Event::MediaDownloadRequested { media_id: msg.vid });
        }
        Ok(())
    }

    async fn handle_tab_update(&self, body: &Bytes) -> Result<(), StatusCode> {
        let msg: TabUpdateMessage = parse_body(body)?;
        let mut state = self.state.lock().await;
        let mut updated = Vec::new();
        for item in state
            .media
            .iter_mut()
            .filter(|m| m.page_url.as_deref() == Some(msg.tab_url.as_str()))
        {
            item.title = Some(format!("{}{}", msg.name, extension_of(&item.url)));
            updated.push(item.id.clone());
        }
        drop(state);
        for media_id in updated {
            self.events.publish(Event::MediaUpdated { media_id });
        }
        Ok(())
    }

    async fn handle_clear(&self) -> Result<(), StatusCode> {
        let mut state = self.state.lock().await;
        state.media.clear();
        drop(state);
        self.events.publish(Event::MediaCleared);
        Ok(())
    }

    async fn snapshot(&self) -> SyncSnapshot {
        let state = self.state.lock().await;
        SyncSnapshot {
            enabled: state.config.ingestion_enabled,
            file_exts: state.config.file_exts.clone(),
            blocked_hosts: state.config.blocked_hosts.clone(),
            request_file_exts: state.config.request_file_exts.clone(),
            media_types: state.config.media_types.clone(),
            tabs_watcher: state.config.tabs_watcher.clone(),
            matching_hosts: state.config.matching_hosts.clone(),
            video_list: state
                .media
                .iter()
                .map(|m| VideoListEntry {
                    id: m.id.clone(),
                    text: m.title.clone().unwrap_or_else(|| m.url.clone()),
                    info: m.mime_type.clone().unwrap_or_default(),
                    tab_id: m.tab_id.clone(),
                    size: m.size_hint,
                    kind: media_kind_str(m.kind),
                })
                .collect(),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, StatusCode> {
    serde_json::from_slice(body).map_err(|_| StatusCode::BAD_REQUEST)
}

fn media_kind_str(kind: MediaKind) -> String {
    match kind {
        MediaKind::Hls => "hls",
        MediaKind::Dash => "dash",
        MediaKind::Youtube => "youtube",
        MediaKind::Video => "video",
        MediaKind::Audio => "audio",
        MediaKind::Image => "image",
        MediaKind::Other => "other",
    }
    .to_string()
}

/// Extracts `.ext` (dot included) from a URL's path basename, or `""` if the
/// basename has none. Used by `/tab-update` to preserve a MediaItem's
/// original extension while replacing its display name.
fn extension_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut segs| segs.next_back().map(str::to_string)))
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| format!(".{ext}")))
        .unwrap_or_default()
}

async fn bind_with_bump(start_port: u16) -> anyhow::Result<(TcpListener, u16)> {
    let mut port = start_port;
    for attempt in 0..=INGESTION_PORT_BUMP_ATTEMPTS {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < INGESTION_PORT_BUMP_ATTEMPTS => {
                tracing::debug!("ingestion endpoint port {port} in use, bumping");
                port = port.saturating_add(1);
            }
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::bail!("exhausted {INGESTION_PORT_BUMP_ATTEMPTS} port bump attempts starting at {start_port}")
}

fn cors_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_HEADERS, "*")
        .header(hyper::header::CACHE_CONTROL, "no-store")
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(body))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
