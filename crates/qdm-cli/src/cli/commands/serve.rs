//! `qdm serve` – the long-running backend: owns the `Store`, `Supervisor`,
//! `QueueManager`, and Ingestion Endpoint, and answers the control socket
//! every other subcommand talks to.
//!
//! Grounded on the teacher's `ddm run`, which likewise recovered crashed
//! jobs, opened the control socket, and drove the scheduler loop to
//! completion from a single process — generalized here from "run once and
//! exit" to "run until terminated", since spec §4.7's ingestion endpoint has
//! no natural exit point (a browser-side agent may post to it at any time).

use anyhow::Result;
use qdm_core::config::QdmConfig;
use qdm_core::control::default_socket_path;
use qdm_core::events::EventBus;
use qdm_core::ingest::IngestionEndpoint;
use qdm_core::scheduler::QueueManager;
use qdm_core::store::{self, Store};
use qdm_core::supervisor::{Supervisor, SupervisorLimits};

use crate::cli::ipc::{spawn_control_listener, Handlers};

pub async fn run_serve(cfg: QdmConfig) -> Result<()> {
    let data_dir = store::default_data_dir()?;
    let store = Store::open(data_dir)?;
    let events = EventBus::new();
    let limits = SupervisorLimits {
        min_segments: cfg.min_segments,
        max_segments: cfg.normalized_max_segments(),
        speed_limit_kbps: cfg.speed_limit_kbps,
        max_total_connections: cfg.max_total_connections,
    };
    let supervisor = Supervisor::new(store.clone(), events.clone(), limits);
    let queues = QueueManager::new(store.clone(), supervisor.clone(), events.clone());
    queues.ensure_default_queue(cfg.max_concurrent_downloads).await?;

    let sweep_handle = queues.clone().spawn_periodic_sweep();
    let reactor_handle = queues.clone().spawn_event_reactor();
    queues.sweep().await?;

    let ingestion = IngestionEndpoint::new(supervisor.clone(), events.clone(), cfg.clone());
    let port = ingestion.serve().await?;
    tracing::info!("ingestion endpoint listening on 127.0.0.1:{port}");

    let socket_path = default_socket_path()?;
    let handlers = Handlers { store, supervisor, queues };
    spawn_control_listener(handlers, &socket_path)?;
    println!("qdm serve: control socket at {}", socket_path.display());
    println!("qdm serve: ingestion endpoint on 127.0.0.1:{port}");

    wait_for_shutdown_signal().await;
    sweep_handle.abort();
    reactor_handle.abort();
    Ok(())
}

async fn wait_for_shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler; blocking forever instead");
        std::future::pending::<()>().await;
    }
}
