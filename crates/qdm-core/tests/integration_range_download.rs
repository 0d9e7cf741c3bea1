//! Integration test: local HTTP server with Range support, multi-segment
//! download through the real `Supervisor`, and the no-Range fallback path.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use qdm_core::events::EventBus;
use qdm_core::model::DownloadStatus;
use qdm_core::store::Store;
use qdm_core::supervisor::{Supervisor, SupervisorLimits};
use tempfile::tempdir;

fn limits() -> SupervisorLimits {
    SupervisorLimits {
        min_segments: 1,
        max_segments: 4,
        speed_limit_kbps: 0,
        max_total_connections: 32,
    }
}

async fn wait_for_terminal(store: &Store, download_id: &str) -> qdm_core::model::Download {
    for _ in 0..200 {
        let (downloads, _) = store.snapshot().await.expect("snapshot");
        if let Some(d) = downloads.into_iter().find(|d| d.id == download_id) {
            if matches!(d.status, DownloadStatus::Completed | DownloadStatus::Failed) {
                return d;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("download {download_id} did not reach a terminal state in time");
}

#[tokio::test]
async fn multi_segment_download_completes_and_file_matches() {
    let body: Vec<u8> = (0u8..100).cycle().take(64 * 1024).collect();
    let url = common::range_server::start(body.clone());

    let download_dir = tempdir().unwrap();
    let state_dir = tempdir().unwrap();
    let store = Store::open(state_dir.path().to_path_buf()).expect("open store");
    let events = EventBus::new();
    let supervisor = Supervisor::new(store.clone(), events, limits());

    let download = supervisor
        .add(
            url,
            HashMap::new(),
            download_dir.path().to_path_buf(),
            None,
            None,
            None,
            "2026-07-28T00:00:00Z".to_string(),
        )
        .await
        .expect("add");

    supervisor.start(&download.id).await.expect("start");
    let finished = wait_for_terminal(&store, &download.id).await;

    assert_eq!(finished.status, DownloadStatus::Completed, "download should complete");
    let final_path = download_dir.path().join(&finished.file_name);
    assert!(final_path.exists(), "final file should exist");
    let content = std::fs::read(&final_path).unwrap();
    assert_eq!(content.len(), body.len(), "file size must match");
    assert_eq!(content, body, "file content must match");
}

#[tokio::test]
async fn no_range_server_falls_back_to_single_stream_get() {
    let body: Vec<u8> = (0u8..100).cycle().take(32 * 1024).collect();
    let url = common::range_server::start_with_options(
        body.clone(),
        common::range_server::RangeServerOptions {
            head_allowed: true,
            support_ranges: false,
            advertise_ranges: false,
        },
    );

    let download_dir = tempdir().unwrap();
    let state_dir = tempdir().unwrap();
    let store = Store::open(state_dir.path().to_path_buf()).expect("open store");
    let events = EventBus::new();
    let supervisor = Supervisor::new(store.clone(), events, limits());

    let download = supervisor
        .add(
            url,
            HashMap::new(),
            download_dir.path().to_path_buf(),
            None,
            None,
            None,
            "2026-07-28T00:00:00Z".to_string(),
        )
        .await
        .expect("add");

    supervisor.start(&download.id).await.expect("start");
    let finished = wait_for_terminal(&store, &download.id).await;

    assert_eq!(finished.status, DownloadStatus::Completed, "download should complete");
    let final_path = download_dir.path().join(&finished.file_name);
    let content = std::fs::read(&final_path).unwrap();
    assert_eq!(content, body);
}

#[tokio::test]
async fn connection_budget_below_segment_count_still_completes() {
    // 4 segments contending for a 2-slot global connection budget: segments
    // must queue for a slot rather than deadlock or drop bytes.
    let body: Vec<u8> = (0u8..100).cycle().take(64 * 1024).collect();
    let url = common::range_server::start(body.clone());

    let download_dir = tempdir().unwrap();
    let state_dir = tempdir().unwrap();
    let store = Store::open(state_dir.path().to_path_buf()).expect("open store");
    let events = EventBus::new();
    let tight_limits = SupervisorLimits {
        min_segments: 1,
        max_segments: 4,
        speed_limit_kbps: 0,
        max_total_connections: 2,
    };
    let supervisor = Supervisor::new(store.clone(), events, tight_limits);

    let download = supervisor
        .add(
            url,
            HashMap::new(),
            download_dir.path().to_path_buf(),
            None,
            None,
            None,
            "2026-07-28T00:00:00Z".to_string(),
        )
        .await
        .expect("add");

    supervisor.start(&download.id).await.expect("start");
    let finished = wait_for_terminal(&store, &download.id).await;

    assert_eq!(finished.status, DownloadStatus::Completed, "download should complete");
    let final_path = download_dir.path().join(&finished.file_name);
    let content = std::fs::read(&final_path).unwrap();
    assert_eq!(content, body);
}
