//! `qdm add <url>` – add a new download to the running daemon's catalog.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

#[allow(clippy::too_many_arguments)]
pub async fn run_add(
    socket_path: &Path,
    url: &str,
    save_dir: PathBuf,
    file_name: Option<String>,
    max_segments: Option<usize>,
    queue_id: Option<String>,
    start: bool,
) -> Result<()> {
    let req = Request::Add {
        url: url.to_string(),
        save_dir,
        file_name,
        max_segments,
        queue_id,
        start,
    };
    match send_request(socket_path, &req).await? {
        Response::Download(download) => {
            println!("Added download {} for {}", download.id, download.source_url);
            if start {
                println!("  started");
            }
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
