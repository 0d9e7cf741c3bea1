//! `qdm pause <id>` – pause a running download.

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_pause(socket_path: &Path, id: &str) -> Result<()> {
    match send_request(socket_path, &Request::Pause { id: id.to_string() }).await? {
        Response::Ok => {
            println!("Paused {id}");
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
