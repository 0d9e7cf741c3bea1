//! `qdm retry <id>` – re-enter a failed download (spec §4.5 `failed -> downloading`).

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_retry(socket_path: &Path, id: &str) -> Result<()> {
    match send_request(socket_path, &Request::Retry { id: id.to_string() }).await? {
        Response::Ok => {
            println!("Retrying {id}");
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
