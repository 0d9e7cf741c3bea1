//! `qdm resume <id>` – resume a paused download (spec §4.5 `paused -> downloading`).

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_resume(socket_path: &Path, id: &str) -> Result<()> {
    match send_request(socket_path, &Request::Start { id: id.to_string() }).await? {
        Response::Ok => {
            println!("Resumed {id}");
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
