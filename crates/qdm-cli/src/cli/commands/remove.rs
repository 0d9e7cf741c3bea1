//! `qdm remove <id>` – remove a download from the catalog (refused while busy).

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_remove(socket_path: &Path, id: &str) -> Result<()> {
    match send_request(socket_path, &Request::Remove { id: id.to_string() }).await? {
        Response::Ok => {
            println!("Removed {id}");
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
