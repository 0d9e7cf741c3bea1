//! `qdm cancel <id>` – stop a download and discard its scratch files.

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_cancel(socket_path: &Path, id: &str) -> Result<()> {
    match send_request(socket_path, &Request::Cancel { id: id.to_string() }).await? {
        Response::Ok => {
            println!("Cancelled {id}");
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
