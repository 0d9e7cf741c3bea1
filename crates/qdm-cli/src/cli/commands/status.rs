//! `qdm status` – show status of every download known to the daemon.

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_status(socket_path: &Path) -> Result<()> {
    match send_request(socket_path, &Request::Status).await? {
        Response::Downloads(downloads) => {
            if downloads.is_empty() {
                println!("No downloads.");
                return Ok(());
            }
            println!(
                "{:<18} {:<12} {:<6} {:<10} {}",
                "ID", "STATUS", "PCT", "SIZE", "URL"
            );
            for d in downloads {
                let size_str = d
                    .total_size
                    .map(|s| format!("{s}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<18} {:<12} {:<6} {:<10} {}",
                    d.id,
                    format!("{:?}", d.status).to_lowercase(),
                    format!("{:.0}%", d.progress_pct),
                    size_str,
                    d.source_url
                );
            }
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
