//! `qdm queue ...` – manage download queues (spec §4.6).

use std::path::Path;

use anyhow::{bail, Result};
use qdm_core::model::Schedule;

use crate::cli::ipc::{send_request, Request, Response};

pub async fn run_queue_list(socket_path: &Path) -> Result<()> {
    match send_request(socket_path, &Request::QueueList).await? {
        Response::Queues(queues) => {
            if queues.is_empty() {
                println!("No queues.");
                return Ok(());
            }
            println!("{:<18} {:<16} {:<4} {:<8} {}", "ID", "NAME", "CAP", "ENABLED", "DOWNLOADS");
            for q in queues {
                println!(
                    "{:<18} {:<16} {:<4} {:<8} {}",
                    q.id,
                    q.name,
                    q.max_concurrent,
                    q.enabled,
                    q.download_ids.len()
                );
            }
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}

pub async fn run_queue_create(socket_path: &Path, name: &str, max_concurrent: usize) -> Result<()> {
    match send_request(socket_path, &Request::QueueCreate { name: name.to_string(), max_concurrent }).await? {
        Response::Queue(q) => {
            println!("Created queue {} ({})", q.id, q.name);
            Ok(())
        }
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}

pub async fn run_queue_delete(socket_path: &Path, id: &str) -> Result<()> {
    ok_or_bail(send_request(socket_path, &Request::QueueDelete { id: id.to_string() }).await?)?;
    println!("Deleted queue {id}");
    Ok(())
}

pub async fn run_queue_enable(socket_path: &Path, id: &str) -> Result<()> {
    ok_or_bail(send_request(socket_path, &Request::QueueEnable { id: id.to_string(), enabled: true }).await?)?;
    println!("Enabled queue {id}");
    Ok(())
}

pub async fn run_queue_disable(socket_path: &Path, id: &str) -> Result<()> {
    ok_or_bail(send_request(socket_path, &Request::QueueEnable { id: id.to_string(), enabled: false }).await?)?;
    println!("Disabled queue {id}");
    Ok(())
}

pub async fn run_queue_set_max(socket_path: &Path, id: &str, max_concurrent: usize) -> Result<()> {
    ok_or_bail(send_request(socket_path, &Request::QueueSetMax { id: id.to_string(), max_concurrent }).await?)?;
    println!("Queue {id} concurrency cap set to {max_concurrent}");
    Ok(())
}

/// `start_hhmm`/`end_hhmm` are minutes-since-midnight; pass `days` empty to
/// clear the queue's schedule and make it always-admitting.
pub async fn run_queue_set_schedule(
    socket_path: &Path,
    id: &str,
    start_hhmm: u16,
    end_hhmm: u16,
    days: Vec<qdm_core::model::Weekday>,
) -> Result<()> {
    let schedule = if days.is_empty() {
        None
    } else {
        Some(Schedule { start_hhmm, end_hhmm, days })
    };
    ok_or_bail(send_request(socket_path, &Request::QueueSetSchedule { id: id.to_string(), schedule }).await?)?;
    println!("Queue {id} schedule updated");
    Ok(())
}

pub async fn run_queue_move(socket_path: &Path, download_id: &str, queue_id: &str) -> Result<()> {
    ok_or_bail(
        send_request(
            socket_path,
            &Request::QueueMove {
                download_id: download_id.to_string(),
                queue_id: queue_id.to_string(),
            },
        )
        .await?,
    )?;
    println!("Moved {download_id} to queue {queue_id}");
    Ok(())
}

fn ok_or_bail(resp: Response) -> Result<()> {
    match resp {
        Response::Ok => Ok(()),
        Response::Error(e) => bail!(e),
        other => bail!("unexpected response: {other:?}"),
    }
}
