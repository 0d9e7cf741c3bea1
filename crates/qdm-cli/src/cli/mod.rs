//! CLI for the QDM download manager.

pub mod ipc;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use qdm_core::config;
use qdm_core::control::default_socket_path;
use qdm_core::model::Weekday;

use commands::{
    run_add, run_cancel, run_pause, run_queue_create, run_queue_delete, run_queue_disable,
    run_queue_enable, run_queue_list, run_queue_move, run_queue_set_max, run_queue_set_schedule,
    run_remove, run_resume, run_retry, run_serve, run_status,
};

/// Top-level CLI for the QDM download manager.
#[derive(Debug, Parser)]
#[command(name = "qdm")]
#[command(about = "QDM: segmented, resumable download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the backend: engine, queue scheduler, and ingestion endpoint.
    /// Every other command talks to this process over a control socket.
    Serve,

    /// Add a new download.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Directory to save into (default: the configured download_dir).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<std::path::PathBuf>,
        /// Override the derived file name.
        #[arg(long, value_name = "NAME")]
        file_name: Option<String>,
        /// Cap this download's own segment count below the configured max.
        #[arg(long, value_name = "N")]
        max_segments: Option<usize>,
        /// Place the download directly into this queue instead of the default.
        #[arg(long, value_name = "QUEUE_ID")]
        queue: Option<String>,
        /// Start downloading immediately instead of leaving it queued.
        #[arg(long)]
        start: bool,
    },

    /// Show status of every download.
    Status,

    /// Pause a running download by id.
    Pause { id: String },

    /// Resume a paused download by id.
    Resume { id: String },

    /// Retry a failed download by id.
    Retry { id: String },

    /// Cancel a download and discard its progress.
    Cancel { id: String },

    /// Remove a download from the catalog. Refused while it is active;
    /// cancel first.
    Remove { id: String },

    /// Manage download queues.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List every queue.
    List,
    /// Create a new queue.
    Create {
        name: String,
        #[arg(long, default_value = "3")]
        max_concurrent: usize,
    },
    /// Delete a queue (refused for the sole remaining queue).
    Delete { id: String },
    /// Enable a queue's admission sweep.
    Enable { id: String },
    /// Disable a queue's admission sweep.
    Disable { id: String },
    /// Change a queue's concurrency cap.
    SetMax { id: String, max_concurrent: usize },
    /// Set or clear a queue's weekly admission window.
    SetSchedule {
        id: String,
        /// Omit both time args (or pass no --day) to clear the schedule.
        #[arg(long, value_name = "HH:MM")]
        start: Option<String>,
        #[arg(long, value_name = "HH:MM")]
        end: Option<String>,
        #[arg(long = "day", value_name = "mon|tue|wed|thu|fri|sat|sun")]
        days: Vec<String>,
    },
    /// Move a download into a different queue.
    Move { download_id: String, queue_id: String },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let socket_path = default_socket_path()?;

        match cli.command {
            CliCommand::Serve => run_serve(cfg).await?,
            CliCommand::Add { url, download_dir, file_name, max_segments, queue, start } => {
                let dir = download_dir.unwrap_or(cfg.download_dir);
                run_add(&socket_path, &url, dir, file_name, max_segments, queue, start).await?
            }
            CliCommand::Status => run_status(&socket_path).await?,
            CliCommand::Pause { id } => run_pause(&socket_path, &id).await?,
            CliCommand::Resume { id } => run_resume(&socket_path, &id).await?,
            CliCommand::Retry { id } => run_retry(&socket_path, &id).await?,
            CliCommand::Cancel { id } => run_cancel(&socket_path, &id).await?,
            CliCommand::Remove { id } => run_remove(&socket_path, &id).await?,
            CliCommand::Queue(cmd) => run_queue_command(&socket_path, cmd).await?,
            CliCommand::Completions { shell } => {
                let mut command = Cli::command();
                let name = command.get_name().to_string();
                clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            }
        }

        Ok(())
    }
}

async fn run_queue_command(socket_path: &std::path::Path, cmd: QueueCommand) -> Result<()> {
    match cmd {
        QueueCommand::List => run_queue_list(socket_path).await,
        QueueCommand::Create { name, max_concurrent } => run_queue_create(socket_path, &name, max_concurrent).await,
        QueueCommand::Delete { id } => run_queue_delete(socket_path, &id).await,
        QueueCommand::Enable { id } => run_queue_enable(socket_path, &id).await,
        QueueCommand::Disable { id } => run_queue_disable(socket_path, &id).await,
        QueueCommand::SetMax { id, max_concurrent } => run_queue_set_max(socket_path, &id, max_concurrent).await,
        QueueCommand::SetSchedule { id, start, end, days } => {
            let start_hhmm = start.as_deref().map(parse_hhmm).transpose()?.unwrap_or(0);
            let end_hhmm = end.as_deref().map(parse_hhmm).transpose()?.unwrap_or(1440);
            let days = days
                .iter()
                .map(|d| parse_weekday(d))
                .collect::<Result<Vec<_>>>()?;
            run_queue_set_schedule(socket_path, &id, start_hhmm, end_hhmm, days).await
        }
        QueueCommand::Move { download_id, queue_id } => run_queue_move(socket_path, &download_id, &queue_id).await,
    }
}

/// Parses `"HH:MM"` into minutes-since-midnight.
fn parse_hhmm(s: &str) -> Result<u16> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected HH:MM, got {s:?}"))?;
    let h: u16 = h.parse()?;
    let m: u16 = m.parse()?;
    anyhow::ensure!(h < 24 && m < 60, "time out of range: {s}");
    Ok(h * 60 + m)
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => anyhow::bail!("unrecognized weekday: {s}"),
    }
}

#[cfg(test)]
mod tests;
