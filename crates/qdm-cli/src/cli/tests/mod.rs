//! CLI parse tests.

use super::{Cli, CliCommand, QueueCommand};
use clap::Parser;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_add() {
    match parse(&["qdm", "add", "https://example.com/file.iso"]) {
        CliCommand::Add { url, start, .. } => {
            assert_eq!(url, "https://example.com/file.iso");
            assert!(!start);
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_with_start_and_queue() {
    match parse(&["qdm", "add", "https://example.com/f", "--start", "--queue", "q1"]) {
        CliCommand::Add { start, queue, .. } => {
            assert!(start);
            assert_eq!(queue.as_deref(), Some("q1"));
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["qdm", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_parse_serve() {
    match parse(&["qdm", "serve"]) {
        CliCommand::Serve => {}
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_status() {
    match parse(&["qdm", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["qdm", "pause", "abc123"]) {
        CliCommand::Pause { id } => assert_eq!(id, "abc123"),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["qdm", "resume", "abc123"]) {
        CliCommand::Resume { id } => assert_eq!(id, "abc123"),
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_retry() {
    match parse(&["qdm", "retry", "abc123"]) {
        CliCommand::Retry { id } => assert_eq!(id, "abc123"),
        _ => panic!("expected Retry"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["qdm", "cancel", "abc123"]) {
        CliCommand::Cancel { id } => assert_eq!(id, "abc123"),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_remove() {
    match parse(&["qdm", "remove", "abc123"]) {
        CliCommand::Remove { id } => assert_eq!(id, "abc123"),
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_queue_list() {
    match parse(&["qdm", "queue", "list"]) {
        CliCommand::Queue(QueueCommand::List) => {}
        _ => panic!("expected Queue(List)"),
    }
}

#[test]
fn cli_parse_queue_create() {
    match parse(&["qdm", "queue", "create", "nightly", "--max-concurrent", "2"]) {
        CliCommand::Queue(QueueCommand::Create { name, max_concurrent }) => {
            assert_eq!(name, "nightly");
            assert_eq!(max_concurrent, 2);
        }
        _ => panic!("expected Queue(Create)"),
    }
}

#[test]
fn cli_parse_queue_set_schedule() {
    match parse(&[
        "qdm", "queue", "set-schedule", "q1", "--start", "22:00", "--end", "06:00", "--day", "fri",
    ]) {
        CliCommand::Queue(QueueCommand::SetSchedule { id, start, end, days }) => {
            assert_eq!(id, "q1");
            assert_eq!(start.as_deref(), Some("22:00"));
            assert_eq!(end.as_deref(), Some("06:00"));
            assert_eq!(days, vec!["fri".to_string()]);
        }
        _ => panic!("expected Queue(SetSchedule)"),
    }
}

#[test]
fn cli_parse_queue_move() {
    match parse(&["qdm", "queue", "move", "d1", "q2"]) {
        CliCommand::Queue(QueueCommand::Move { download_id, queue_id }) => {
            assert_eq!(download_id, "d1");
            assert_eq!(queue_id, "q2");
        }
        _ => panic!("expected Queue(Move)"),
    }
}

#[test]
fn parse_hhmm_accepts_valid_times_and_rejects_garbage() {
    assert_eq!(super::parse_hhmm("00:00").unwrap(), 0);
    assert_eq!(super::parse_hhmm("23:59").unwrap(), 23 * 60 + 59);
    assert!(super::parse_hhmm("24:00").is_err());
    assert!(super::parse_hhmm("bogus").is_err());
}

#[test]
fn parse_weekday_accepts_three_letter_codes_case_insensitively() {
    assert_eq!(super::parse_weekday("Mon").unwrap(), qdm_core::model::Weekday::Mon);
    assert_eq!(super::parse_weekday("SUN").unwrap(), qdm_core::model::Weekday::Sun);
    assert!(super::parse_weekday("funday").is_err());
}
