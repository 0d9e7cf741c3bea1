//! Segment Worker: downloads one [`crate::model::Segment`] with a ranged GET
//! and writes its bytes into the download's scratch part-file.
//!
//! One worker task per segment. Workers never touch the owning
//! [`crate::model::Download`] directly; they report progress and terminal
//! outcomes over a bounded `mpsc` channel to the supervisor (spec §5: no
//! shared mutable state across tasks besides channels). Suspension points
//! are DNS/connect/TLS (inside `reqwest`), each chunk read, each storage
//! write, and the cancellation wait.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::QdmError;
use crate::model::Segment;
use crate::ratelimit::RateLimiter;
use crate::retry::{self, ErrorKind, SegmentError};
use crate::storage::StorageWriter;
use crate::supervisor::progress::ProgressMsg;
use crate::url_model;

/// A stuck transfer (no bytes received for this long) is treated as dead
/// rather than waiting on `reqwest`'s connection-level timeout, which only
/// covers the initial connect.
const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on redirect hops a single segment request follows before giving up
/// (spec §4.3 step 3: "retry this segment's request once at this layer" per
/// hop, not unbounded).
const MAX_REDIRECTS: usize = 5;

/// Downloads the remaining bytes of `segment` (from `segment.downloaded`
/// onward) and writes them to `storage` at the correct file offset.
///
/// The supervisor's shared client has redirects disabled
/// (`redirect::Policy::none()`), so this function follows 3xx/Location
/// responses itself: each hop re-sanitizes `headers` with the `cross_host`
/// flag computed for that hop, and the first hop that lands on a different
/// host than `url` is reported back to the supervisor over `progress_tx` so
/// `Download.source_url` gets rewritten once per `start` (spec §3).
///
/// Reports chunk and terminal progress on `progress_tx`; does not return a
/// terminal message itself — callers should treat the returned `Result` as
/// authoritative and the channel as a progress side-channel only.
pub async fn run_segment(
    client: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
    segment: &Segment,
    storage: StorageWriter,
    progress_tx: &mpsc::Sender<ProgressMsg>,
    cancel: CancellationToken,
    rate_limiter: &RateLimiter,
) -> Result<(), QdmError> {
    if segment.length.is_some() && segment.range_header_value().is_none() {
        // Already fully downloaded (e.g. resumed after a crash mid-assemble).
        let _ = progress_tx.send(ProgressMsg::finished(segment.id)).await;
        return Ok(());
    }

    if segment.length.is_none() && segment.downloaded > 0 {
        // Non-resumable segment restarting after a pause: the server never
        // confirmed Range support, so the prior byte count is discarded.
        let _ = progress_tx.send(ProgressMsg::reset(segment.id)).await;
    }

    let response = match tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = progress_tx.send(ProgressMsg::cancelled(segment.id)).await;
            return Err(QdmError::Cancelled);
        }
        result = fetch_segment_response(client, url, headers, segment, progress_tx) => result,
    } {
        Ok(response) => response,
        Err(err) => {
            let _ = progress_tx
                .send(ProgressMsg::failed(segment.id, err.clone()))
                .await;
            return Err(err);
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = progress_tx.send(ProgressMsg::cancelled(segment.id)).await;
            return Err(QdmError::Cancelled);
        }
        result = stream_segment(response, segment, &storage, progress_tx, rate_limiter) => result,
    };

    match outcome {
        Ok(()) => {
            let _ = progress_tx.send(ProgressMsg::finished(segment.id)).await;
            Ok(())
        }
        Err(err) => {
            let _ = progress_tx
                .send(ProgressMsg::failed(segment.id, err.clone()))
                .await;
            Err(err)
        }
    }
}

/// Issues the ranged GET, following up to [`MAX_REDIRECTS`] hops manually.
/// Each hop sanitizes `headers` fresh for that hop's `cross_host` status, so
/// credentials are dropped the moment a redirect leaves the original host
/// rather than only once at the end.
async fn fetch_segment_response(
    client: &reqwest::Client,
    original_url: &str,
    headers: &HashMap<String, String>,
    segment: &Segment,
    progress_tx: &mpsc::Sender<ProgressMsg>,
) -> Result<reqwest::Response, QdmError> {
    let origin_host = host_of(original_url);
    let mut current_url = original_url.to_string();
    let mut redirects = 0usize;

    loop {
        let cross_host = host_of(&current_url) != origin_host;
        let sanitized = url_model::sanitize_headers(headers, cross_host);
        let mut request = client.get(&current_url);
        if let Some(range_value) = segment.range_header_value() {
            request = request.header(reqwest::header::RANGE, &range_value);
        }
        for (k, v) in &sanitized {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| segment_error_to_qdm(SegmentError::Transport(e)))?;

        if !response.status().is_redirection() {
            if current_url != original_url {
                let _ = progress_tx
                    .send(ProgressMsg::redirected(segment.id, current_url.clone()))
                    .await;
            }
            return Ok(response);
        }

        redirects += 1;
        if redirects > MAX_REDIRECTS {
            return Err(segment_error_to_qdm(SegmentError::Http(response.status().as_u16())));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| QdmError::SegmentIoError {
                reason: "redirect response missing Location header".to_string(),
            })?
            .to_string();

        let next = url::Url::parse(&current_url)
            .and_then(|base| base.join(&location))
            .map_err(|_| QdmError::SegmentIoError {
                reason: format!("invalid redirect location: {location}"),
            })?;
        current_url = next.to_string();
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

async fn stream_segment(
    response: reqwest::Response,
    segment: &Segment,
    storage: &StorageWriter,
    progress_tx: &mpsc::Sender<ProgressMsg>,
    rate_limiter: &RateLimiter,
) -> Result<(), QdmError> {
    let ranged = segment.length.is_some();
    let status = response.status().as_u16();
    if ranged {
        if status != 206 {
            return Err(segment_error_to_qdm(SegmentError::Http(status)));
        }
        if !content_range_matches(response.headers(), segment) {
            return Err(segment_error_to_qdm(SegmentError::Http(status)));
        }
    } else if !(200..300).contains(&status) {
        return Err(segment_error_to_qdm(SegmentError::Http(status)));
    }

    // Offsets are relative to the segment's own part-file (spec §6: a
    // part-file holds its segment's bytes starting at 0, not the absolute
    // position in the final artifact). Unranged (unknown-length,
    // non-resumable) segments always restart from byte 0: the server never
    // confirmed Range support, so any bytes a prior attempt wrote are not
    // trustworthy partial progress.
    let mut received: u64 = 0;
    let base_offset = if ranged { segment.downloaded } else { 0 };
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(IDLE_READ_TIMEOUT, stream.next()).await;
        let chunk = match next {
            Ok(Some(Ok(bytes))) => bytes,
            Ok(Some(Err(e))) => return Err(segment_error_to_qdm(SegmentError::Transport(e))),
            Ok(None) => break,
            Err(_elapsed) => {
                return Err(QdmError::SegmentIoError {
                    reason: format!("no data received for {}s, giving up", IDLE_READ_TIMEOUT.as_secs()),
                });
            }
        };

        let offset = base_offset + received;
        let storage = storage.clone();
        let data = chunk.to_vec();
        let len = data.len() as u64;
        tokio::task::spawn_blocking(move || storage.write_at(offset, &data))
            .await
            .map_err(|e| QdmError::SegmentWriteError { reason: e.to_string() })?
            .map_err(|e| QdmError::SegmentWriteError { reason: e.to_string() })?;

        received += len;
        let _ = progress_tx.send(ProgressMsg::chunk(segment.id, len)).await;
        rate_limiter.throttle(len).await;
    }

    let expected = segment.length.map(|l| l - segment.downloaded).unwrap_or(received);
    if received != expected {
        return Err(segment_error_to_qdm(SegmentError::PartialTransfer {
            expected,
            received: segment.downloaded + received,
        }));
    }
    Ok(())
}

/// Validates the `Content-Range` header matches the byte range we asked
/// for. A server that ignores `Range` and sends `200 OK` is caught by the
/// `status != 206` check in [`stream_segment`]; this catches a `206` for
/// the wrong range (some misbehaving proxies do this).
fn content_range_matches(headers: &reqwest::header::HeaderMap, segment: &Segment) -> bool {
    let Some(length) = segment.length else {
        return true;
    };
    let expected_start = segment.offset + segment.downloaded;
    let expected_end = segment.offset + length - 1;
    let Some(raw) = headers
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    parse_content_range(raw)
        .map(|(start, end)| start == expected_start && end == expected_end)
        .unwrap_or(false)
}

/// Parses a `Content-Range: bytes START-END/TOTAL` header value into
/// `(start, end)` (both inclusive bounds of the served range).
fn parse_content_range(raw: &str) -> Option<(u64, u64)> {
    let rest = raw.strip_prefix("bytes ")?;
    let (range, _total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Converts a [`SegmentError`] into the `QdmError` stored on the download,
/// labelling it with [`retry::classify`] first so `last_error` reads as
/// "timeout: ..." / "throttled (503)" rather than a bare transport message
/// (spec §7: "last_error = most recent segment failure summary").
fn segment_error_to_qdm(err: SegmentError) -> QdmError {
    let kind = retry::classify(&err);
    match err {
        SegmentError::Transport(e) => QdmError::SegmentIoError {
            reason: format!("{}: {e}", kind_label(kind)),
        },
        SegmentError::Http(status) => {
            if matches!(kind, ErrorKind::Throttled) {
                tracing::debug!(status, "segment request throttled by server");
            }
            QdmError::SegmentHttpError { status }
        }
        SegmentError::PartialTransfer { expected, received } => QdmError::SegmentIoError {
            reason: format!(
                "{}: partial transfer: expected {expected} bytes, received {received}",
                kind_label(kind)
            ),
        },
        SegmentError::Storage(e) => QdmError::SegmentWriteError {
            reason: e.to_string(),
        },
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Timeout => "timeout",
        ErrorKind::Throttled => "throttled",
        ErrorKind::Connection => "connection error",
        ErrorKind::Http5xx(_) => "server error",
        ErrorKind::Other => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_extracts_host_and_ignores_scheme_and_path() {
        assert_eq!(host_of("https://example.com/a/b"), Some("example.com".to_string()));
        assert_eq!(host_of("http://mirror.example.org:8080/x"), Some("mirror.example.org".to_string()));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn parses_content_range() {
        assert_eq!(parse_content_range("bytes 0-499/1000"), Some((0, 499)));
        assert_eq!(parse_content_range("bytes 500-999/1000"), Some((500, 999)));
        assert_eq!(parse_content_range("bogus"), None);
    }

    #[test]
    fn content_range_matches_expected_window() {
        let segment = Segment {
            id: 1,
            offset: 250,
            length: Some(250),
            downloaded: 0,
            state: crate::model::SegmentState::Running,
        };
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_RANGE,
            "bytes 250-499/1000".parse().unwrap(),
        );
        assert!(content_range_matches(&headers, &segment));

        let mut wrong = reqwest::header::HeaderMap::new();
        wrong.insert(
            reqwest::header::CONTENT_RANGE,
            "bytes 0-249/1000".parse().unwrap(),
        );
        assert!(!content_range_matches(&wrong, &segment));
    }

    #[test]
    fn content_range_matches_accounts_for_partial_resume() {
        let segment = Segment {
            id: 0,
            offset: 0,
            length: Some(500),
            downloaded: 100,
            state: crate::model::SegmentState::Running,
        };
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_RANGE,
            "bytes 100-499/500".parse().unwrap(),
        );
        assert!(content_range_matches(&headers, &segment));
    }
}
