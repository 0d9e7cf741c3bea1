//! HTTP HEAD / metadata probing.
//!
//! Confirms `Content-Length`, `Accept-Ranges: bytes`, and captures
//! ETag/Last-Modified for resume safety and Content-Disposition for filename
//! derivation. Built on `reqwest` so probing is a suspension point on the same
//! runtime the segment workers share, rather than a blocking call shelled out
//! to `spawn_blocking`.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::QdmError;

/// Result of a HEAD probe: key headers needed for segmented download and resume.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
    /// `Content-Type`, used as the filename-extension fallback when neither
    /// the caller nor `Content-Disposition` supplies one.
    pub content_type: Option<String>,
    /// Final URL after following redirects (used by the Ingestion Endpoint's
    /// YouTube dedup normalization and by safe-resume host comparisons).
    pub final_url: String,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs a HEAD request against `url`, following redirects, and returns
/// parsed metadata. `custom_headers` are forwarded as request headers
/// (already stripped of hop-by-hop/auth values by the caller).
pub async fn probe(url: &str, custom_headers: &HashMap<String, String>) -> Result<ProbeResult, QdmError> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(PROBE_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| QdmError::ProbeFailed(e.to_string()))?;

    let mut req = client.head(url);
    for (k, v) in custom_headers {
        req = req.header(k.trim(), v.trim());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| QdmError::ProbeFailed(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(QdmError::ProbeFailed(format!("HTTP {}", resp.status().as_u16())));
    }

    let final_url = resp.url().to_string();
    let headers = resp.headers();

    let content_length = headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let accept_ranges = headers
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);

    let etag = headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string());

    let last_modified = headers
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let content_disposition = headers
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(ProbeResult {
        content_length,
        accept_ranges,
        etag,
        last_modified,
        content_disposition,
        content_type,
        final_url,
    })
}

/// Best-effort probe: treats any failure as "no ranges, unknown size" rather
/// than propagating, for callers (e.g. queue admission) that just want a size
/// hint and would rather fall back to a single-stream download than give up.
pub async fn probe_best_effort(url: &str, custom_headers: &HashMap<String, String>) -> ProbeResult {
    probe(url, custom_headers).await.unwrap_or(ProbeResult {
        content_length: None,
        accept_ranges: false,
        etag: None,
        last_modified: None,
        content_disposition: None,
        content_type: None,
        final_url: url.to_string(),
    })
}
