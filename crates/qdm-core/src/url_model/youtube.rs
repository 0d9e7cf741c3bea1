//! YouTube URL dedup normalization for the ingestion endpoint.
//!
//! YouTube's player issues many requests for the same underlying stream that
//! differ only in `range`/`rn`/`rbuf` query parameters (byte range, request
//! number, read-buffer hint). Without stripping these, the `/media` and
//! `/vid` handlers would treat every chunk request as a distinct resource.

const DEDUP_STRIPPED_PARAMS: &[&str] = &["range", "rn", "rbuf"];

fn is_youtube_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host.ends_with(".googlevideo.com")
}

/// Normalizes a URL for dedup purposes: if it targets a YouTube/Google Video
/// host, strips `range`/`rn`/`rbuf` query parameters so repeated chunk
/// requests for the same stream collapse to one key. Non-YouTube URLs (or
/// unparseable ones) are returned unchanged.
pub fn normalize_for_dedup(raw_url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw_url) else {
        return raw_url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return raw_url.to_string();
    };
    if !is_youtube_host(host) {
        return raw_url.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !DEDUP_STRIPPED_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let qs = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&qs));
    }
    parsed.to_string()
}
