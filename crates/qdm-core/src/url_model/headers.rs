//! Header hygiene for outbound segment/probe requests.
//!
//! A caller-supplied header map (captured from a browser's request via the
//! ingestion endpoint) can carry headers that are unsafe or meaningless to
//! replay on a different connection: hop-by-hop headers describe the
//! client's own connection to its origin, conditional headers would make the
//! ranged GET itself conditional (risking a `304` with no body), and
//! authorization/cookie headers should not be forwarded to a redirect target
//! on a different host (spec §9 hardening note).

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    "accept",
    "expect",
    "content-type",
    "content-encoding",
];

const CONDITIONAL: &[&str] = &[
    "if-match",
    "if-none-match",
    "if-modified-since",
    "if-unmodified-since",
    "if-range",
    "range",
];

const CREDENTIAL: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Returns true if `name` should never be forwarded on an outbound request
/// regardless of target host (hop-by-hop, or would make a ranged GET
/// conditional on an ETag/date we don't control).
pub fn is_unsafe_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str()) || CONDITIONAL.contains(&lower.as_str())
}

/// Returns true if `name` carries credentials that must be dropped when the
/// request is about to cross to a different host than the original request
/// targeted (redirect hardening).
pub fn is_credential_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CREDENTIAL.contains(&lower.as_str())
}

/// Filters a caller-supplied header map down to what's safe to forward on a
/// segment GET or probe HEAD. `cross_host` is true when the outbound request
/// is known to target a different host than the one the headers were
/// captured for (e.g. after a redirect), in which case credential headers
/// are dropped too.
pub fn sanitize_headers(
    headers: &std::collections::HashMap<String, String>,
    cross_host: bool,
) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| !is_unsafe_header(k))
        .filter(|(k, _)| !(cross_host && is_credential_header(k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
