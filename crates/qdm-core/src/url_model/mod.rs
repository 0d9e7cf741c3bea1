//! URL modeling and filename derivation.
//!
//! Derives safe local filenames from URL path or Content-Disposition header,
//! sanitized for Linux filesystems.

mod content_disposition;
mod ext;
mod headers;
mod path;
mod sanitize;
mod youtube;

pub use content_disposition::parse_content_disposition_filename;
pub use ext::extension_for_content_type;
pub use headers::{is_credential_header, is_unsafe_header, sanitize_headers};
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename_for_linux;
pub use youtube::normalize_for_dedup;

/// Default filename when URL path and Content-Disposition yield nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for saving a download.
///
/// Prefers the filename from `content_disposition` (if present and parseable),
/// otherwise uses the last path segment of `url`. The result is sanitized for
/// Linux (no `/`, NUL, or control chars; no leading/trailing dots or spaces;
/// reserved names like "." or ".." replaced).
///
/// # Examples
///
/// - `derive_filename("https://example.com/archive.zip", None)` → `"archive.zip"`
/// - `derive_filename("https://example.com/", Some("attachment; filename=\"report.pdf\""))` → `"report.pdf"`
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Full filename precedence chain (spec §3): caller override beats
/// `Content-Disposition` (which itself prefers RFC 5987 `filename*` over a
/// quoted/unquoted `filename`, handled inside
/// [`parse_content_disposition_filename`]) beats the URL's last path
/// segment (with an extension appended from `content_type` if the URL
/// segment has none) beats a synthetic `download_<id>` name. The result is
/// always sanitized and never empty.
pub fn derive_filename_for_download(
    caller_override: Option<&str>,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
    url: &str,
    id: &str,
) -> String {
    if let Some(name) = caller_override.filter(|s| !s.trim().is_empty()) {
        return finish(name);
    }

    if let Some(name) = content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.is_empty())
    {
        return finish(&name);
    }

    if let Some(mut name) = filename_from_url_path(url) {
        if !name.contains('.') {
            if let Some(ext) = content_type.and_then(extension_for_content_type) {
                name = format!("{name}.{ext}");
            }
        }
        return finish(&name);
    }

    finish(&format!("download_{id}"))
}

fn finish(raw: &str) -> String {
    let sanitized = sanitize_filename_for_linux(raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
