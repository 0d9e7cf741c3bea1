//! Extension inference from `Content-Type`, used when the URL-derived
//! filename has no extension of its own (spec §3 filename precedence).

/// Maps a `Content-Type` value (media type only, parameters ignored) to a
/// file extension (without the leading dot). Covers the media/archive
/// types a download accelerator actually encounters; anything else
/// returns `None` and the caller keeps the extension-less name.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let media_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    Some(match media_type.as_str() {
        "application/zip" | "application/x-zip-compressed" => "zip",
        "application/x-7z-compressed" => "7z",
        "application/x-rar-compressed" | "application/vnd.rar" => "rar",
        "application/gzip" | "application/x-gzip" => "gz",
        "application/x-tar" => "tar",
        "application/pdf" => "pdf",
        "application/x-debian-package" => "deb",
        "application/vnd.debian.binary-package" => "deb",
        "application/x-rpm" => "rpm",
        "application/x-iso9660-image" => "iso",
        "application/octet-stream" => return None,
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/quicktime" => "mov",
        "application/vnd.apple.mpegurl" | "application/x-mpegurl" => "m3u8",
        "application/dash+xml" => "mpd",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_map_to_extensions() {
        assert_eq!(extension_for_content_type("application/zip"), Some("zip"));
        assert_eq!(
            extension_for_content_type("video/mp4; charset=binary"),
            Some("mp4")
        );
    }

    #[test]
    fn unknown_or_generic_types_yield_none() {
        assert_eq!(extension_for_content_type("application/octet-stream"), None);
        assert_eq!(extension_for_content_type("something/unknown"), None);
    }
}
