//! Media classification for the `/media` handler (spec §4.7).
//!
//! Order matters: a `.m3u8`/mpegurl stream hosted on YouTube is still
//! classified `Hls` ahead of `Youtube`, since the player-specific dedup and
//! rendering differ by container, not by host. `Youtube` only wins when none
//! of the container-specific checks match.

use crate::model::MediaKind;

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host.ends_with(".googlevideo.com")
}

/// Classifies a reported media resource using its content-type, its own URL,
/// and (if known) the tab URL it was observed on.
pub fn classify_media_kind(content_type: Option<&str>, url: &str, tab_url: Option<&str>) -> MediaKind {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let lower_url = url.to_ascii_lowercase();

    if content_type.contains("mpegurl") || lower_url.contains(".m3u8") {
        return MediaKind::Hls;
    }
    if content_type.contains("dash+xml") || lower_url.contains(".mpd") {
        return MediaKind::Dash;
    }

    let on_youtube = host_of(url).is_some_and(|h| is_youtube_host(&h))
        || tab_url.and_then(host_of).is_some_and(|h| is_youtube_host(&h));
    if on_youtube {
        return MediaKind::Youtube;
    }

    if content_type.starts_with("audio/") {
        return MediaKind::Audio;
    }
    // spec's classification rule has no "image"/"other" bucket: anything
    // left over (including an unknown or missing content-type) is `Video`.
    MediaKind::Video
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m3u8_extension_classifies_as_hls_even_on_youtube() {
        let kind = classify_media_kind(None, "https://googlevideo.com/stream.m3u8", None);
        assert_eq!(kind, MediaKind::Hls);
    }

    #[test]
    fn mpd_extension_classifies_as_dash() {
        let kind = classify_media_kind(Some("application/dash+xml"), "https://cdn.example.com/manifest.mpd", None);
        assert_eq!(kind, MediaKind::Dash);
    }

    #[test]
    fn googlevideo_host_classifies_as_youtube() {
        let kind = classify_media_kind(
            Some("video/mp4"),
            "https://rr3---sn-abc.googlevideo.com/videoplayback?id=1",
            None,
        );
        assert_eq!(kind, MediaKind::Youtube);
    }

    #[test]
    fn youtube_tab_url_classifies_non_cdn_host_as_youtube() {
        let kind = classify_media_kind(
            Some("video/mp4"),
            "https://cdn.example.com/chunk1",
            Some("https://www.youtube.com/watch?v=abc"),
        );
        assert_eq!(kind, MediaKind::Youtube);
    }

    #[test]
    fn audio_content_type_classifies_as_audio() {
        let kind = classify_media_kind(Some("audio/mpeg"), "https://example.com/song.mp3", None);
        assert_eq!(kind, MediaKind::Audio);
    }

    #[test]
    fn unrecognized_content_type_falls_back_to_video() {
        let kind = classify_media_kind(Some("image/png"), "https://example.com/clip", None);
        assert_eq!(kind, MediaKind::Video);
    }

    #[test]
    fn missing_content_type_defaults_to_video() {
        let kind = classify_media_kind(None, "https://example.com/clip", None);
        assert_eq!(kind, MediaKind::Video);
    }
}
