//! Global configuration loaded from `~/.config/qdm/config.toml`.
//!
//! Carries every field spec.md §6's "CLI/config surface" lists, plus the
//! internal tuning fields (`min_segments`, the connection budget) the
//! teacher's config already had. The shell (GUI, tray, clipboard watcher)
//! consumes `show_notifications`/`minimize_to_tray` directly; the core
//! treats them as opaque hints it persists but never reads.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Bound on how many times the ingestion endpoint bumps its port after a
/// bind failure before giving up (spec §4.7).
pub const INGESTION_PORT_BUMP_ATTEMPTS: u16 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdmConfig {
    /// Default directory new downloads are saved to, absent a caller override.
    pub download_dir: PathBuf,
    /// Concurrency cap of the default queue (spec §6).
    pub max_concurrent_downloads: usize,
    /// Upper bound on segments per download, `[1, 32]` (spec §3/§6).
    pub max_segments_per_download: usize,
    /// Lower bound on segments per download (internal tuning input to
    /// `segmenter::segment_count_for_size`; spec.md's formula only names
    /// the upper bound, so this defaults to 1 to keep the formula in charge).
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
    /// Process-wide byte-rate ceiling in KiB/s; `0` means unlimited (spec §5/§6).
    pub speed_limit_kbps: u64,
    /// Port the ingestion endpoint listens on; auto-bumped on `EADDRINUSE`
    /// up to `INGESTION_PORT_BUMP_ATTEMPTS` times (spec §4.7/§6).
    pub ingestion_port: u16,
    /// Opaque UI hint: whether the shell should show desktop notifications.
    pub show_notifications: bool,
    /// Opaque UI hint: whether the shell should minimize to tray on close.
    pub minimize_to_tray: bool,
    /// Maximum total concurrent HTTP connections across all active downloads
    /// (internal tuning input, independent of any one queue's cap).
    #[serde(default = "default_max_total_connections")]
    pub max_total_connections: usize,

    /// Whether the ingestion endpoint accepts `/download`/`/media`/`/link`
    /// submissions at all; `/sync` still answers so the agent can observe
    /// the flag flip. Echoed as `enabled` in the sync snapshot (spec §4.7).
    #[serde(default = "default_true")]
    pub ingestion_enabled: bool,
    /// File extensions (no leading dot) `/download`/`/link` accept.
    #[serde(default = "default_file_exts")]
    pub file_exts: Vec<String>,
    /// Hosts `/download`/`/media`/`/link` refuse regardless of extension match.
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
    /// Content-type substrings that count as a file-extension match when the
    /// URL path itself has no recognizable extension.
    #[serde(default)]
    pub request_file_exts: Vec<String>,
    /// Content-type prefixes `/media` treats as downloadable media.
    #[serde(default = "default_media_types")]
    pub media_types: Vec<String>,
    /// Tab URL patterns the browser-side agent should watch for navigation
    /// (opaque to core; echoed back verbatim in the sync snapshot).
    #[serde(default)]
    pub tabs_watcher: Vec<String>,
    /// Host patterns that should be treated as matching even without an
    /// extension/content-type hit (opaque allowlist, echoed in sync).
    #[serde(default)]
    pub matching_hosts: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_file_exts() -> Vec<String> {
    ["zip", "7z", "rar", "tar", "gz", "xz", "iso", "deb", "rpm", "exe", "msi", "dmg", "pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_media_types() -> Vec<String> {
    ["video/", "audio/", "application/vnd.apple.mpegurl", "application/dash+xml"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_segments() -> usize {
    1
}

fn default_max_total_connections() -> usize {
    64
}

impl Default for QdmConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: 3,
            max_segments_per_download: 8,
            min_segments: default_min_segments(),
            speed_limit_kbps: 0,
            ingestion_port: 8597,
            show_notifications: true,
            minimize_to_tray: true,
            max_total_connections: default_max_total_connections(),
            ingestion_enabled: true,
            file_exts: default_file_exts(),
            blocked_hosts: Vec::new(),
            request_file_exts: Vec::new(),
            media_types: default_media_types(),
            tabs_watcher: Vec::new(),
            matching_hosts: Vec::new(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
}

impl QdmConfig {
    /// Clamps `max_segments_per_download` to the spec's `[1, 32]` range,
    /// e.g. after deserializing a hand-edited config file.
    pub fn normalized_max_segments(&self) -> usize {
        self.max_segments_per_download.clamp(1, 32)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("qdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<QdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = QdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: QdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = QdmConfig::default();
        assert_eq!(cfg.max_concurrent_downloads, 3);
        assert_eq!(cfg.max_segments_per_download, 8);
        assert_eq!(cfg.ingestion_port, 8597);
        assert_eq!(cfg.speed_limit_kbps, 0);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = QdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: QdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_downloads, cfg.max_concurrent_downloads);
        assert_eq!(parsed.ingestion_port, cfg.ingestion_port);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            download_dir = "/tmp/dl"
            max_concurrent_downloads = 5
            max_segments_per_download = 16
            speed_limit_kbps = 2048
            ingestion_port = 9000
            show_notifications = false
            minimize_to_tray = false
        "#;
        let cfg: QdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_downloads, 5);
        assert_eq!(cfg.max_segments_per_download, 16);
        assert_eq!(cfg.speed_limit_kbps, 2048);
        assert_eq!(cfg.ingestion_port, 9000);
        assert!(!cfg.show_notifications);
        // fields with serde(default) are filled in even when absent from the file
        assert_eq!(cfg.min_segments, 1);
    }

    #[test]
    fn normalized_max_segments_clamps_to_spec_range() {
        let mut cfg = QdmConfig::default();
        cfg.max_segments_per_download = 64;
        assert_eq!(cfg.normalized_max_segments(), 32);
        cfg.max_segments_per_download = 0;
        assert_eq!(cfg.normalized_max_segments(), 1);
    }
}
