//! Host blocklist / extension allowlist gating for `/download` and `/link`
//! (spec §4.7: "filters by host blocklist and by the configured
//! file-extension / content-type allowlist").

use crate::config::QdmConfig;

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

fn matches_host_list(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| {
        let p = p.to_ascii_lowercase();
        host == p || host.ends_with(&format!(".{p}"))
    })
}

fn extension_of(url: &str) -> Option<String> {
    let path = url::Url::parse(url).ok()?.path().to_string();
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Whether `url`/`content_type` should be admitted as a download, per the
/// configured blocklist/allowlist. A blocked host always wins regardless of
/// extension/content-type. Absent any recognizable extension or matching
/// content-type, a host on `matching_hosts` is still admitted (the
/// allowlist's escape hatch for hosts that serve extensionless download
/// URLs, e.g. signed S3 links).
pub fn is_admitted(url: &str, content_type: Option<&str>, config: &QdmConfig) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    if matches_host_list(&host, &config.blocked_hosts) {
        return false;
    }

    if let Some(ext) = extension_of(url) {
        if config.file_exts.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return true;
        }
    }
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if config.request_file_exts.iter().any(|pat| ct.contains(&pat.to_ascii_lowercase())) {
            return true;
        }
    }
    matches_host_list(&host, &config.matching_hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(file_exts: &[&str], blocked: &[&str], matching: &[&str]) -> QdmConfig {
        let mut cfg = QdmConfig::default();
        cfg.file_exts = file_exts.iter().map(|s| s.to_string()).collect();
        cfg.blocked_hosts = blocked.iter().map(|s| s.to_string()).collect();
        cfg.matching_hosts = matching.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn allowed_extension_is_admitted() {
        let cfg = config_with(&["zip"], &[], &[]);
        assert!(is_admitted("https://example.com/a.zip", None, &cfg));
    }

    #[test]
    fn blocked_host_wins_even_with_allowed_extension() {
        let cfg = config_with(&["zip"], &["blocked.example.com"], &[]);
        assert!(!is_admitted("https://blocked.example.com/a.zip", None, &cfg));
    }

    #[test]
    fn blocked_subdomain_matches_parent_pattern() {
        let cfg = config_with(&["zip"], &["example.com"], &[]);
        assert!(!is_admitted("https://cdn.example.com/a.zip", None, &cfg));
    }

    #[test]
    fn unrecognized_extension_without_matching_host_is_rejected() {
        let cfg = config_with(&["zip"], &[], &[]);
        assert!(!is_admitted("https://example.com/a.bin", None, &cfg));
    }

    #[test]
    fn matching_host_admits_extensionless_url() {
        let cfg = config_with(&["zip"], &[], &["cdn.example.com"]);
        assert!(is_admitted("https://cdn.example.com/download?token=abc", None, &cfg));
    }

    #[test]
    fn content_type_allowlist_admits_without_extension() {
        let cfg = QdmConfig {
            request_file_exts: vec!["zip".to_string()],
            ..config_with(&[], &[], &[])
        };
        assert!(is_admitted("https://example.com/download", Some("application/zip"), &cfg));
    }
}
