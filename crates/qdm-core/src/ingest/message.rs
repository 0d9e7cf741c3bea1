//! Wire schema for the ingestion endpoint (spec §4.7/§6).
//!
//! These are the JSON shapes the browser-side agent posts and reads; they
//! are deliberately a thin, permissive shadow of [`crate::model`]'s types
//! rather than the model itself, since the wire format is camelCase and
//! optional-everything (an extension can omit fields a newer/older server
//! version doesn't recognize).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single ingestion message: a candidate download or media resource
/// reported by the browser-side agent. All fields but `url` are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionMessage {
    pub url: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub tab_url: Option<String>,
    #[serde(default)]
    pub tab_title: Option<String>,
    #[serde(default)]
    pub tab_id: Option<String>,
    #[serde(default)]
    pub vid: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub quality: Option<String>,
}

impl IngestionMessage {
    /// Headers to replay on the eventual `Download`: caller's
    /// `requestHeaders` plus `cookie` folded in under the `Cookie` key (the
    /// agent sends cookies separately since `document.cookie` and
    /// `chrome.webRequest` headers arrive through different browser APIs).
    pub fn effective_headers(&self) -> HashMap<String, String> {
        let mut headers = self.request_headers.clone();
        if let Some(cookie) = &self.cookie {
            headers.insert("Cookie".to_string(), cookie.clone());
        }
        headers
    }
}

/// Body of `POST /tab-update`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdateMessage {
    pub tab_url: String,
    pub name: String,
}

/// Body of `POST /vid`.
#[derive(Debug, Clone, Deserialize)]
pub struct VidMessage {
    pub vid: String,
}

/// One entry of the sync snapshot's `videoList` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoListEntry {
    pub id: String,
    pub text: String,
    pub info: String,
    #[serde(rename = "tabId")]
    pub tab_id: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Full response body every ingestion endpoint request gets (spec §4.7:
/// "every request is responded to with the sync snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub enabled: bool,
    #[serde(rename = "fileExts")]
    pub file_exts: Vec<String>,
    #[serde(rename = "blockedHosts")]
    pub blocked_hosts: Vec<String>,
    #[serde(rename = "requestFileExts")]
    pub request_file_exts: Vec<String>,
    #[serde(rename = "mediaTypes")]
    pub media_types: Vec<String>,
    #[serde(rename = "tabsWatcher")]
    pub tabs_watcher: Vec<String>,
    #[serde(rename = "matchingHosts")]
    pub matching_hosts: Vec<String>,
    #[serde(rename = "videoList")]
    pub video_list: Vec<VideoListEntry>,
}
