//! In-memory host policy cache and adaptive segment logic.
//!
//! This is the optional, off-by-default enrichment layer mentioned in
//! `DESIGN.md`: the segmenter's `max_segments` input can be overridden by
//! `HostPolicy::adaptive_segment_count_for_url`, which starts every new host
//! at 4 segments and steps to 8 then 16 on sustained good throughput,
//! stepping back down on throttling or errors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::entry::{HostEntry, RangeSupport};
use super::HostKey;

const THROUGHPUT_GOOD_BPS: f64 = 1_000_000.0;

#[derive(Debug)]
pub struct HostPolicy {
    entries: HashMap<HostKey, HostEntry>,
    min_segments: usize,
    max_segments: usize,
}

impl HostPolicy {
    pub fn new(min_segments: usize, max_segments: usize) -> Self {
        let min = min_segments.max(1);
        let max = max_segments.max(min);
        Self {
            entries: HashMap::new(),
            min_segments: min,
            max_segments: max,
        }
    }

    pub fn get(&self, key: &HostKey) -> Option<&HostEntry> {
        self.entries.get(key)
    }

    fn entry_mut_for_url(&mut self, url: &str) -> Result<&mut HostEntry> {
        let key = HostKey::from_url(url)?;
        let default = self.default_adaptive_limit();
        Ok(self
            .entries
            .entry(key.clone())
            .or_insert_with(|| HostEntry::new(key, default)))
    }

    fn default_adaptive_limit(&self) -> usize {
        4_usize.max(self.min_segments).min(self.max_segments)
    }

    /// Record whether a probe observed `Accept-Ranges: bytes` for a host.
    pub fn record_range_support(&mut self, url: &str, accept_ranges: bool) -> Result<()> {
        let entry = self.entry_mut_for_url(url)?;
        entry.range_support = if accept_ranges {
            RangeSupport::Supported
        } else {
            RangeSupport::NotSupported
        };
        Ok(())
    }

    pub fn record_throttled(&mut self, url: &str) -> Result<()> {
        let entry = self.entry_mut_for_url(url)?;
        entry.throttled_events = entry.throttled_events.saturating_add(1);
        entry.last_throttled_at = Some(Instant::now());
        Ok(())
    }

    pub fn record_error(&mut self, url: &str) -> Result<()> {
        let entry = self.entry_mut_for_url(url)?;
        entry.error_events = entry.error_events.saturating_add(1);
        entry.last_error_at = Some(Instant::now());
        Ok(())
    }

    pub fn record_success(&mut self, url: &str) -> Result<()> {
        let entry = self.entry_mut_for_url(url)?;
        entry.success_events = entry.success_events.saturating_add(1);
        entry.last_success_at = Some(Instant::now());
        Ok(())
    }

    fn recommended_max_segments_for_key(&self, key: &HostKey) -> usize {
        let base = self.max_segments.max(self.min_segments).max(1);
        let Some(entry) = self.entries.get(key) else {
            return base;
        };
        let penalty_steps = (entry.throttled_events / 3).min(3);
        let mut recommended = base;
        for _ in 0..penalty_steps {
            recommended = (recommended / 2).max(self.min_segments.max(1));
        }
        recommended
    }

    pub fn recommended_max_segments_for_url(&self, url: &str) -> Result<usize> {
        let key = HostKey::from_url(url)?;
        Ok(self.recommended_max_segments_for_key(&key))
    }

    /// Record the outcome of a completed (or failed) run for adaptive tuning.
    pub fn record_job_outcome(
        &mut self,
        url: &str,
        bytes_downloaded: u64,
        duration: Duration,
        throttle_events: u32,
        error_events: u32,
    ) -> Result<()> {
        let key = HostKey::from_url(url)?;
        let min_seg = self.min_segments.max(1);
        let max_seg = self.max_segments;
        let cap = self.recommended_max_segments_for_key(&key);

        let entry = self.entry_mut_for_url(url)?;
        let bps = if duration.as_secs_f64() > 0.0 {
            bytes_downloaded as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        entry.last_throughput_bytes_per_sec = Some(bps);

        if throttle_events > 0 {
            entry.throttled_events = entry.throttled_events.saturating_add(throttle_events);
            entry.last_throttled_at = Some(Instant::now());
        }
        if error_events > 0 {
            entry.error_events = entry.error_events.saturating_add(error_events);
            entry.last_error_at = Some(Instant::now());
        }

        if throttle_events > 0 || error_events > 0 {
            entry.adaptive_segment_limit = (entry.adaptive_segment_limit / 2).max(min_seg).min(max_seg);
        } else if bps >= THROUGHPUT_GOOD_BPS {
            let next = match entry.adaptive_segment_limit {
                n if n < 8 => 8,
                n if n < 16 => 16,
                _ => max_seg.min(16),
            };
            entry.adaptive_segment_limit = next.min(cap);
        }
        Ok(())
    }

    pub fn adaptive_segment_count_for_url(&self, url: &str) -> Result<usize> {
        let key = HostKey::from_url(url)?;
        let cap = self.recommended_max_segments_for_key(&key);
        let Some(entry) = self.entries.get(&key) else {
            return Ok(self.default_adaptive_limit().min(cap));
        };
        Ok(entry
            .adaptive_segment_limit
            .min(cap)
            .max(self.min_segments)
            .min(self.max_segments))
    }

    pub fn to_snapshot(&self) -> PersistedHostPolicy {
        let entries = self
            .entries
            .iter()
            .map(|(k, e)| {
                (
                    k.to_string_key(),
                    PersistedEntry {
                        range_support: e.range_support,
                        throttled_events: e.throttled_events,
                        error_events: e.error_events,
                        success_events: e.success_events,
                        last_throughput_bytes_per_sec: e.last_throughput_bytes_per_sec,
                        adaptive_segment_limit: e.adaptive_segment_limit,
                    },
                )
            })
            .collect();
        PersistedHostPolicy {
            version: 1,
            min_segments: self.min_segments,
            max_segments: self.max_segments,
            entries,
        }
    }

    pub fn from_snapshot(snapshot: PersistedHostPolicy, min_segments: usize, max_segments: usize) -> Self {
        let min = min_segments.max(1);
        let max = max_segments.max(min);
        let entries = snapshot
            .entries
            .into_iter()
            .filter_map(|(key_str, pe)| {
                let key = HostKey::from_string_key(&key_str)?;
                let entry = HostEntry {
                    key: key.clone(),
                    range_support: pe.range_support,
                    last_throttled_at: None,
                    throttled_events: pe.throttled_events,
                    last_error_at: None,
                    error_events: pe.error_events,
                    last_success_at: None,
                    success_events: pe.success_events,
                    last_throughput_bytes_per_sec: pe.last_throughput_bytes_per_sec,
                    adaptive_segment_limit: pe.adaptive_segment_limit.max(min).min(max),
                };
                Some((key, entry))
            })
            .collect();
        Self {
            entries,
            min_segments: min,
            max_segments: max,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub range_support: RangeSupport,
    pub throttled_events: u32,
    pub error_events: u32,
    pub success_events: u32,
    #[serde(default)]
    pub last_throughput_bytes_per_sec: Option<f64>,
    pub adaptive_segment_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedHostPolicy {
    #[serde(default = "default_version")]
    pub version: u8,
    pub min_segments: usize,
    pub max_segments: usize,
    pub entries: HashMap<String, PersistedEntry>,
}

fn default_version() -> u8 {
    1
}
