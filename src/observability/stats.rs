//! In-memory usage statistics for the forwarding endpoint.
//!
//! One mutex guards the whole structure, so a reader never observes a
//! half-applied update and `reset` is atomic with respect to `record`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use url::Url;

use crate::config::StatsConfig;

/// Entries shown by the admin stats endpoint.
const REPORTED_DOMAINS: usize = 10;
const REPORTED_ERRORS: usize = 10;

/// A failed forward, as reported by the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: String,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub version: &'static str,
    pub platform: &'static str,
    pub pid: u32,
}

/// Point-in-time copy of [`UsageStats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub overview: Overview,
    pub top_domains: Vec<DomainCount>,
    pub recent_errors: Vec<ErrorRecord>,
    pub system_info: SystemInfo,
}

#[derive(Debug)]
struct StatsInner {
    total: u64,
    success: u64,
    failed: u64,
    started_at: Instant,
    domains: HashMap<String, u64>,
    /// Newest first.
    recent_errors: VecDeque<ErrorRecord>,
}

impl StatsInner {
    fn new() -> Self {
        Self {
            total: 0,
            success: 0,
            failed: 0,
            started_at: Instant::now(),
            domains: HashMap::new(),
            recent_errors: VecDeque::new(),
        }
    }
}

/// Process-wide request counters, recent errors and per-domain frequency.
#[derive(Debug)]
pub struct UsageStats {
    inner: Mutex<StatsInner>,
    error_capacity: usize,
    domain_soft_cap: usize,
    domain_retain: usize,
}

impl UsageStats {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            inner: Mutex::new(StatsInner::new()),
            error_capacity: config.recent_error_capacity,
            domain_soft_cap: config.domain_soft_cap,
            domain_retain: config.domain_retain,
        }
    }

    /// Record one terminal outcome of a forward.
    ///
    /// `target` is the raw target string (or `"unknown"`); its host feeds the
    /// domain table when it parses. `error` is only kept for failures.
    pub fn record(&self, target: &str, success: bool, error: Option<&str>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total += 1;

        if success {
            inner.success += 1;
        } else {
            inner.failed += 1;
            if let Some(message) = error {
                inner.recent_errors.push_front(ErrorRecord {
                    timestamp: crate::timestamp(),
                    url: target.to_string(),
                    error: message.to_string(),
                });
                inner.recent_errors.truncate(self.error_capacity);
            }
        }

        if let Some(host) = Url::parse(target).ok().and_then(|u| u.host_str().map(str::to_string)) {
            *inner.domains.entry(host).or_insert(0) += 1;
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *inner = StatsInner::new();
    }

    /// Shrink the domain table to its most frequent entries once it grows past
    /// the soft cap, and bound the error buffer. Returns the number of domains dropped.
    pub fn trim(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.recent_errors.truncate(self.error_capacity);

        if inner.domains.len() <= self.domain_soft_cap {
            return 0;
        }

        let before = inner.domains.len();
        let mut ranked: Vec<(String, u64)> = inner.domains.drain().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.domain_retain);
        inner.domains = ranked.into_iter().collect();
        before - inner.domains.len()
    }

    pub fn domain_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .domains
            .len()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let success_rate = if inner.total > 0 {
            format!("{:.2}%", inner.success as f64 / inner.total as f64 * 100.0)
        } else {
            "0%".to_string()
        };

        let mut top_domains: Vec<DomainCount> = inner
            .domains
            .iter()
            .map(|(domain, count)| DomainCount {
                domain: domain.clone(),
                count: *count,
            })
            .collect();
        top_domains.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
        top_domains.truncate(REPORTED_DOMAINS);

        StatsSnapshot {
            overview: Overview {
                total_requests: inner.total,
                successful_requests: inner.success,
                failed_requests: inner.failed,
                success_rate,
                uptime: format!("{} seconds", inner.started_at.elapsed().as_secs()),
            },
            top_domains,
            recent_errors: inner.recent_errors.iter().take(REPORTED_ERRORS).cloned().collect(),
            system_info: SystemInfo {
                version: env!("CARGO_PKG_VERSION"),
                platform: std::env::consts::OS,
                pid: std::process::id(),
            },
        }
    }
}
