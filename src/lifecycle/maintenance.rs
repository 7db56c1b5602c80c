//! Periodic housekeeping of in-memory state.
//!
//! Trims the usage-stats domain table and error buffer, and drops expired
//! rate-limit windows. Runs on its own task; request handling never waits on it.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::ProxyConfig;
use crate::observability::UsageStats;
use crate::security::RateLimiter;

pub struct MaintenanceTask {
    config: Arc<ArcSwap<ProxyConfig>>,
    stats: Arc<UsageStats>,
    rate_limiter: Arc<RateLimiter>,
}

impl MaintenanceTask {
    pub fn new(
        config: Arc<ArcSwap<ProxyConfig>>,
        stats: Arc<UsageStats>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            stats,
            rate_limiter,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let secs = self.config.load().stats.maintenance_interval_secs.max(1);
        tracing::info!(interval_secs = secs, "Maintenance task starting");

        let mut ticker = time::interval(Duration::from_secs(secs));
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once(),
                _ = shutdown.recv() => {
                    tracing::info!("Maintenance task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One housekeeping pass.
    pub fn run_once(&self) {
        let window = Duration::from_millis(self.config.load().rate_limit.window_ms);
        let dropped_domains = self.stats.trim();
        let purged_clients = self.rate_limiter.purge_expired(window);

        tracing::debug!(
            dropped_domains,
            purged_clients,
            tracked_domains = self.stats.domain_count(),
            "Maintenance pass complete"
        );
    }
}
