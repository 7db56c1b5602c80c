//! Configuration file watcher for hot reload.
//!
//! Every valid snapshot is published to the server, which swaps it in for new
//! requests. Some settings are consumed once at startup (the block-list seed,
//! the outbound client, the listener and the metrics exporter); changes to
//! those are published too but only logged as pending a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Watches the configuration file and publishes every valid new snapshot.
pub struct ConfigWatcher {
    path: PathBuf,
    applied: ProxyConfig,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a watcher and the receiver the server drains updates from.
    /// `applied` is the snapshot the process started with.
    pub fn new(path: &Path, applied: ProxyConfig) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                applied,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let mut applied = self.applied;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    match load_config(&path) {
                        Ok(new_config) => {
                            for field in restart_only_changes(&applied, &new_config) {
                                tracing::warn!(field, "Setting changed on disk; takes effect after restart");
                            }
                            applied = new_config.clone();
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected config reload, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Fields that differ between `current` and `next` but are only read at startup.
///
/// The block-list is seeded once so runtime admin edits survive reloads.
pub fn restart_only_changes(current: &ProxyConfig, next: &ProxyConfig) -> Vec<&'static str> {
    let mut fields = Vec::new();

    if current.proxy.blocked_domains != next.proxy.blocked_domains {
        fields.push("proxy.blocked_domains");
    }
    if current.proxy.connect_timeout_ms != next.proxy.connect_timeout_ms {
        fields.push("proxy.connect_timeout_ms");
    }
    if current.proxy.max_redirects != next.proxy.max_redirects {
        fields.push("proxy.max_redirects");
    }
    if current.listener.bind_address != next.listener.bind_address {
        fields.push("listener.bind_address");
    }
    if current.observability.metrics_enabled != next.observability.metrics_enabled
        || current.observability.metrics_address != next.observability.metrics_address
    {
        fields.push("observability.metrics");
    }
    if current.observability.log_level != next.observability.log_level {
        fields.push("observability.log_level");
    }
    if current.security.enable_headers != next.security.enable_headers {
        fields.push("security.enable_headers");
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_settings_need_no_restart() {
        let current = ProxyConfig::default();
        let mut next = current.clone();
        next.proxy.request_timeout_ms = 5_000;
        next.proxy.debug_headers = true;
        next.rate_limit.max_requests = 10;
        next.origins.allowed = vec!["https://app.example".into()];

        assert!(restart_only_changes(&current, &next).is_empty());
    }

    #[test]
    fn test_startup_settings_are_reported() {
        let current = ProxyConfig::default();
        let mut next = current.clone();
        next.proxy.blocked_domains = vec!["evil.example".into()];
        next.proxy.max_redirects = 2;
        next.observability.metrics_enabled = true;

        assert_eq!(
            restart_only_changes(&current, &next),
            vec!["proxy.blocked_domains", "proxy.max_redirects", "observability.metrics"]
        );
    }
}
