//! Shared application state.

use crate::config::Config;
use chrono::Local;
use promptline_core::{auto_log_path, RegistryConfig, SessionRegistry};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Config,
    /// Disambiguates auto-named transcripts created within the same second.
    log_seq: AtomicU64,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new(RegistryConfig {
            grace_period: config.grace_period(),
        }));
        Self {
            registry,
            config,
            log_seq: AtomicU64::new(1),
        }
    }

    /// Next auto-named transcript path for `command` under `log_dir`.
    pub fn next_log_path(&self, command: &str) -> PathBuf {
        let seq = self.log_seq.fetch_add(1, Ordering::Relaxed);
        auto_log_path(&self.config.log_dir, command, Local::now(), seq)
    }
}
