//! Application State
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::Arc;

use sentinel_advisor::Advisor;
use sentinel_config::{load_settings, Settings};

use crate::rate_limit::RateLimiter;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration wrapped in RwLock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    /// The advisor pipeline behind every chat-facing route
    pub advisor: Arc<Advisor>,
    /// Per-client request throttle
    pub rate_limiter: Arc<RateLimiter>,
    /// Which store backend is live ("scylla" or "memory"), surfaced by /health
    pub store_mode: &'static str,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Settings, advisor: Arc<Advisor>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(&config.server.rate_limit));
        Self {
            config: Arc::new(RwLock::new(config)),
            advisor,
            rate_limiter,
            store_mode: "memory",
            env: None,
        }
    }

    /// Create new application state with environment name for reload support
    pub fn with_env(config: Settings, advisor: Arc<Advisor>, env: Option<String>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(&config.server.rate_limit));
        Self {
            config: Arc::new(RwLock::new(config)),
            advisor,
            rate_limiter,
            store_mode: "memory",
            env,
        }
    }

    /// Record which persistence backend the layer was built on
    pub fn with_store_mode(mut self, mode: &'static str) -> Self {
        self.store_mode = mode;
        self
    }

    /// Reload configuration from files
    ///
    /// Reloads config from disk and updates the shared state. Settings that
    /// are read per request (auth, escalation rules, advisor limits) take
    /// effect immediately; CORS and the bind address only apply at startup.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref())
            .map_err(|e| format!("Failed to reload config: {}", e))?;

        let mut config = self.config.write();
        *config = new_config;

        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
