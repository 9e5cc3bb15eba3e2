//! conflink server wiring: configuration and the HTTP application.
//!
//! The binary in `main.rs` loads a [`ServerConfig`], opens the SQLite store
//! and serves [`app`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::Router;
use conflink_api::ApiState;
use conflink_core::{KvStore, RetryPolicy, SubscriptionService};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CONFLINK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub store_path:     PathBuf,
  /// Shared secret Confluence must append as `?secret=` to webhook calls.
  #[serde(default)]
  pub webhook_secret: Option<String>,
  #[serde(default)]
  pub retry:          RetryConfig,
}

/// Contention handling for writes to the subscription index.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts:       u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms:     u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self {
      max_attempts:       policy.max_attempts,
      initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
      max_backoff_ms:     policy.max_backoff.as_millis() as u64,
    }
  }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(cfg: RetryConfig) -> Self {
    RetryPolicy {
      max_attempts:    cfg.max_attempts,
      initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
      max_backoff:     Duration::from_millis(cfg.max_backoff_ms),
    }
  }
}

impl ServerConfig {
  /// Layer the TOML file at `path` (if present) under `CONFLINK_*`
  /// environment variables. Nested keys use `__`, e.g.
  /// `CONFLINK_RETRY__MAX_ATTEMPTS`.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CONFLINK")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Application ──────────────────────────────────────────────────────────────

/// Build the HTTP application over `store`.
pub fn app<S>(store: S, config: &ServerConfig) -> Router
where
  S: KvStore + 'static,
{
  let service = SubscriptionService::new(store).with_retry_policy(config.retry.into());
  let state = ApiState::new(Arc::new(service))
    .with_webhook_secret(config.webhook_secret.clone());
  conflink_api::api_router(state).layer(TraceLayer::new_for_http())
}
