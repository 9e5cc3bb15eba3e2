//! The `KvStore` trait and the atomic read-modify-write primitive built on it.
//!
//! Backends (e.g. `conflink-store-sqlite`, or [`crate::memory::MemoryStore`])
//! provide version-stamped values and a conditional write. Everything that
//! mutates the subscription index goes through [`atomic_modify`].

use std::{future::Future, time::Duration};

use thiserror::Error;

use crate::{Error, Result};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A stored value with the version it was written at. Versions start at 1 and
/// increase by one on every successful write or delete of the key; a key that
/// is deleted and written again never reuses an earlier version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
  pub value:   Vec<u8>,
  pub version: u64,
}

/// Abstraction over the host's key/value storage.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait KvStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read a key. Returns `None` if the key has never been written or was
  /// deleted.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Versioned>, Self::Error>> + Send + 'a;

  /// Write unconditionally, returning the new version.
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: Vec<u8>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Write only if the key is still at `expected` (`None`: the key must not
  /// exist, or must have been deleted). Returns `false`, writing nothing, when
  /// another writer got there first.
  fn compare_and_set<'a>(
    &'a self,
    key: &'a str,
    expected: Option<u64>,
    value: Vec<u8>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Remove a key. Its version still advances, so a writer holding a version
  /// read before the delete cannot overwrite a later re-creation.
  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Bounds on how hard [`atomic_modify`] fights concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total write attempts, including the first. Zero is treated as one.
  pub max_attempts:    u32,
  /// Sleep after the first lost race; doubled after each further one.
  pub initial_backoff: Duration,
  pub max_backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:    5,
      initial_backoff: Duration::from_millis(30),
      max_backoff:     Duration::from_millis(960),
    }
  }
}

impl RetryPolicy {
  fn backoff_after(&self, lost: u32) -> Duration {
    let factor = 1u32.checked_shl(lost.saturating_sub(1)).unwrap_or(u32::MAX);
    self
      .initial_backoff
      .saturating_mul(factor)
      .min(self.max_backoff)
  }
}

/// Every attempt lost its conditional write to a concurrent writer.
#[derive(Debug, Error)]
#[error("gave up after {attempts} conflicting write attempts")]
pub struct WriteConflict {
  pub attempts: u32,
}

// ─── Atomic modify ───────────────────────────────────────────────────────────

/// Read `key`, apply `modify` to its current bytes and write the result back
/// only if nobody else wrote the key in between.
///
/// `modify` returns the new bytes plus a value handed back to the caller once
/// the write commits. On a lost race the whole cycle is retried against the
/// freshly read value, so `modify` must be safe to call more than once. An
/// error from `modify` aborts without writing. If `modify` returns the bytes it
/// was given, nothing is written.
pub async fn atomic_modify<S, F, T>(
  store: &S,
  key: &str,
  policy: &RetryPolicy,
  mut modify: F,
) -> Result<T>
where
  S: KvStore + ?Sized,
  F: FnMut(Option<&[u8]>) -> Result<(Vec<u8>, T)> + Send,
  T: Send,
{
  let max_attempts = policy.max_attempts.max(1);

  for attempt in 1..=max_attempts {
    let current = store
      .get(key)
      .await
      .map_err(|e| Error::storage("read", key, e))?;
    let (initial, expected) = match &current {
      Some(v) => (Some(v.value.as_slice()), Some(v.version)),
      None => (None, None),
    };

    let (modified, output) = modify(initial)?;
    if initial == Some(modified.as_slice()) {
      tracing::debug!(key, attempt, "value unchanged; skipping write");
      return Ok(output);
    }

    let committed = store
      .compare_and_set(key, expected, modified)
      .await
      .map_err(|e| Error::storage("write", key, e))?;
    if committed {
      tracing::debug!(key, attempt, ?expected, "write committed");
      return Ok(output);
    }

    tracing::debug!(key, attempt, ?expected, "lost write race; retrying");
    if attempt < max_attempts {
      tokio::time::sleep(policy.backoff_after(attempt)).await;
    }
  }

  tracing::warn!(key, attempts = max_attempts, "write attempt limit reached");
  Err(Error::storage(
    "atomic modify",
    key,
    WriteConflict { attempts: max_attempts },
  ))
}
