//! An in-process [`KvStore`] for tests and single-node embedding.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use tokio::sync::Mutex;

use crate::store::{KvStore, Versioned};

/// A key's last write. `value` is `None` once the key is deleted; the version
/// is kept so a re-created key continues from it.
#[derive(Debug, Clone)]
struct Slot {
  value:   Option<Vec<u8>>,
  version: u64,
}

impl Slot {
  fn live_version(&self) -> Option<u64> {
    self.value.as_ref().map(|_| self.version)
  }
}

/// A [`KvStore`] holding everything in a shared map.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  entries: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }
}

impl KvStore for MemoryStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<Versioned>, Infallible> {
    let entries = self.entries.lock().await;
    Ok(entries.get(key).and_then(|slot| {
      slot.value.clone().map(|value| Versioned {
        value,
        version: slot.version,
      })
    }))
  }

  async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64, Infallible> {
    let mut entries = self.entries.lock().await;
    let version = entries.get(key).map_or(1, |s| s.version + 1);
    entries.insert(key.to_owned(), Slot { value: Some(value), version });
    Ok(version)
  }

  async fn compare_and_set(
    &self,
    key: &str,
    expected: Option<u64>,
    value: Vec<u8>,
  ) -> Result<bool, Infallible> {
    let mut entries = self.entries.lock().await;
    let slot = entries.get(key);
    if slot.and_then(Slot::live_version) != expected {
      return Ok(false);
    }
    let version = slot.map_or(1, |s| s.version + 1);
    entries.insert(key.to_owned(), Slot { value: Some(value), version });
    Ok(true)
  }

  async fn delete(&self, key: &str) -> Result<(), Infallible> {
    let mut entries = self.entries.lock().await;
    if let Some(slot) = entries.get_mut(key)
      && slot.value.is_some()
    {
      slot.value = None;
      slot.version += 1;
    }
    Ok(())
  }
}
