//! Conversions between Rust values and SQLite column representations.
//!
//! Versions are stored as signed integers.

use crate::{Error, Result};

// ─── Version ─────────────────────────────────────────────────────────────────

pub fn encode_version(v: u64) -> Result<i64> {
  i64::try_from(v).map_err(|_| Error::VersionOutOfRange(v))
}

pub fn decode_version(v: i64) -> Result<u64> {
  u64::try_from(v)
    .ok()
    .filter(|v| *v > 0)
    .ok_or(Error::CorruptVersion(v))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns read from a `kv` row.
pub struct RawEntry {
  pub value:   Vec<u8>,
  pub version: i64,
}

impl RawEntry {
  pub fn into_versioned(self) -> Result<conflink_core::Versioned> {
    Ok(conflink_core::Versioned {
      value:   self.value,
      version: decode_version(self.version)?,
    })
  }
}
