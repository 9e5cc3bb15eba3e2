//! [`SqliteStore`], the SQLite implementation of [`KvStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use conflink_core::store::{KvStore, Versioned};

use crate::{
  Result,
  encode::{RawEntry, decode_version, encode_version},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A key/value store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All calls go
/// through one connection thread, so each statement sees the effects of every
/// statement issued before it.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl KvStore for SqliteStore {
  type Error = crate::Error;

  async fn get(&self, key: &str) -> Result<Option<Versioned>> {
    let key = key.to_owned();
    let raw: Option<RawEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value, version FROM kv
               WHERE key = ?1 AND value IS NOT NULL",
              rusqlite::params![key],
              |row| {
                Ok(RawEntry {
                  value:   row.get(0)?,
                  version: row.get(1)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawEntry::into_versioned).transpose()
  }

  async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
    let key = key.to_owned();
    let version: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO kv (key, value, version)
           VALUES (?1, ?2, 1)
           ON CONFLICT (key) DO UPDATE
             SET value   = excluded.value,
                 version = kv.version + 1
           RETURNING version",
          rusqlite::params![key, value],
          |row| row.get(0),
        )?)
      })
      .await?;
    decode_version(version)
  }

  async fn compare_and_set(
    &self,
    key: &str,
    expected: Option<u64>,
    value: Vec<u8>,
  ) -> Result<bool> {
    let key = key.to_owned();
    let expected = expected.map(encode_version).transpose()?;

    let changed = self
      .conn
      .call(move |conn| {
        let changed = match expected {
          // Absent, or a deleted row whose version carries on.
          None => conn.execute(
            "INSERT INTO kv (key, value, version)
             VALUES (?1, ?2, 1)
             ON CONFLICT (key) DO UPDATE
               SET value   = excluded.value,
                   version = kv.version + 1
               WHERE kv.value IS NULL",
            rusqlite::params![key, value],
          )?,
          Some(version) => conn.execute(
            "UPDATE kv
             SET value = ?2, version = version + 1
             WHERE key = ?1 AND version = ?3 AND value IS NOT NULL",
            rusqlite::params![key, value, version],
          )?,
        };
        Ok(changed)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE kv SET value = NULL, version = version + 1
           WHERE key = ?1 AND value IS NOT NULL",
          rusqlite::params![key],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
