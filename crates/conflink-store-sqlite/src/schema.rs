//! SQL schema for the conflink SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per key. `version` starts at 1 and is bumped by every write and
-- delete; conditional writes compare against it. A deleted key keeps its row
-- with a NULL value so a later re-create continues the version sequence.
CREATE TABLE IF NOT EXISTS kv (
    key      TEXT PRIMARY KEY,
    value    BLOB,
    version  INTEGER NOT NULL CHECK (version > 0)
);

PRAGMA user_version = 1;
";
