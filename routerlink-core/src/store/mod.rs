// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Channel Storage
//!
//! One SQLite database per channel instance, holding the outbound spool
//! and the anti-duplicate fingerprint set. No cross-version format
//! stability is promised; the store only has to read back its own writes.

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

pub use error::StoreError;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection};

/// SQLite-backed store for one channel instance.
///
/// The spool table keeps not-yet-confirmed outbound payloads keyed by an
/// auto-incrementing slot; the fingerprint table keeps the bounded set of
/// recently seen inbound payload fingerprints. Both are owned by their
/// components and accessed under this store's own lock, independent of
/// the connection engine's critical section.
pub struct ChannelStore {
    conn: Mutex<Connection>,
}

impl ChannelStore {
    /// Opens (or creates) the store for a channel instance under `dir`.
    ///
    /// The database file is keyed by domain and local id so that many
    /// channel instances can share one data directory.
    pub fn open(dir: &Path, domain: i32, local_id: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Self::open_path(&Self::instance_path(dir, domain, local_id))
    }

    /// Opens a store at an explicit database path.
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = ChannelStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = ChannelStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Database file path for a channel instance.
    pub fn instance_path(dir: &Path, domain: i32, local_id: u64) -> PathBuf {
        dir.join(format!("channel-{}-{}.db", domain, local_id))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS spool_entries (
                 slot INTEGER PRIMARY KEY AUTOINCREMENT,
                 payload BLOB NOT NULL
             );
             CREATE TABLE IF NOT EXISTS seen_fingerprints (
                 position INTEGER PRIMARY KEY,
                 fingerprint INTEGER NOT NULL
             );",
        )?;
        Ok(())
    }

    // === Spool Operations ===

    /// Persists an outbound payload and returns its slot.
    pub fn insert_spool_entry(&self, payload: &[u8]) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO spool_entries (payload) VALUES (?1)",
            params![payload],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Removes a confirmed (or withdrawn) payload by slot.
    pub fn delete_spool_entry(&self, slot: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM spool_entries WHERE slot = ?1", params![slot])?;
        Ok(rows > 0)
    }

    /// Drains every persisted spool payload in slot order, deleting the
    /// rows in the same transaction. Used once at spooler construction to
    /// replay the log into memory; the caller re-persists each payload
    /// through the normal enqueue path.
    pub fn drain_spool(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let payloads = {
            let mut stmt =
                tx.prepare("SELECT payload FROM spool_entries ORDER BY slot")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.execute("DELETE FROM spool_entries", [])?;
        tx.commit()?;
        Ok(payloads)
    }

    /// Counts persisted spool entries.
    pub fn count_spool_entries(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM spool_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // === Anti-Duplicate Fingerprint Operations ===

    /// Loads the persisted fingerprint set in insertion order.
    pub fn load_fingerprints(&self) -> Result<Vec<u32>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT fingerprint FROM seen_fingerprints ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0).map(|v| v as u32))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Database)
    }

    /// Rewrites the full fingerprint set. Called synchronously after every
    /// filter mutation.
    pub fn replace_fingerprints(&self, fingerprints: &[u32]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM seen_fingerprints", [])?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO seen_fingerprints (position, fingerprint) VALUES (?1, ?2)")?;
            for (position, fingerprint) in fingerprints.iter().enumerate() {
                stmt.execute(params![position as i64, *fingerprint as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
