//! Durable storage for the accumulated record set.
//!
//! The reconciliation store is the only writer. `save` always receives the
//! whole set and replaces what was stored before.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::identity::IdentityKey;
use crate::types::{AccumulatedRecord, HarvestError, HarvestResult};

/// Load / save / clear contract for the accumulated set.
pub trait RecordStorage: Send {
    fn load(&self) -> HarvestResult<Vec<AccumulatedRecord>>;
    fn save(&mut self, records: &[AccumulatedRecord]) -> HarvestResult<()>;
    fn clear(&mut self) -> HarvestResult<()>;
}

/// SQLite-backed storage: one row per record, JSON payload.
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a database file, creating parent directories.
    pub fn open(path: &Path) -> HarvestResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HarvestError::Persistence(format!(
                        "cannot create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let db = Connection::open(path).map_err(|e| {
            HarvestError::Persistence(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::init(db)
    }

    /// Private database that lives as long as this value.
    pub fn in_memory() -> HarvestResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> HarvestResult<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS listings (
                identity_key TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { db })
    }
}

impl RecordStorage for SqliteStorage {
    fn load(&self) -> HarvestResult<Vec<AccumulatedRecord>> {
        let mut stmt = self
            .db
            .prepare("SELECT identity_key, payload FROM listings ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            let record = serde_json::from_str(&payload).map_err(|e| {
                HarvestError::Persistence(format!("corrupt row '{key}': {e}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn save(&mut self, records: &[AccumulatedRecord]) -> HarvestResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM listings", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO listings (identity_key, position, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, record) in records.iter().enumerate() {
                let payload = serde_json::to_string(record)
                    .map_err(|e| HarvestError::Persistence(format!("serialize: {e}")))?;
                insert.execute(rusqlite::params![
                    IdentityKey::of(&record.record).as_str(),
                    position as i64,
                    payload,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!("saved {} record(s)", records.len());
        Ok(())
    }

    fn clear(&mut self) -> HarvestResult<()> {
        self.db.execute("DELETE FROM listings", [])?;
        Ok(())
    }
}

/// In-process storage. Clones share the same contents, so a test can keep
/// a handle and inspect what the store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<Vec<AccumulatedRecord>>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail, to exercise error paths.
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn stored(&self) -> Vec<AccumulatedRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl RecordStorage for MemoryStorage {
    fn load(&self) -> HarvestResult<Vec<AccumulatedRecord>> {
        Ok(self.stored())
    }

    fn save(&mut self, records: &[AccumulatedRecord]) -> HarvestResult<()> {
        if *self.fail_saves.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(HarvestError::Persistence(
                "memory storage configured to fail".to_string(),
            ));
        }
        *self.records.lock().unwrap_or_else(|p| p.into_inner()) = records.to_vec();
        Ok(())
    }

    fn clear(&mut self) -> HarvestResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateRecord;

    fn record(name: &str) -> AccumulatedRecord {
        let mut candidate = CandidateRecord::new(name, "test");
        candidate.website = Some(format!("https://{}.test", name.to_lowercase()));
        AccumulatedRecord::new(candidate, Utc::now())
    }

    #[test]
    fn test_sqlite_round_trip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("listings.db");

        let mut storage = SqliteStorage::open(&path).unwrap();
        let records = vec![record("Beta"), record("Acme")];
        storage.save(&records).unwrap();
        drop(storage);

        let reopened = SqliteStorage::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), records);
    }

    #[test]
    fn test_sqlite_save_replaces_whole_set() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.save(&[record("Acme"), record("Beta")]).unwrap();
        storage.save(&[record("Gamma")]).unwrap();

        let names: Vec<_> = storage
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.record.name)
            .collect();
        assert_eq!(names, ["Gamma"]);

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_memory_storage_shares_contents_and_can_fail() {
        let handle = MemoryStorage::new();
        let mut storage = handle.clone();
        storage.save(&[record("Acme")]).unwrap();
        assert_eq!(handle.stored().len(), 1);

        handle.fail_saves(true);
        assert!(matches!(
            storage.save(&[]),
            Err(HarvestError::Persistence(_))
        ));
        assert_eq!(handle.stored().len(), 1);
    }
}
