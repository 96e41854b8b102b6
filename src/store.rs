//! # Signature Store
//!
//! Backing store for shingled reference buckets, keyed by
//! `(bucket, tick, shingle_length)`. Shingling a bucket is cheap compared with
//! loading rasters, but a persistent store lets later sessions skip corpus
//! parsing entirely.
//!
//! - [`MemoryStore`]: process-local map
//! - [`NullStore`]: stores nothing
//! - `SqliteStore`: MessagePack blobs in SQLite (feature `persistence`)

use std::collections::HashMap;
use std::sync::RwLock;

use crate::bucket::BucketKey;
use crate::corpus::ReferenceRecord;
use crate::error::{Result, TrailError};

/// Persistence for shingled reference buckets.
pub trait SignatureStore: Send + Sync {
    /// Records previously saved under `key`, if any.
    fn load(&self, key: &BucketKey) -> Result<Option<Vec<ReferenceRecord>>>;

    /// Save (or replace) the records of `key`.
    fn save(&self, key: &BucketKey, records: &[ReferenceRecord]) -> Result<()>;

    /// Drop every stored bucket.
    fn clear(&self) -> Result<()>;
}

fn poisoned() -> TrailError {
    TrailError::Persistence {
        message: "store lock poisoned".to_string(),
    }
}

/// Store that keeps nothing; every load misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl SignatureStore for NullStore {
    fn load(&self, _key: &BucketKey) -> Result<Option<Vec<ReferenceRecord>>> {
        Ok(None)
    }

    fn save(&self, _key: &BucketKey, _records: &[ReferenceRecord]) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<BucketKey, Vec<ReferenceRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignatureStore for MemoryStore {
    fn load(&self, key: &BucketKey) -> Result<Option<Vec<ReferenceRecord>>> {
        let buckets = self.buckets.read().map_err(|_| poisoned())?;
        Ok(buckets.get(key).cloned())
    }

    fn save(&self, key: &BucketKey, records: &[ReferenceRecord]) -> Result<()> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        buckets.insert(*key, records.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.buckets.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use std::path::Path;
    use std::sync::Mutex;

    use log::{debug, info};
    use rusqlite::{params, Connection, OptionalExtension};

    use super::{poisoned, SignatureStore};
    use crate::bucket::BucketKey;
    use crate::corpus::ReferenceRecord;
    use crate::error::{Result, TrailError};

    fn db_error(e: impl std::fmt::Display) -> TrailError {
        TrailError::Persistence {
            message: e.to_string(),
        }
    }

    /// SQLite-backed store; one row per bucket, records as a MessagePack blob.
    pub struct SqliteStore {
        db: Mutex<Connection>,
    }

    impl SqliteStore {
        /// Open (or create) a store at `db_path`.
        pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
            let db_path = db_path.as_ref();
            let db = Connection::open(db_path).map_err(db_error)?;
            Self::init_schema(&db)?;
            info!("[SignatureStore] Opened {}", db_path.display());
            Ok(Self { db: Mutex::new(db) })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> Result<Self> {
            let db = Connection::open_in_memory().map_err(db_error)?;
            Self::init_schema(&db)?;
            Ok(Self { db: Mutex::new(db) })
        }

        fn init_schema(conn: &Connection) -> Result<()> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS bucket_signatures (
                    bucket INTEGER NOT NULL,
                    tick_micro_km INTEGER NOT NULL,
                    shingle_length INTEGER NOT NULL,
                    records BLOB NOT NULL,
                    created_at INTEGER DEFAULT (strftime('%s', 'now')),
                    PRIMARY KEY (bucket, tick_micro_km, shingle_length)
                );
                "#,
            )
            .map_err(db_error)
        }
    }

    impl SignatureStore for SqliteStore {
        fn load(&self, key: &BucketKey) -> Result<Option<Vec<ReferenceRecord>>> {
            let db = self.db.lock().map_err(|_| poisoned())?;
            let blob: Option<Vec<u8>> = db
                .query_row(
                    "SELECT records FROM bucket_signatures
                     WHERE bucket = ? AND tick_micro_km = ? AND shingle_length = ?",
                    params![key.bucket, key.tick_micro_km as i64, key.shingle_length as i64],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)?;

            match blob {
                Some(blob) => {
                    let records: Vec<ReferenceRecord> =
                        rmp_serde::from_slice(&blob).map_err(db_error)?;
                    debug!(
                        "[SignatureStore] Loaded {} records for bucket {} (k={})",
                        records.len(),
                        key.bucket,
                        key.shingle_length
                    );
                    Ok(Some(records))
                }
                None => Ok(None),
            }
        }

        fn save(&self, key: &BucketKey, records: &[ReferenceRecord]) -> Result<()> {
            let blob = rmp_serde::to_vec(records).map_err(db_error)?;
            let db = self.db.lock().map_err(|_| poisoned())?;
            db.execute(
                "INSERT OR REPLACE INTO bucket_signatures
                 (bucket, tick_micro_km, shingle_length, records)
                 VALUES (?, ?, ?, ?)",
                params![key.bucket, key.tick_micro_km as i64, key.shingle_length as i64, blob],
            )
            .map_err(db_error)?;
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            let db = self.db.lock().map_err(|_| poisoned())?;
            db.execute_batch("DELETE FROM bucket_signatures;")
                .map_err(db_error)
        }
    }
}
