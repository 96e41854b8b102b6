//! # Corpus Index
//!
//! Memoizes shingled reference buckets per `(bucket, tick, shingle_length)`.
//!
//! Lookup order for a bucket:
//! 1. in-memory LRU of shared [`ReferenceBucket`]s
//! 2. the [`SignatureStore`] (signatures saved by an earlier session)
//! 3. the [`CorpusSource`], shingled with the bucket's tick and written back
//!    to the store
//!
//! Buckets are immutable once built and handed out as `Arc`, so concurrent
//! queries share them without copying.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{debug, info, warn};

use crate::bucket::{BucketKey, LengthBuckets, SignatureParams};
use crate::config::EngineConfig;
use crate::corpus::{CorpusSource, ReferenceRecord};
use crate::error::{Result, TrailError};
use crate::lru_cache::LruCache;
use crate::minhash::{LshIndex, MinHasher};
use crate::store::{NullStore, SignatureStore};

/// Shingled reference records of one bucket.
#[derive(Debug)]
pub struct ReferenceBucket {
    key: BucketKey,
    records: Vec<ReferenceRecord>,
    lsh: OnceLock<LshIndex>,
}

impl ReferenceBucket {
    /// Wrap records, sorting them by id and dropping repeated ids.
    pub fn new(key: BucketKey, mut records: Vec<ReferenceRecord>) -> Self {
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let before = records.len();
        records.dedup_by(|later, earlier| later.id == earlier.id);
        if records.len() < before {
            warn!(
                "[CorpusIndex] Bucket {} had {} repeated track ids",
                key.bucket,
                before - records.len()
            );
        }
        Self {
            key,
            records,
            lsh: OnceLock::new(),
        }
    }

    pub fn key(&self) -> BucketKey {
        self.key
    }

    /// Records in ascending id order.
    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// LSH index over the bucket's non-empty signatures.
    ///
    /// Built on first use; later calls return the same index regardless of
    /// the arguments.
    pub fn lsh_index(&self, hasher: &MinHasher, threshold: f64) -> Result<&LshIndex> {
        if let Some(index) = self.lsh.get() {
            return Ok(index);
        }

        let mut index = LshIndex::new(threshold, hasher.num_perm())?;
        for record in self.records.iter().filter(|r| !r.signature.is_empty()) {
            index.insert(record.id.clone(), &hasher.sketch(&record.signature))?;
        }
        debug!(
            "[CorpusIndex] Built LSH for bucket {} ({} of {} records)",
            self.key.bucket,
            index.len(),
            self.records.len()
        );

        // A concurrent builder may have won; both indexes are identical
        let _ = self.lsh.set(index);
        self.lsh.get().ok_or_else(|| TrailError::InvalidSketch {
            message: "LSH index missing after build".to_string(),
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cached_buckets: usize,
    /// Buckets served by the signature store
    pub store_loads: u64,
    /// Buckets shingled from the corpus source
    pub source_loads: u64,
}

/// Length-bucketed, cached view of a reference corpus.
pub struct CorpusIndex {
    source: Box<dyn CorpusSource>,
    store: Arc<dyn SignatureStore>,
    buckets: LengthBuckets,
    hasher: MinHasher,
    lsh_threshold: f64,
    cache: Mutex<LruCache<BucketKey, Arc<ReferenceBucket>>>,
    store_loads: AtomicU64,
    source_loads: AtomicU64,
}

impl CorpusIndex {
    pub fn new(config: &EngineConfig, source: impl CorpusSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            store: Arc::new(NullStore),
            buckets: LengthBuckets::from_config(config),
            hasher: MinHasher::new(config.num_permutations, config.minhash_seed),
            lsh_threshold: config.lsh_threshold,
            cache: Mutex::new(LruCache::new(config.bucket_cache_capacity)),
            store_loads: AtomicU64::new(0),
            source_loads: AtomicU64::new(0),
        }
    }

    /// Use `store` as the persistent layer behind the in-memory cache.
    pub fn with_store(mut self, store: Arc<dyn SignatureStore>) -> Self {
        self.store = store;
        self
    }

    pub fn buckets(&self) -> &LengthBuckets {
        &self.buckets
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    pub fn lsh_threshold(&self) -> f64 {
        self.lsh_threshold
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<BucketKey, Arc<ReferenceBucket>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reference bucket for a track of `length_km`. `None` when the length
    /// has no bucket (zero or negative).
    pub fn get_bucket(
        &self,
        length_km: f64,
        shingle_length: usize,
    ) -> Result<Option<Arc<ReferenceBucket>>> {
        match self.buckets.params_for(length_km, shingle_length) {
            Some(params) => self.get_bucket_for(&params).map(Some),
            None => Ok(None),
        }
    }

    /// Reference bucket shingled with exactly `params`.
    pub fn get_bucket_for(&self, params: &SignatureParams) -> Result<Arc<ReferenceBucket>> {
        let key = params.key();
        if let Some(bucket) = self.cache().get(&key) {
            return Ok(bucket);
        }

        // The cache lock is not held during I/O; two threads may build the
        // same bucket and the later insert replaces the earlier one.
        let bucket = Arc::new(self.load_bucket(params)?);
        if let Some(evicted) = self.cache().insert(key, Arc::clone(&bucket)) {
            debug!(
                "[CorpusIndex] Evicted bucket {} (k={})",
                evicted.bucket, evicted.shingle_length
            );
        }
        Ok(bucket)
    }

    fn load_bucket(&self, params: &SignatureParams) -> Result<ReferenceBucket> {
        let key = params.key();

        if let Some(records) = self.store.load(&key)? {
            self.store_loads.fetch_add(1, Ordering::Relaxed);
            debug!(
                "[CorpusIndex] Bucket {} (k={}) restored from store: {} records",
                key.bucket,
                key.shingle_length,
                records.len()
            );
            return Ok(ReferenceBucket::new(key, records));
        }

        let raw = self.source.load_bucket(params.bucket)?;
        let mut records = Vec::with_capacity(raw.len());
        for (id, entry) in &raw {
            let record = ReferenceRecord::from_raw(id, entry, params).map_err(|e| {
                TrailError::CorpusFormat {
                    origin: format!("bucket {} entry '{}'", params.bucket, id),
                    message: e.to_string(),
                }
            })?;
            records.extend(record);
        }
        self.source_loads.fetch_add(1, Ordering::Relaxed);

        let bucket = ReferenceBucket::new(key, records);
        info!(
            "[CorpusIndex] Shingled bucket {} (tick {:.2} km, k={}): {} records",
            key.bucket,
            params.tick_km,
            key.shingle_length,
            bucket.len()
        );

        if let Err(e) = self.store.save(&key, bucket.records()) {
            warn!(
                "[CorpusIndex] Could not persist bucket {}: {}",
                key.bucket, e
            );
        }
        Ok(bucket)
    }

    /// Drop one bucket from the in-memory cache.
    pub fn invalidate(&self, key: &BucketKey) -> bool {
        self.cache().remove(key).is_some()
    }

    /// Drop every cached bucket and clear the backing store.
    pub fn clear(&self) -> Result<()> {
        self.cache().clear();
        self.store.clear()
    }

    pub fn stats(&self) -> IndexStats {
        let cache = self.cache();
        let counters = cache.counters();
        IndexStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            cached_buckets: cache.len(),
            store_loads: self.store_loads.load(Ordering::Relaxed),
            source_loads: self.source_loads.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{MemoryCorpus, RawReference};
    use crate::store::MemoryStore;
    use crate::Difficulty;

    fn corpus() -> MemoryCorpus {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(0, "b", RawReference::Slopes(vec![10.0, 10.0, -20.0], "Easy".into()));
        corpus.insert(0, "a", RawReference::Slopes(vec![35.0, 35.0], "Difficult".into()));
        corpus.insert(0, "c", RawReference::Slopes(vec![0.0], "Unknown".into()));
        corpus.insert(1, "d", RawReference::Slopes(vec![5.0], "Intermediate".into()));
        corpus
    }

    fn config(capacity: usize) -> EngineConfig {
        EngineConfig {
            bucket_cache_capacity: capacity,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_bucket_records_sorted_and_filtered() {
        let index = CorpusIndex::new(&config(4), corpus());
        let bucket = index.get_bucket(3.0, 1).unwrap().unwrap();
        let ids: Vec<&str> = bucket.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(bucket.records()[0].label, Difficulty::Difficult);
        assert_eq!(bucket.key().shingle_length, 1);
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let index = CorpusIndex::new(&config(4), corpus());
        let first = index.get_bucket(3.0, 1).unwrap().unwrap();
        let second = index.get_bucket(4.0, 1).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = index.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.source_loads, 1);
        assert_eq!(stats.cached_buckets, 1);
    }

    #[test]
    fn test_shingle_length_is_part_of_key() {
        let index = CorpusIndex::new(&config(4), corpus());
        let singles = index.get_bucket(3.0, 1).unwrap().unwrap();
        let pairs = index.get_bucket(3.0, 2).unwrap().unwrap();
        assert_ne!(singles.records()[1].signature, pairs.records()[1].signature);
        assert_eq!(index.stats().source_loads, 2);
    }

    #[test]
    fn test_zero_length_has_no_bucket() {
        let index = CorpusIndex::new(&config(4), corpus());
        assert!(index.get_bucket(0.0, 1).unwrap().is_none());
    }

    #[test]
    fn test_eviction_and_invalidate() {
        let index = CorpusIndex::new(&config(1), corpus());
        index.get_bucket(3.0, 1).unwrap();
        index.get_bucket(7.0, 1).unwrap();
        assert_eq!(index.stats().evictions, 1);

        let key = BucketKey::new(1, 0.5, 1);
        assert!(index.invalidate(&key));
        assert!(!index.invalidate(&key));
        assert_eq!(index.stats().cached_buckets, 0);
    }

    #[test]
    fn test_store_is_written_and_reused() {
        let store = Arc::new(MemoryStore::new());
        let index = CorpusIndex::new(&config(4), corpus()).with_store(store.clone());
        let built = index.get_bucket(3.0, 1).unwrap().unwrap();
        assert_eq!(store.len(), 1);

        // A fresh index with an empty source is served by the store
        let restored = CorpusIndex::new(&config(4), MemoryCorpus::new()).with_store(store.clone());
        let bucket = restored.get_bucket(3.0, 1).unwrap().unwrap();
        assert_eq!(bucket.records(), built.records());
        assert_eq!(restored.stats().store_loads, 1);
        assert_eq!(restored.stats().source_loads, 0);

        restored.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_shared_across_ticks() {
        let mut corpus = MemoryCorpus::new();
        let points: Vec<[f64; 2]> = (0..31).map(|i| [48.0 + i as f64 * 0.001, 8.0]).collect();
        let elevations: Vec<f64> = (0..31).map(|i| ((i * 7) % 13) as f64 * 15.0).collect();
        corpus.insert(
            0,
            "hilly",
            RawReference::Track {
                points,
                elevations,
                label: "Difficult".into(),
            },
        );
        let fine = config(4);
        let coarse = EngineConfig {
            base_tick_km: 1.0,
            ..config(4)
        };

        let store = Arc::new(MemoryStore::new());
        CorpusIndex::new(&fine, corpus.clone())
            .with_store(store.clone())
            .get_bucket(3.0, 1)
            .unwrap();

        let shared = CorpusIndex::new(&coarse, corpus.clone()).with_store(store.clone());
        let from_shared = shared.get_bucket(3.0, 1).unwrap().unwrap();
        assert_eq!(shared.stats().store_loads, 0);
        assert_eq!(shared.stats().source_loads, 1);
        assert_eq!(store.len(), 2);

        let fresh = CorpusIndex::new(&coarse, corpus).get_bucket(3.0, 1).unwrap().unwrap();
        assert_eq!(from_shared.records(), fresh.records());
    }

    #[test]
    fn test_bad_entry_reports_bucket() {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(
            0,
            "broken",
            RawReference::Track {
                points: vec![[48.0, 8.0], [48.01, 8.0]],
                elevations: vec![1.0],
                label: "Easy".into(),
            },
        );
        let index = CorpusIndex::new(&config(4), corpus);
        let err = index.get_bucket(1.0, 1).unwrap_err();
        assert!(matches!(err, TrailError::CorpusFormat { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_repeated_ids_are_dropped() {
        let record = |label| ReferenceRecord {
            id: "same".into(),
            signature: [9].into(),
            label,
        };
        let key = BucketKey::new(0, 0.25, 1);
        let bucket = ReferenceBucket::new(key, vec![record(Difficulty::Easy), record(Difficulty::Difficult)]);
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.records()[0].label, Difficulty::Easy);
    }

    #[test]
    fn test_lsh_index_is_built_once() {
        let index = CorpusIndex::new(&config(4), corpus());
        let bucket = index.get_bucket(3.0, 1).unwrap().unwrap();
        let lsh = bucket.lsh_index(index.hasher(), index.lsh_threshold()).unwrap();
        assert_eq!(lsh.len(), 2);
        let again = bucket.lsh_index(index.hasher(), 0.2).unwrap();
        assert!(std::ptr::eq(lsh, again));
    }
}
