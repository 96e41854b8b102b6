//! # MinHash and LSH
//!
//! Approximate set similarity for large reference buckets.
//!
//! A [`MinHasher`] holds `num_perm` seeded permutations of the form
//! `(a·h + b) mod (2^61 - 1)`, truncated to 32 bits, where `h` is the first
//! four bytes of the SHA-256 digest of an element's byte encoding. The
//! fraction of equal slots between two sketches estimates their Jaccard
//! similarity.
//!
//! An [`LshIndex`] splits sketches into `bands` of `rows` slots and files each
//! band in its own hash table; two sketches become candidates when any band
//! matches exactly. `threshold` and `num_perm` are the knobs of the trade-off:
//! the band layout is chosen to minimise the summed false-positive and
//! false-negative probability mass around `threshold`, and a larger `num_perm`
//! sharpens the cut-off at the cost of memory and hashing time. Results may
//! include dissimilar ids and miss similar ones.

use std::collections::{HashMap, HashSet};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, TrailError};
use crate::shingle::SignatureSet;

/// Mersenne prime `2^61 - 1`, the permutation modulus.
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Slot value of a sketch that has seen no elements.
const EMPTY_SLOT: u32 = u32::MAX;

/// Steps for the numeric integration of the banding error curves.
const INTEGRATION_STEPS: usize = 256;

/// Seeded family of hash permutations.
#[derive(Debug, Clone)]
pub struct MinHasher {
    seed: u64,
    permutations: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_perm: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let permutations = (0..num_perm)
            .map(|_| {
                (
                    rng.gen_range(1..MERSENNE_PRIME),
                    rng.gen_range(0..MERSENNE_PRIME),
                )
            })
            .collect();
        Self { seed, permutations }
    }

    pub fn num_perm(&self) -> usize {
        self.permutations.len()
    }

    /// Sketch a shingle signature; each shingle is hashed as its decimal string.
    pub fn sketch(&self, signature: &SignatureSet) -> MinHash {
        self.sketch_items(signature.iter().map(|s| s.to_string()))
    }

    /// Sketch arbitrary byte-encodable items.
    pub fn sketch_items<I, T>(&self, items: I) -> MinHash
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut values = vec![EMPTY_SLOT; self.permutations.len()];
        for item in items {
            let h = base_hash(item.as_ref());
            for (slot, &(a, b)) in values.iter_mut().zip(&self.permutations) {
                let permuted = (u128::from(a) * u128::from(h) + u128::from(b))
                    % u128::from(MERSENNE_PRIME);
                let permuted = (permuted as u64 & 0xFFFF_FFFF) as u32;
                if permuted < *slot {
                    *slot = permuted;
                }
            }
        }
        MinHash {
            seed: self.seed,
            values,
        }
    }
}

/// First four bytes of the SHA-256 digest, little-endian.
fn base_hash(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Fixed-size MinHash sketch of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinHash {
    seed: u64,
    values: Vec<u32>,
}

impl MinHash {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the sketch has seen no elements.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&v| v == EMPTY_SLOT)
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Estimated Jaccard similarity. Two empty sketches estimate 0.0.
    pub fn jaccard(&self, other: &MinHash) -> Result<f64> {
        if self.seed != other.seed || self.values.len() != other.values.len() {
            return Err(TrailError::InvalidSketch {
                message: format!(
                    "cannot compare sketch (seed {}, {} slots) with (seed {}, {} slots)",
                    self.seed,
                    self.values.len(),
                    other.seed,
                    other.values.len()
                ),
            });
        }
        if self.values.is_empty() || (self.is_empty() && other.is_empty()) {
            return Ok(0.0);
        }
        let equal = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        Ok(equal as f64 / self.values.len() as f64)
    }
}

#[derive(Debug, Clone)]
struct IndexedKey {
    seq: u64,
    band_keys: Vec<Vec<u32>>,
}

/// Banded locality-sensitive hash index over MinHash sketches.
#[derive(Debug, Clone)]
pub struct LshIndex {
    bands: usize,
    rows: usize,
    tables: Vec<HashMap<Vec<u32>, Vec<String>>>,
    keys: HashMap<String, IndexedKey>,
    next_seq: u64,
    /// Hasher seed of the indexed sketches, fixed by the first insert
    seed: Option<u64>,
}

impl LshIndex {
    /// Index tuned for `threshold` with sketches of `num_perm` slots.
    pub fn new(threshold: f64, num_perm: usize) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(TrailError::config(format!(
                "LSH threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        if num_perm < 2 {
            return Err(TrailError::config("LSH needs at least 2 permutations"));
        }
        let (bands, rows) = optimal_bands(threshold, num_perm);
        debug!(
            "[LshIndex] threshold {:.2} with {} permutations -> {} bands x {} rows",
            threshold, num_perm, bands, rows
        );
        Self::with_params(bands, rows)
    }

    /// Index with an explicit band layout.
    pub fn with_params(bands: usize, rows: usize) -> Result<Self> {
        if bands == 0 || rows == 0 {
            return Err(TrailError::InvalidSketch {
                message: format!("bands ({}) and rows ({}) must be positive", bands, rows),
            });
        }
        Ok(Self {
            bands,
            rows,
            tables: vec![HashMap::new(); bands],
            keys: HashMap::new(),
            next_seq: 0,
            seed: None,
        })
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Index a sketch under `key`. Keys must be unique.
    pub fn insert(&mut self, key: impl Into<String>, sketch: &MinHash) -> Result<()> {
        let key = key.into();
        if self.keys.contains_key(&key) {
            return Err(TrailError::DuplicateKey { key });
        }
        let band_keys = self.band_keys(sketch)?;
        if self.seed.is_none() {
            self.seed = Some(sketch.seed);
        }
        for (table, band) in self.tables.iter_mut().zip(&band_keys) {
            table.entry(band.clone()).or_default().push(key.clone());
        }
        self.keys.insert(
            key,
            IndexedKey {
                seq: self.next_seq,
                band_keys,
            },
        );
        self.next_seq += 1;
        Ok(())
    }

    /// Remove `key` from every band. Returns whether it was indexed.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.keys.remove(key) else {
            return false;
        };
        for (table, band) in self.tables.iter_mut().zip(&entry.band_keys) {
            if let Some(ids) = table.get_mut(band) {
                ids.retain(|id| id != key);
                if ids.is_empty() {
                    table.remove(band);
                }
            }
        }
        true
    }

    /// Keys sharing at least one band with `sketch`, in insertion order.
    ///
    /// Fails when `sketch` comes from a differently seeded hasher than the
    /// indexed sketches.
    pub fn query(&self, sketch: &MinHash) -> Result<Vec<String>> {
        let band_keys = self.band_keys(sketch)?;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut hits: Vec<(u64, &str)> = Vec::new();

        for (table, band) in self.tables.iter().zip(&band_keys) {
            let Some(ids) = table.get(band) else {
                continue;
            };
            for id in ids {
                if seen.insert(id.as_str()) {
                    if let Some(entry) = self.keys.get(id) {
                        hits.push((entry.seq, id.as_str()));
                    }
                }
            }
        }

        hits.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(hits.into_iter().map(|(_, id)| id.to_string()).collect())
    }

    fn band_keys(&self, sketch: &MinHash) -> Result<Vec<Vec<u32>>> {
        if let Some(seed) = self.seed.filter(|&seed| seed != sketch.seed) {
            return Err(TrailError::InvalidSketch {
                message: format!(
                    "sketch seed {} does not match indexed seed {}",
                    sketch.seed, seed
                ),
            });
        }
        let needed = self.bands * self.rows;
        if sketch.len() < needed {
            return Err(TrailError::InvalidSketch {
                message: format!(
                    "sketch has {} slots, index needs {} ({} bands x {} rows)",
                    sketch.len(),
                    needed,
                    self.bands,
                    self.rows
                ),
            });
        }
        Ok(sketch.values[..needed]
            .chunks_exact(self.rows)
            .map(|band| band.to_vec())
            .collect())
    }
}

/// Band layout `(bands, rows)` with `bands * rows <= num_perm` minimising the
/// equally weighted false-positive and false-negative probability mass.
fn optimal_bands(threshold: f64, num_perm: usize) -> (usize, usize) {
    let mut best = (1, num_perm);
    let mut best_error = f64::INFINITY;
    for bands in 1..=num_perm {
        for rows in 1..=num_perm / bands {
            let fp = false_positive_mass(threshold, bands, rows);
            let fn_ = false_negative_mass(threshold, bands, rows);
            let error = 0.5 * fp + 0.5 * fn_;
            if error < best_error {
                best_error = error;
                best = (bands, rows);
            }
        }
    }
    best
}

/// Probability that a pair with similarity `s` shares at least one band.
fn collision_probability(s: f64, bands: usize, rows: usize) -> f64 {
    1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32)
}

fn false_positive_mass(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| collision_probability(s, bands, rows), 0.0, threshold)
}

fn false_negative_mass(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| 1.0 - collision_probability(s, bands, rows), threshold, 1.0)
}

/// Midpoint rule over `[a, b]`.
fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let width = (b - a) / INTEGRATION_STEPS as f64;
    (0..INTEGRATION_STEPS)
        .map(|i| f(a + (i as f64 + 0.5) * width))
        .sum::<f64>()
        * width
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_set(range: std::ops::Range<u64>) -> SignatureSet {
        range.collect()
    }

    #[test]
    fn test_sketch_is_deterministic() {
        let set = range_set(0..50);
        let a = MinHasher::new(64, 7).sketch(&set);
        let b = MinHasher::new(64, 7).sketch(&set);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, MinHasher::new(64, 8).sketch(&set));
    }

    #[test]
    fn test_estimate_close_to_exact() {
        let hasher = MinHasher::new(256, 1);
        let a = range_set(0..101);
        let b = range_set(50..151);
        let exact = crate::similarity::jaccard(&a, &b);
        let estimate = hasher.sketch(&a).jaccard(&hasher.sketch(&b)).unwrap();
        assert!((estimate - exact).abs() < 0.15, "{} vs {}", estimate, exact);

        let same = hasher.sketch(&a).jaccard(&hasher.sketch(&a)).unwrap();
        assert_eq!(same, 1.0);
    }

    #[test]
    fn test_empty_sketches() {
        let hasher = MinHasher::new(16, 1);
        let empty = hasher.sketch(&SignatureSet::new());
        assert!(empty.is_empty());
        assert_eq!(empty.jaccard(&empty).unwrap(), 0.0);
        assert!(!hasher.sketch(&range_set(0..3)).is_empty());
    }

    #[test]
    fn test_incomparable_sketches() {
        let set = range_set(0..10);
        let a = MinHasher::new(16, 1).sketch(&set);
        let b = MinHasher::new(32, 1).sketch(&set);
        let c = MinHasher::new(16, 2).sketch(&set);
        assert!(matches!(a.jaccard(&b), Err(TrailError::InvalidSketch { .. })));
        assert!(a.jaccard(&c).is_err());
    }

    #[test]
    fn test_optimal_bands() {
        let (bands, rows) = optimal_bands(0.67, 128);
        assert!(bands * rows <= 128);
        assert!(bands > 1 && rows > 1);

        let (_, strict_rows) = optimal_bands(0.9, 128);
        let (_, loose_rows) = optimal_bands(0.3, 128);
        assert!(strict_rows > loose_rows);
    }

    #[test]
    fn test_lsh_finds_near_duplicates() {
        let hasher = MinHasher::new(128, 1);
        let mut index = LshIndex::new(0.67, 128).unwrap();

        index.insert("base", &hasher.sketch(&range_set(0..100))).unwrap();
        index.insert("other", &hasher.sketch(&range_set(1000..1100))).unwrap();
        assert_eq!(index.len(), 2);

        let near = hasher.sketch(&range_set(0..98));
        assert_eq!(index.query(&near).unwrap(), vec!["base".to_string()]);
    }

    #[test]
    fn test_lsh_insertion_order_and_duplicates() {
        let hasher = MinHasher::new(64, 3);
        let sketch = hasher.sketch(&range_set(0..20));
        let mut index = LshIndex::with_params(8, 8).unwrap();

        index.insert("b", &sketch).unwrap();
        index.insert("a", &sketch).unwrap();
        assert!(matches!(
            index.insert("a", &sketch),
            Err(TrailError::DuplicateKey { .. })
        ));
        assert_eq!(index.query(&sketch).unwrap(), vec!["b", "a"]);

        assert!(index.remove("b"));
        assert!(!index.remove("b"));
        assert!(!index.contains("b"));
        assert_eq!(index.query(&sketch).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_lsh_rejects_short_sketch() {
        let index = LshIndex::with_params(16, 8).unwrap();
        let short = MinHasher::new(64, 1).sketch(&range_set(0..5));
        assert!(index.query(&short).is_err());
        assert!(LshIndex::with_params(0, 4).is_err());
        assert!(LshIndex::new(1.2, 128).is_err());
    }

    #[test]
    fn test_lsh_rejects_foreign_seed() {
        let set = range_set(0..40);
        let mut index = LshIndex::new(0.67, 64).unwrap();
        // Nothing indexed yet: any seed may query
        assert!(index.query(&MinHasher::new(64, 9).sketch(&set)).unwrap().is_empty());

        index.insert("a", &MinHasher::new(64, 1).sketch(&set)).unwrap();
        let foreign = MinHasher::new(64, 2).sketch(&set);
        assert!(matches!(
            index.query(&foreign),
            Err(TrailError::InvalidSketch { .. })
        ));
        assert!(index.insert("b", &foreign).is_err());
        assert!(!index.contains("b"));
        assert_eq!(
            index.query(&MinHasher::new(64, 1).sketch(&set)).unwrap(),
            vec!["a"]
        );
    }
}
