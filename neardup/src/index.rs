//! The banding index: signatures partitioned into bands and bucketed per band.

use std::hash::{Hash, Hasher};

use fasthash::{CityHasher, FastHasher};
use hashbrown::{HashMap, HashSet};

use crate::errors::{EngineError, Result};
use crate::DocId;

/// Computes the probability that two documents with true Jaccard similarity
/// `j` become candidates under banding with `num_bands` bands of
/// `rows_per_band` rows: `1 - (1 - j^r)^b`.
///
/// The closed form assumes independence between bands, an approximation
/// inherent to LSH banding; empirical candidate rates deviate from it by
/// statistical noise.
pub fn candidate_probability(j: f64, num_bands: usize, rows_per_band: usize) -> f64 {
    1. - (1. - j.powi(rows_per_band as i32)).powi(num_bands as i32)
}

/// Chooses `(num_bands, rows_per_band)` with `b*r == len` whose S-curve
/// midpoint `(1/b)^(1/r)` is closest to `threshold`.
pub fn optimize_bands(len: usize, threshold: f64) -> (usize, usize) {
    let mut best = (1, len);
    let mut best_diff = f64::MAX;
    for b in 1..=len {
        if len % b != 0 {
            continue;
        }
        let r = len / b;
        let midpoint = (1. / b as f64).powf(1. / r as f64);
        let diff = (midpoint - threshold).abs();
        if diff < best_diff {
            best = (b, r);
            best_diff = diff;
        }
    }
    best
}

/// An index over MinHash signatures using LSH banding.
///
/// Each signature of length `b*r` is split into `b` contiguous bands of `r`
/// components. Every band is hashed to a bucket key and the document id is
/// recorded in that band's bucket table. Documents sharing a bucket in at
/// least one band are candidate pairs.
///
/// Signatures are stored in one contiguous arena of fixed-width slots so
/// candidate scoring scans memory linearly.
pub struct BandingIndex {
    pub(crate) num_bands: usize,
    pub(crate) rows_per_band: usize,
    pub(crate) key_seed: u64,
    /// One bucket table per band: bucket key -> id set.
    pub(crate) tables: Vec<HashMap<u64, HashSet<DocId>>>,
    /// Signature arena, `signature_len()` words per slot.
    pub(crate) arena: Vec<u64>,
    pub(crate) slots: HashMap<DocId, usize>,
    pub(crate) free: Vec<usize>,
}

impl BandingIndex {
    /// Creates an empty index.
    ///
    /// # Arguments
    ///
    /// * `num_bands` - Number of bands (must be more than 0).
    /// * `rows_per_band` - Signature components per band (must be more than 0).
    /// * `key_seed` - Seed value for bucket-key hashing.
    pub fn new(num_bands: usize, rows_per_band: usize, key_seed: u64) -> Self {
        assert!(num_bands >= 1 && rows_per_band >= 1);
        Self {
            num_bands,
            rows_per_band,
            key_seed,
            tables: (0..num_bands).map(|_| HashMap::new()).collect(),
            arena: vec![],
            slots: HashMap::new(),
            free: vec![],
        }
    }

    /// Gets the number of bands.
    pub const fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Gets the number of signature components per band.
    pub const fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    /// Gets the signature length accepted by this index.
    pub const fn signature_len(&self) -> usize {
        self.num_bands * self.rows_per_band
    }

    /// Gets the number of indexed documents.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Checks if a document id is indexed.
    pub fn contains(&self, id: DocId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Gets the stored signature of a document.
    pub fn signature(&self, id: DocId) -> Option<&[u64]> {
        let k = self.signature_len();
        self.slots.get(&id).map(|&slot| &self.arena[slot * k..(slot + 1) * k])
    }

    /// Iterates over the indexed document ids in arbitrary order.
    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.slots.keys().copied()
    }

    /// Gets the approximate memory usage in bytes.
    pub fn memory_in_bytes(&self) -> usize {
        let words = std::mem::size_of::<u64>();
        let buckets: usize = self
            .tables
            .iter()
            .flat_map(|t| t.values())
            .map(|ids| words + ids.len() * words)
            .sum();
        self.arena.len() * words + buckets
    }

    /// Inserts a signature under a document id.
    ///
    /// Bucket keys for all bands are computed before any table is touched
    /// and the subsequent updates cannot fail, so an insertion either
    /// completes for all bands or leaves the index unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateId`] if the id is already indexed and
    /// `overwrite` is off; the existing entry is untouched.
    ///
    /// # Panics
    ///
    /// Panics if the signature length differs from [`Self::signature_len`].
    pub fn insert(&mut self, id: DocId, signature: &[u64], overwrite: bool) -> Result<()> {
        let k = self.signature_len();
        assert_eq!(signature.len(), k);
        if self.contains(id) {
            if !overwrite {
                return Err(EngineError::duplicate_id(id));
            }
            self.remove(id)?;
        }
        let keys = self.band_keys(signature);
        let slot = if let Some(slot) = self.free.pop() {
            self.arena[slot * k..(slot + 1) * k].copy_from_slice(signature);
            slot
        } else {
            self.arena.extend_from_slice(signature);
            self.arena.len() / k - 1
        };
        self.slots.insert(id, slot);
        for (table, key) in self.tables.iter_mut().zip(keys) {
            table.entry(key).or_default().insert(id);
        }
        Ok(())
    }

    /// Removes a document id, clearing its membership in every band.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if the id is unknown; the index is
    /// unchanged.
    pub fn remove(&mut self, id: DocId) -> Result<()> {
        let k = self.signature_len();
        let slot = self
            .slots
            .get(&id)
            .copied()
            .ok_or_else(|| EngineError::not_found(id))?;
        let keys = self.band_keys(&self.arena[slot * k..(slot + 1) * k]);
        for (table, key) in self.tables.iter_mut().zip(keys) {
            if let Some(bucket) = table.get_mut(&key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    table.remove(&key);
                }
            }
        }
        self.slots.remove(&id);
        self.free.push(slot);
        Ok(())
    }

    /// Gets the candidate set for a signature: the union of the bucket
    /// contents over all bands, excluding `exclude` if present.
    ///
    /// # Panics
    ///
    /// Panics if the signature length differs from [`Self::signature_len`].
    pub fn candidates_for(&self, signature: &[u64], exclude: Option<DocId>) -> HashSet<DocId> {
        assert_eq!(signature.len(), self.signature_len());
        let mut candidates = HashSet::new();
        for (band, table) in self.tables.iter().enumerate() {
            if let Some(bucket) = table.get(&self.band_key(band, signature)) {
                candidates.extend(bucket);
            }
        }
        if let Some(id) = exclude {
            candidates.remove(&id);
        }
        candidates
    }

    fn band_keys(&self, signature: &[u64]) -> Vec<u64> {
        (0..self.num_bands).map(|band| self.band_key(band, signature)).collect()
    }

    fn band_key(&self, band: usize, signature: &[u64]) -> u64 {
        let beg = band * self.rows_per_band;
        let mut s = CityHasher::with_seed(self.key_seed);
        band.hash(&mut s);
        signature[beg..beg + self.rows_per_band].hash(&mut s);
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Signatures from a whole-word shingling walkthrough: the first two
    // agree on their first band of three components, the third shares no
    // band with either.
    const SIG1: &[u64] = &[2, 1, 1, 2, 1, 1];
    const SIG2: &[u64] = &[2, 1, 1, 1, 1, 1];
    const SIG3: &[u64] = &[1, 1, 3, 4, 4, 1];

    fn populated() -> BandingIndex {
        let mut index = BandingIndex::new(2, 3, 42);
        index.insert(1, SIG1, false).unwrap();
        index.insert(2, SIG2, false).unwrap();
        index.insert(3, SIG3, false).unwrap();
        index
    }

    #[test]
    fn test_banding_candidates() {
        let index = populated();
        let c1 = index.candidates_for(SIG1, Some(1));
        assert!(c1.contains(&2));
        assert!(!c1.contains(&3));
        let c2 = index.candidates_for(SIG2, Some(2));
        assert!(c2.contains(&1));
        assert!(!c2.contains(&3));
        let c3 = index.candidates_for(SIG3, Some(3));
        assert!(c3.is_empty());
    }

    #[test]
    fn test_identical_signatures_share_all_bands() {
        let mut index = BandingIndex::new(2, 3, 42);
        index.insert(1, SIG1, false).unwrap();
        index.insert(2, SIG1, false).unwrap();
        assert!(index.candidates_for(SIG1, None).contains(&1));
        assert!(index.candidates_for(SIG1, None).contains(&2));
    }

    #[test]
    fn test_signature_roundtrip() {
        let index = populated();
        assert_eq!(index.signature(1), Some(SIG1));
        assert_eq!(index.signature(2), Some(SIG2));
        assert_eq!(index.signature(4), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_rejected_and_untouched() {
        let mut index = populated();
        let err = index.insert(1, SIG3, false).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(_)));
        assert_eq!(index.len(), 3);
        assert_eq!(index.signature(1), Some(SIG1));
    }

    #[test]
    fn test_overwrite_replaces_membership() {
        let mut index = populated();
        index.insert(1, SIG3, true).unwrap();
        assert_eq!(index.signature(1), Some(SIG3));
        // Id 1 now shares both bands with id 3 and none with id 2.
        let c = index.candidates_for(SIG3, Some(3));
        assert!(c.contains(&1));
        assert!(!index.candidates_for(SIG2, Some(2)).contains(&1));
    }

    #[test]
    fn test_remove_restores_bucket_tables() {
        let mut index = populated();
        let before = index.tables.clone();
        index.insert(99, SIG2, false).unwrap();
        assert_ne!(index.tables, before);
        index.remove(99).unwrap();
        assert_eq!(index.tables, before);
    }

    #[test]
    fn test_remove_unknown() {
        let mut index = populated();
        let err = index.remove(99).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_slot_reuse() {
        let mut index = populated();
        let words = index.arena.len();
        index.remove(2).unwrap();
        index.insert(4, SIG2, false).unwrap();
        assert_eq!(index.arena.len(), words);
        assert_eq!(index.signature(4), Some(SIG2));
    }

    #[test]
    fn test_candidate_probability_bounds() {
        assert_eq!(candidate_probability(0., 16, 4), 0.);
        assert_eq!(candidate_probability(1., 16, 4), 1.);
        let p = candidate_probability(0.5, 16, 4);
        assert!(p > 0. && p < 1.);
    }

    #[test]
    fn test_candidate_probability_monotonicity() {
        for &j in &[0.1, 0.3, 0.5, 0.7, 0.9] {
            for r in 1..8 {
                let mut prev = 0.;
                for b in 1..=64 {
                    let p = candidate_probability(j, b, r);
                    assert!(p >= prev - 1e-12, "P must not decrease in b");
                    prev = p;
                }
            }
            for b in 1..64 {
                let mut prev = 1.;
                for r in 1..=16 {
                    let p = candidate_probability(j, b, r);
                    assert!(p <= prev + 1e-12, "P must not increase in r");
                    prev = p;
                }
            }
        }
    }

    #[test]
    fn test_optimize_bands() {
        for &t in &[0.5, 0.7, 0.85, 0.9] {
            let (b, r) = optimize_bands(128, t);
            assert_eq!(b * r, 128);
            assert!(b >= 1 && r >= 1);
        }
        // Low thresholds want many bands, high thresholds want long rows.
        let (b_low, _) = optimize_bands(128, 0.2);
        let (b_high, _) = optimize_bands(128, 0.95);
        assert!(b_low > b_high);
    }
}
