//! The engine facade: configuration, insertion, removal, querying, and bulk
//! loading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use minwise::{estimated_jaccard, jaccard_index, MinHasher};
use rand_xoshiro::rand_core::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::errors::{EngineError, Result};
use crate::index::BandingIndex;
use crate::shingle::{ShingleConfig, ShingleMode, Shingler};
use crate::DocId;

/// Number of documents processed between cancellation checks in bulk loads.
const BATCH_SIZE: usize = 1024;

/// Engine configuration.
///
/// The signature length is `num_bands * rows_per_band` and is fixed for the
/// lifetime of an engine, as are the hash functions derived from the seed.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of bands the signature is split into (must be more than 0).
    pub num_bands: usize,
    /// Signature components per band (must be more than 0).
    pub rows_per_band: usize,
    /// Number of units per shingle (must be more than 0).
    pub window: usize,
    /// Tokenization unit for shingling.
    pub mode: ShingleMode,
    /// Folds text to lowercase before shingling?
    pub fold_case: bool,
    /// Collapses runs of whitespace before shingling?
    pub collapse_whitespace: bool,
    /// Seed value for all hashing. If `None`, a random seed is drawn.
    pub seed: Option<u64>,
    /// Retains token sets of indexed documents for exact verification?
    pub retain_tokens: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_bands: 16,
            rows_per_band: 4,
            window: 3,
            mode: ShingleMode::Chars,
            fold_case: true,
            collapse_whitespace: true,
            seed: None,
            retain_tokens: false,
        }
    }
}

/// Cloneable cancellation handle for bulk loads.
///
/// Cancellation is cooperative and checked at document-batch granularity:
/// batches processed before the flag was observed remain inserted, the
/// remainder is left untouched.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A near-duplicate detection engine over MinHash signatures and LSH
/// banding.
///
/// Mutation takes `&mut self`, so a single writer is enforced by
/// construction; queries take `&self` and may run concurrently. The shingler
/// and hash family never mutate after construction and are safe to read from
/// any number of worker threads, which the parallel bulk loader exploits.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) seed: u64,
    pub(crate) shingler: Shingler,
    pub(crate) hasher: MinHasher,
    pub(crate) index: BandingIndex,
    /// Token sets of indexed documents, kept only when configured.
    pub(crate) tokens: HashMap<DocId, Vec<u64>>,
    shows_progress: bool,
}

impl Engine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] when `num_bands`, `rows_per_band`, or
    /// `window` is 0.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        Self::from_seed(config, seed)
    }

    /// Creates an engine with a resolved seed, ignoring `config.seed`.
    pub(crate) fn from_seed(config: EngineConfig, seed: u64) -> Result<Self> {
        if config.num_bands == 0 {
            return Err(EngineError::config("Number of bands must not be 0."));
        }
        if config.rows_per_band == 0 {
            return Err(EngineError::config("Rows per band must not be 0."));
        }
        let mut seeder = rand_xoshiro::SplitMix64::seed_from_u64(seed);
        let shingle_config = ShingleConfig::new(config.window, config.mode, seeder.next_u64())?
            .fold_case(config.fold_case)
            .collapse_whitespace(config.collapse_whitespace);
        let hasher = MinHasher::new(config.num_bands * config.rows_per_band, seeder.next_u64());
        let index = BandingIndex::new(config.num_bands, config.rows_per_band, seeder.next_u64());
        Ok(Self {
            config,
            seed,
            shingler: Shingler::new(shingle_config),
            hasher,
            index,
            tokens: HashMap::new(),
            shows_progress: false,
        })
    }

    /// Shows progress of bulk loads via the standard error output?
    pub const fn shows_progress(mut self, yes: bool) -> Self {
        self.shows_progress = yes;
        self
    }

    /// Gets the configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gets the resolved seed value reproducing this engine's hashing.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Gets the signature length.
    pub fn signature_len(&self) -> usize {
        self.hasher.signature_len()
    }

    /// Gets the number of indexed documents.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Checks if the engine holds no documents.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Gets the banding index.
    pub const fn index(&self) -> &BandingIndex {
        &self.index
    }

    /// Gets the shingler.
    pub const fn shingler(&self) -> &Shingler {
        &self.shingler
    }

    /// Gets the stored signature of a document.
    pub fn signature(&self, id: DocId) -> Option<&[u64]> {
        self.index.signature(id)
    }

    /// Gets the approximate memory usage in bytes.
    pub fn memory_in_bytes(&self) -> usize {
        let retained: usize = self
            .tokens
            .values()
            .map(|t| t.len() * std::mem::size_of::<u64>())
            .sum();
        self.index.memory_in_bytes() + retained
    }

    /// Indexes a document given its raw text.
    ///
    /// # Errors
    ///
    /// * [`EngineError::EmptyDocument`] when the text yields no shingles;
    ///   the document is not indexed.
    /// * [`EngineError::DuplicateId`] when the id is already indexed; the
    ///   existing entry is untouched.
    pub fn insert(&mut self, id: DocId, text: &str) -> Result<()> {
        self.insert_tokens_impl(id, self.shingler.tokens(text), false)
    }

    /// Indexes a document, replacing any existing entry under the same id.
    pub fn insert_overwrite(&mut self, id: DocId, text: &str) -> Result<()> {
        self.insert_tokens_impl(id, self.shingler.tokens(text), true)
    }

    /// Indexes a document given its precomputed token set.
    pub fn insert_tokens(&mut self, id: DocId, tokens: &[u64]) -> Result<()> {
        self.insert_tokens_impl(id, tokens.to_vec(), false)
    }

    fn insert_tokens_impl(&mut self, id: DocId, tokens: Vec<u64>, overwrite: bool) -> Result<()> {
        if !overwrite && self.index.contains(id) {
            return Err(EngineError::duplicate_id(id));
        }
        let sig = self
            .hasher
            .signature(&tokens)
            .ok_or(EngineError::empty_document(Some(id)))?;
        self.index.insert(id, &sig, overwrite)?;
        if self.config.retain_tokens {
            self.tokens.insert(id, tokens);
        }
        Ok(())
    }

    /// Removes a document from the signature map and all bucket tables.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when the id is unknown; the engine is
    /// unchanged.
    pub fn remove(&mut self, id: DocId) -> Result<()> {
        self.index.remove(id)?;
        self.tokens.remove(&id);
        Ok(())
    }

    /// Searches for indexed documents similar to the given text.
    ///
    /// Banding candidates are scored by estimated Jaccard similarity,
    /// filtered by `min_similarity`, and sorted descending with ties broken
    /// by ascending id.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyDocument`] when the text yields no shingles.
    pub fn query(&self, text: &str, min_similarity: f64) -> Result<Vec<(DocId, f64)>> {
        let tokens = self.shingler.tokens(text);
        let sig = self
            .hasher
            .signature(&tokens)
            .ok_or(EngineError::empty_document(None))?;
        Ok(self.rank(&sig, None, min_similarity))
    }

    /// Searches for indexed documents similar to a precomputed token set,
    /// the query counterpart of [`Self::insert_tokens`].
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyDocument`] when the token set is empty.
    pub fn query_tokens(&self, tokens: &[u64], min_similarity: f64) -> Result<Vec<(DocId, f64)>> {
        let sig = self
            .hasher
            .signature(tokens)
            .ok_or(EngineError::empty_document(None))?;
        Ok(self.rank(&sig, None, min_similarity))
    }

    /// Searches for indexed documents similar to an already-indexed one,
    /// excluding the document itself from the results.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when the id is unknown.
    pub fn query_id(&self, id: DocId, min_similarity: f64) -> Result<Vec<(DocId, f64)>> {
        let sig = self
            .index
            .signature(id)
            .ok_or(EngineError::not_found(id))?
            .to_vec();
        Ok(self.rank(&sig, Some(id), min_similarity))
    }

    /// Gets the estimated Jaccard similarity between two indexed documents.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when either id is unknown.
    pub fn estimated_between(&self, id1: DocId, id2: DocId) -> Result<f64> {
        let s1 = self.index.signature(id1).ok_or(EngineError::not_found(id1))?;
        let s2 = self.index.signature(id2).ok_or(EngineError::not_found(id2))?;
        Ok(estimated_jaccard(s1, s2))
    }

    /// Gets the exact Jaccard similarity between two indexed documents from
    /// their retained token sets, for filtering banding false positives.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when either id has no retained token set
    /// (in particular whenever `retain_tokens` is off).
    pub fn verify_exact(&self, id1: DocId, id2: DocId) -> Result<f64> {
        let t1 = self.tokens.get(&id1).ok_or(EngineError::not_found(id1))?;
        let t2 = self.tokens.get(&id2).ok_or(EngineError::not_found(id2))?;
        Ok(jaccard_index(t1.iter(), t2.iter()))
    }

    fn rank(&self, sig: &[u64], exclude: Option<DocId>, min_similarity: f64) -> Vec<(DocId, f64)> {
        let mut results: Vec<(DocId, f64)> = self
            .index
            .candidates_for(sig, exclude)
            .into_iter()
            .filter_map(|id| {
                let est = estimated_jaccard(sig, self.index.signature(id)?);
                (est >= min_similarity).then_some((id, est))
            })
            .collect();
        results.sort_unstable_by(|x, y| y.1.total_cmp(&x.1).then(x.0.cmp(&y.0)));
        results
    }

    /// Indexes a batch of documents serially, in order.
    ///
    /// Stops at the first failing document; documents inserted before it
    /// remain indexed. Returns the number of inserted documents.
    pub fn insert_batch<I, D>(&mut self, documents: I) -> Result<usize>
    where
        I: IntoIterator<Item = (DocId, D)>,
        D: AsRef<str>,
    {
        let mut inserted = 0;
        for (id, text) in documents {
            self.insert(id, text.as_ref())?;
            inserted += 1;
            if self.shows_progress && inserted % 1000 == 0 {
                eprintln!("Processed {inserted} documents...");
            }
        }
        Ok(inserted)
    }

    /// Indexes a batch of documents with parallel signature computation.
    ///
    /// Signatures for each batch are computed by a parallel map stage over
    /// the shared immutable shingler and hash family, then inserted by a
    /// serialized reduce stage in batch order. The cancel flag is checked
    /// between batches; a cancelled load keeps every fully-processed batch
    /// and leaves the remainder untouched. Returns the number of inserted
    /// documents.
    pub fn insert_batch_parallel<D>(
        &mut self,
        documents: &[(DocId, D)],
        cancel: &CancelFlag,
    ) -> Result<usize>
    where
        D: AsRef<str> + Sync,
    {
        let mut inserted = 0;
        for batch in documents.chunks(BATCH_SIZE) {
            if cancel.is_cancelled() {
                break;
            }
            let shingler = &self.shingler;
            let hasher = &self.hasher;
            let prepared: Vec<Result<(DocId, Vec<u64>, Vec<u64>)>> = batch
                .par_iter()
                .map(|(id, text)| {
                    let tokens = shingler.tokens(text.as_ref());
                    let sig = hasher
                        .signature(&tokens)
                        .ok_or(EngineError::empty_document(Some(*id)))?;
                    Ok((*id, sig, tokens))
                })
                .collect();
            for item in prepared {
                let (id, sig, tokens) = item?;
                self.index.insert(id, &sig, false)?;
                if self.config.retain_tokens {
                    self.tokens.insert(id, tokens);
                }
                inserted += 1;
            }
            if self.shows_progress {
                eprintln!("Processed {inserted} documents...");
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC1: &str = "Who was the first king of England";
    const DOC2: &str = "Who was the first ruler of England";
    const DOC3: &str = "Who was the last pharaoh of Egypt";

    fn word_config(num_bands: usize, rows_per_band: usize) -> EngineConfig {
        EngineConfig {
            num_bands,
            rows_per_band,
            window: 1,
            mode: ShingleMode::Words,
            seed: Some(42),
            retain_tokens: true,
            ..EngineConfig::default()
        }
    }

    fn populated(num_bands: usize, rows_per_band: usize) -> Engine {
        let mut engine = Engine::new(word_config(num_bands, rows_per_band)).unwrap();
        engine.insert(1, DOC1).unwrap();
        engine.insert(2, DOC2).unwrap();
        engine.insert(3, DOC3).unwrap();
        engine
    }

    #[test]
    fn test_invalid_config() {
        for (b, r, w) in [(0, 4, 3), (16, 0, 3), (16, 4, 0)] {
            let config = EngineConfig {
                num_bands: b,
                rows_per_band: r,
                window: w,
                ..EngineConfig::default()
            };
            assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
        }
    }

    #[test]
    fn test_signature_length_invariant() {
        let engine = populated(16, 4);
        assert_eq!(engine.signature_len(), 64);
        for id in [1, 2, 3] {
            assert_eq!(engine.signature(id).unwrap().len(), 64);
        }
    }

    #[test]
    fn test_exact_jaccard_scenario() {
        let engine = populated(16, 4);
        assert_eq!(engine.verify_exact(1, 2).unwrap(), 0.75);
        assert_eq!(engine.verify_exact(1, 3).unwrap(), 0.4);
        assert_eq!(engine.verify_exact(2, 3).unwrap(), 0.4);
    }

    #[test]
    fn test_estimates_order_by_true_similarity() {
        // k=800 puts the estimator's standard error near 0.017, far below
        // the 0.35 gap between the similar and dissimilar pairs.
        let engine = populated(200, 4);
        let e12 = engine.estimated_between(1, 2).unwrap();
        let e13 = engine.estimated_between(1, 3).unwrap();
        let e23 = engine.estimated_between(2, 3).unwrap();
        assert!(e12 > e13);
        assert!(e12 > e23);
        assert_eq!(engine.estimated_between(1, 1).unwrap(), 1.);
    }

    #[test]
    fn test_query_filters_and_orders() {
        // With r=1 any pair sharing a single component collides in some
        // band, so candidacy is near-certain at both similarity levels and
        // the min_similarity filter does the separation.
        let engine = populated(200, 1);
        let hits = engine.query_id(1, 0.6).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 2);
        assert!(hits[0].1 > 0.6);
    }

    #[test]
    fn test_query_tokens_matches_text_query() {
        let engine = populated(200, 1);
        let tokens = engine.shingler().tokens(DOC1);
        let hits = engine.query_tokens(&tokens, 0.6).unwrap();
        assert_eq!(hits, engine.query(DOC1, 0.6).unwrap());
        // Unlike query_id, the querying document is not excluded.
        assert_eq!(hits[0], (1, 1.));
        assert_eq!(hits[1].0, 2);
        assert!(matches!(
            engine.query_tokens(&[], 0.5),
            Err(EngineError::EmptyDocument(_))
        ));
    }

    #[test]
    fn test_query_ties_break_by_id() {
        let mut engine = Engine::new(word_config(16, 4)).unwrap();
        engine.insert(10, DOC1).unwrap();
        engine.insert(5, DOC1).unwrap();
        let hits = engine.query(DOC1, 0.99).unwrap();
        assert_eq!(hits, vec![(5, 1.), (10, 1.)]);
    }

    #[test]
    fn test_determinism_across_runs() {
        let e1 = populated(16, 4);
        let e2 = populated(16, 4);
        for id in [1, 2, 3] {
            assert_eq!(e1.signature(id), e2.signature(id));
        }
        assert_eq!(e1.query(DOC1, 0.).unwrap(), e2.query(DOC1, 0.).unwrap());
    }

    #[test]
    fn test_empty_document_not_indexed() {
        let mut engine = Engine::new(word_config(16, 4)).unwrap();
        let err = engine.insert(1, "   ").unwrap_err();
        assert!(matches!(err, EngineError::EmptyDocument(_)));
        assert!(engine.is_empty());
        assert!(matches!(
            engine.query("  \t ", 0.5),
            Err(EngineError::EmptyDocument(_))
        ));
    }

    #[test]
    fn test_duplicate_and_overwrite() {
        let mut engine = populated(16, 4);
        let sig_before = engine.signature(1).unwrap().to_vec();
        let err = engine.insert(1, DOC3).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(_)));
        assert_eq!(engine.signature(1).unwrap(), sig_before.as_slice());
        engine.insert_overwrite(1, DOC3).unwrap();
        assert_eq!(engine.signature(1).unwrap(), engine.signature(3).unwrap());
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn test_remove_unknown_and_roundtrip() {
        let mut engine = populated(16, 4);
        assert!(matches!(engine.remove(9), Err(EngineError::NotFound(_))));
        engine.remove(2).unwrap();
        assert_eq!(engine.len(), 2);
        assert!(engine.signature(2).is_none());
        assert!(engine.verify_exact(1, 2).is_err());
        // Re-inserting under the removed id succeeds.
        engine.insert(2, DOC2).unwrap();
        assert_eq!(engine.verify_exact(1, 2).unwrap(), 0.75);
    }

    #[test]
    fn test_query_id_unknown() {
        let engine = populated(16, 4);
        assert!(matches!(
            engine.query_id(9, 0.5),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_verify_exact_requires_retained_tokens() {
        let config = EngineConfig {
            retain_tokens: false,
            ..word_config(16, 4)
        };
        let mut engine = Engine::new(config).unwrap();
        engine.insert(1, DOC1).unwrap();
        engine.insert(2, DOC2).unwrap();
        assert!(matches!(
            engine.verify_exact(1, 2),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_insert_batch_parallel_matches_serial() {
        let docs: Vec<(DocId, String)> = (0..200)
            .map(|i| (i, format!("document number {i} about topic {}", i % 7)))
            .collect();
        let mut serial = Engine::new(word_config(16, 4)).unwrap();
        serial.insert_batch(docs.iter().map(|(i, d)| (*i, d))).unwrap();
        let mut parallel = Engine::new(word_config(16, 4)).unwrap();
        let n = parallel
            .insert_batch_parallel(&docs, &CancelFlag::new())
            .unwrap();
        assert_eq!(n, 200);
        for (id, _) in &docs {
            assert_eq!(serial.signature(*id), parallel.signature(*id));
        }
    }

    #[test]
    fn test_cancelled_batch_inserts_nothing() {
        let docs: Vec<(DocId, String)> = (0..50).map(|i| (i, format!("doc {i}"))).collect();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut engine = Engine::new(word_config(16, 4)).unwrap();
        let n = engine.insert_batch_parallel(&docs, &cancel).unwrap();
        assert_eq!(n, 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_batch_insert_failure_keeps_prior_documents() {
        let mut engine = Engine::new(word_config(16, 4)).unwrap();
        let docs = vec![(1u64, "alpha beta"), (2, "gamma delta"), (2, "epsilon")];
        let err = engine.insert_batch(docs).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(_)));
        assert_eq!(engine.len(), 2);
    }
}
