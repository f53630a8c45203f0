/// Exact cosine vector index over faculty embeddings
use super::{EmbeddingError, EmbeddingProvider};
use crate::error::FinderError;
use crate::storage::{FacultyStore, SnapshotData, SnapshotError, SnapshotStore};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index has not been built or loaded")]
    NotBuilt,

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Index lock poisoned")]
    LockPoisoned,

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Search hit with faculty id and cosine similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    /// Cosine similarity in [-1.0, 1.0], higher is more similar
    pub score: f32,
}

/// Lifecycle of the in-memory index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unbuilt,
    /// A rebuild is running; searches still see the previous snapshot, if any
    Building,
    Ready,
}

/// Result of a `build` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { records: usize, duration_ms: u64 },
    /// The store had no rows with embedding text; nothing was replaced
    EmptyCorpus,
}

/// Point-in-time description of the index
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub state: IndexState,
    pub records: usize,
    pub dimension: usize,
    pub model: String,
}

/// Immutable embedding set: `vectors[i]` belongs to `ids[i]`
#[derive(Debug)]
pub struct IndexSnapshot {
    ids: Vec<i64>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    dimension: usize,
    model: String,
}

impl IndexSnapshot {
    pub fn new(
        model: impl Into<String>,
        dimension: usize,
        ids: Vec<i64>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, VectorIndexError> {
        if ids.len() != vectors.len() {
            return Err(VectorIndexError::InvalidSnapshot(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorIndexError::InvalidSnapshot(format!(
                "vector of {} dimensions in a {}-dimension index",
                bad.len(),
                dimension
            )));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(VectorIndexError::InvalidSnapshot(format!(
                "duplicate id {}",
                dup
            )));
        }

        let norms = vectors.iter().map(|v| norm(v)).collect();

        Ok(Self {
            ids,
            vectors,
            norms,
            dimension,
            model: model.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Rank every entry against `query` and keep the `top_k` best
    ///
    /// Selection runs on raw scores first; `threshold` only filters the
    /// selected entries, so fewer than `top_k` hits can come back. Ties are
    /// ordered by ascending id.
    pub fn top_k(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<SearchHit> {
        if top_k == 0 || self.is_empty() {
            return Vec::new();
        }

        let query_norm = norm(query);
        let mut scored: Vec<SearchHit> = self
            .ids
            .iter()
            .zip(self.vectors.iter().zip(self.norms.iter()))
            .map(|(&id, (vector, &vector_norm))| SearchHit {
                id,
                score: cosine(query, query_norm, vector, vector_norm),
            })
            .collect();

        if top_k < scored.len() {
            scored.select_nth_unstable_by(top_k - 1, rank_order);
            scored.truncate(top_k);
        }
        scored.sort_unstable_by(rank_order);
        scored.retain(|hit| hit.score >= threshold);

        scored
    }
}

/// Descending score, then ascending id
fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `dot(a, b) / (|a| * |b|)`; zero when either side has no magnitude
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (a_norm * b_norm)).clamp(-1.0, 1.0)
}

struct IndexInner {
    state: IndexState,
    snapshot: Option<Arc<IndexSnapshot>>,
}

/// Faculty vector index
///
/// Holds at most one snapshot. `build` and `load` swap it wholesale under the
/// write lock; `search` clones the current `Arc` and scores outside the lock.
/// Builds (and the snapshot writes they do) are serialized by `build_lock`.
pub struct VectorIndex {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn FacultyStore>,
    snapshots: SnapshotStore,
    inner: RwLock<IndexInner>,
    build_lock: Mutex<()>,
}

impl VectorIndex {
    /// Create an unbuilt index; call `load` or `build` to populate it
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn FacultyStore>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            provider,
            store,
            snapshots,
            inner: RwLock::new(IndexInner {
                state: IndexState::Unbuilt,
                snapshot: None,
            }),
            build_lock: Mutex::new(()),
        }
    }

    fn current(&self) -> Result<Option<Arc<IndexSnapshot>>, VectorIndexError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| VectorIndexError::LockPoisoned)?;
        Ok(inner.snapshot.clone())
    }

    fn set_state(&self, state: IndexState) -> Result<(), VectorIndexError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| VectorIndexError::LockPoisoned)?;
        inner.state = state;
        Ok(())
    }

    fn install(&self, snapshot: Arc<IndexSnapshot>) -> Result<(), VectorIndexError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| VectorIndexError::LockPoisoned)?;
        inner.snapshot = Some(snapshot);
        inner.state = IndexState::Ready;
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> IndexState {
        self.inner
            .read()
            .map(|inner| inner.state)
            .unwrap_or(IndexState::Unbuilt)
    }

    /// The snapshot searches currently run against
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current().ok().flatten()
    }

    /// Whether a snapshot is available for searching
    pub fn is_ready(&self) -> bool {
        matches!(self.current(), Ok(Some(_)))
    }

    /// Number of indexed faculty
    pub fn len(&self) -> usize {
        match self.current() {
            Ok(Some(snapshot)) => snapshot.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            state: self.state(),
            records: self.len(),
            dimension: self.provider.dimension(),
            model: self.provider.model_name().to_string(),
        }
    }

    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Rebuild from the store, persist, then swap the new snapshot in
    ///
    /// Store and model errors propagate and leave the previous snapshot in
    /// place, both in memory and on disk.
    pub fn build(&self) -> Result<BuildOutcome, FinderError> {
        let _guard = self
            .build_lock
            .lock()
            .map_err(|_| VectorIndexError::LockPoisoned)?;
        self.build_locked()
    }

    fn build_locked(&self) -> Result<BuildOutcome, FinderError> {
        let previous = self.state();
        self.set_state(IndexState::Building)?;

        let result = self.rebuild();

        let restore = match &result {
            Ok(BuildOutcome::Built { .. }) => None,
            _ => Some(previous),
        };
        if let Some(state) = restore {
            self.set_state(state)?;
        }

        result
    }

    fn rebuild(&self) -> Result<BuildOutcome, FinderError> {
        let start = Instant::now();

        let rows = self.store.fetch_indexable()?;
        if rows.is_empty() {
            tracing::warn!("No faculty with embedding text; index left unchanged");
            return Ok(BuildOutcome::EmptyCorpus);
        }

        tracing::info!("Generating embeddings for {} faculty records", rows.len());

        let (ids, texts): (Vec<i64>, Vec<String>) =
            rows.into_iter().map(|row| (row.id, row.text)).unzip();

        let vectors = self.provider.embed_batch(&texts)?;
        let snapshot = IndexSnapshot::new(
            self.provider.model_name(),
            self.provider.dimension(),
            ids,
            vectors,
        )?;

        self.persist(&snapshot)?;

        let records = snapshot.len();
        self.install(Arc::new(snapshot))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Index built and saved: {} records in {}ms",
            records,
            duration_ms
        );

        Ok(BuildOutcome::Built {
            records,
            duration_ms,
        })
    }

    fn persist(&self, snapshot: &IndexSnapshot) -> Result<(), VectorIndexError> {
        let data = SnapshotData {
            model: snapshot.model.clone(),
            dimension: snapshot.dimension,
            ids: snapshot.ids.clone(),
            vectors: snapshot.vectors.clone(),
        };
        self.snapshots.write(&data)?;
        Ok(())
    }

    /// Persist the in-memory snapshot
    pub fn save(&self) -> Result<(), VectorIndexError> {
        let _guard = self
            .build_lock
            .lock()
            .map_err(|_| VectorIndexError::LockPoisoned)?;
        let snapshot = self.current()?.ok_or(VectorIndexError::NotBuilt)?;
        self.persist(&snapshot)
    }

    /// Load the persisted snapshot
    ///
    /// Returns `false` and leaves the index untouched when the snapshot is
    /// missing, unreadable, or was embedded with a different model. Blocks
    /// while a build is running.
    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(records) => {
                tracing::info!("Index loaded: {} records", records);
                true
            }
            Err(VectorIndexError::Snapshot(SnapshotError::Missing(path))) => {
                tracing::info!("No persisted index at {}", path.display());
                false
            }
            Err(e) => {
                tracing::warn!("Persisted index rejected: {}", e);
                false
            }
        }
    }

    fn try_load(&self) -> Result<usize, VectorIndexError> {
        // Waits out a running build so an older snapshot never replaces its result
        let _guard = self
            .build_lock
            .lock()
            .map_err(|_| VectorIndexError::LockPoisoned)?;

        let data = self.snapshots.read()?;

        if data.model != self.provider.model_name() || data.dimension != self.provider.dimension()
        {
            return Err(VectorIndexError::InvalidSnapshot(format!(
                "embedded with {} ({}D), current model is {} ({}D)",
                data.model,
                data.dimension,
                self.provider.model_name(),
                self.provider.dimension()
            )));
        }

        let snapshot = IndexSnapshot::new(data.model, data.dimension, data.ids, data.vectors)?;
        let records = snapshot.len();
        self.install(Arc::new(snapshot))?;
        Ok(records)
    }

    /// Return the snapshot, building once if none is present
    ///
    /// Callers that queue behind a running build pick up its result instead
    /// of building again.
    fn ensure_snapshot(&self) -> Result<Option<Arc<IndexSnapshot>>, FinderError> {
        if let Some(snapshot) = self.current()? {
            return Ok(Some(snapshot));
        }

        let _guard = self
            .build_lock
            .lock()
            .map_err(|_| VectorIndexError::LockPoisoned)?;

        if let Some(snapshot) = self.current()? {
            return Ok(Some(snapshot));
        }

        tracing::info!("Index not loaded, building now");
        self.build_locked()?;
        Ok(self.current()?)
    }

    /// Find the `top_k` faculty most similar to `query`, dropping scores below `threshold`
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, FinderError> {
        let Some(snapshot) = self.ensure_snapshot()? else {
            return Ok(Vec::new());
        };

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query)?;
        if query_vector.len() != snapshot.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: snapshot.dimension(),
                actual: query_vector.len(),
            }
            .into());
        }

        let hits = snapshot.top_k(&query_vector, top_k, threshold);
        tracing::debug!(
            "Query matched {} of {} faculty (top_k={}, threshold={})",
            hits.len(),
            snapshot.len(),
            top_k,
            threshold
        );

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FacultyDetail, IndexableText};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Maps known words onto fixed axes
    struct AxisProvider;

    impl EmbeddingProvider for AxisProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; 4];
            for word in text.split_whitespace() {
                match word {
                    "energy" => v[0] += 1.0,
                    "robots" => v[1] += 1.0,
                    "language" => v[2] += 1.0,
                    _ => v[3] += 0.1,
                }
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "axis-test"
        }
    }

    struct FixedStore(Vec<IndexableText>);

    impl FacultyStore for FixedStore {
        fn fetch_indexable(&self) -> crate::error::Result<Vec<IndexableText>> {
            Ok(self.0.clone())
        }

        fn fetch_details(&self, _ids: &[i64]) -> crate::error::Result<Vec<FacultyDetail>> {
            Ok(Vec::new())
        }
    }

    fn rows(texts: &[(i64, &str)]) -> Vec<IndexableText> {
        texts
            .iter()
            .map(|(id, text)| IndexableText {
                id: *id,
                text: text.to_string(),
            })
            .collect()
    }

    fn index_with(texts: &[(i64, &str)], dir: &TempDir) -> VectorIndex {
        VectorIndex::new(
            Arc::new(AxisProvider),
            Arc::new(FixedStore(rows(texts))),
            SnapshotStore::new(dir.path().join("index")),
        )
    }

    #[test]
    fn test_snapshot_rejects_mismatched_lengths() {
        let result = IndexSnapshot::new("m", 2, vec![1, 2], vec![vec![1.0, 0.0]]);
        assert!(matches!(result, Err(VectorIndexError::InvalidSnapshot(_))));

        let result = IndexSnapshot::new("m", 2, vec![1], vec![vec![1.0, 0.0, 0.0]]);
        assert!(matches!(result, Err(VectorIndexError::InvalidSnapshot(_))));

        let result = IndexSnapshot::new("m", 1, vec![3, 3], vec![vec![1.0], vec![2.0]]);
        assert!(matches!(result, Err(VectorIndexError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_cosine_bounds() {
        let a = [1.0, 0.0];
        let b = [-2.0, 0.0];
        assert_eq!(cosine(&a, norm(&a), &a, norm(&a)), 1.0);
        assert_eq!(cosine(&a, norm(&a), &b, norm(&b)), -1.0);
        assert_eq!(cosine(&a, norm(&a), &[0.0, 0.0], 0.0), 0.0);
    }

    #[test]
    fn test_top_k_selection_and_order() {
        let snapshot = IndexSnapshot::new(
            "m",
            2,
            vec![1, 2, 3, 4, 5],
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 1.0],
                vec![-1.0, 0.0],
                vec![2.0, 0.1],
            ],
        )
        .unwrap();

        let hits = snapshot.top_k(&[1.0, 0.0], 3, -1.0);
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 5, 3]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        // Everything, worst last
        let hits = snapshot.top_k(&[1.0, 0.0], 10, -1.0);
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[4].id, 4);
    }

    #[test]
    fn test_threshold_applies_after_selection() {
        let snapshot = IndexSnapshot::new(
            "m",
            2,
            vec![1, 2, 3],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
        )
        .unwrap();

        let hits = snapshot.top_k(&[1.0, 0.0], 2, 0.5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        // Exactly-at-threshold survives
        let hits = snapshot.top_k(&[1.0, 0.0], 3, 0.0);
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_ties_ordered_by_id() {
        let snapshot = IndexSnapshot::new(
            "m",
            2,
            vec![9, 4, 7, 1],
            vec![
                vec![1.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
            ],
        )
        .unwrap();

        let hits = snapshot.top_k(&[1.0, 0.0], 2, 0.0);
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_build_and_search() {
        let temp = TempDir::new().unwrap();
        let index = index_with(
            &[
                (1, "energy energy grids"),
                (2, "robots"),
                (3, "language models and energy"),
            ],
            &temp,
        );
        assert_eq!(index.state(), IndexState::Unbuilt);

        let outcome = index.build().unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { records: 3, .. }));
        assert_eq!(index.state(), IndexState::Ready);
        assert_eq!(index.len(), 3);

        let hits = index.search("energy", 2, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 3);
    }

    #[test]
    fn test_empty_corpus_stays_unbuilt() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&[], &temp);

        assert_eq!(index.build().unwrap(), BuildOutcome::EmptyCorpus);
        assert_eq!(index.state(), IndexState::Unbuilt);
        assert!(!index.snapshot_store().exists());

        assert!(index.search("energy", 5, 0.0).unwrap().is_empty());
        assert!(matches!(index.save(), Err(VectorIndexError::NotBuilt)));
    }

    #[test]
    fn test_search_builds_lazily() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&[(1, "robots"), (2, "energy")], &temp);

        let hits = index.search("robots", 1, 0.5).unwrap();
        assert_eq!(hits, vec![SearchHit { id: 1, score: 1.0 }]);
        assert!(index.snapshot_store().exists());
    }

    #[test]
    fn test_load_rejects_other_model() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("index"));
        store
            .write(&SnapshotData {
                model: "some-other-model".to_string(),
                dimension: 4,
                ids: vec![1],
                vectors: vec![vec![1.0, 0.0, 0.0, 0.0]],
            })
            .unwrap();

        let index = index_with(&[(1, "robots")], &temp);
        assert!(!index.load());
        assert_eq!(index.state(), IndexState::Unbuilt);
    }

    /// Fails every batch, but only once the test opens the gate
    struct GatedProvider {
        entered: Mutex<mpsc::Sender<()>>,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl EmbeddingProvider for GatedProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            AxisProvider.embed(text)
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.gate.lock().unwrap().recv();
            Err(EmbeddingError::GenerationError("model crashed".to_string()))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "axis-test"
        }
    }

    #[test]
    fn test_load_waits_for_running_build() {
        let temp = TempDir::new().unwrap();
        SnapshotStore::new(temp.path().join("index"))
            .write(&SnapshotData {
                model: "axis-test".to_string(),
                dimension: 4,
                ids: vec![1],
                vectors: vec![vec![0.0, 1.0, 0.0, 0.0]],
            })
            .unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let index = Arc::new(VectorIndex::new(
            Arc::new(GatedProvider {
                entered: Mutex::new(entered_tx),
                gate: Mutex::new(gate_rx),
            }),
            Arc::new(FixedStore(rows(&[(1, "robots"), (2, "energy")]))),
            SnapshotStore::new(temp.path().join("index")),
        ));

        let builder = {
            let index = index.clone();
            thread::spawn(move || index.build())
        };
        entered_rx.recv().unwrap();
        assert_eq!(index.state(), IndexState::Building);

        let loader = {
            let index = index.clone();
            thread::spawn(move || index.load())
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!loader.is_finished());

        gate_tx.send(()).unwrap();
        assert!(builder.join().unwrap().is_err());
        assert!(loader.join().unwrap());

        // The failed build restored its state before the load installed the snapshot
        assert_eq!(index.state(), IndexState::Ready);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_zero_top_k() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&[(1, "robots")], &temp);
        index.build().unwrap();
        assert!(index.search("robots", 0, -1.0).unwrap().is_empty());
    }
}
