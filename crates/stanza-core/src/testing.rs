//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::embedding::{EmbeddingProvider, ProviderError};
use crate::model::{Item, ItemId, Neighbor, ProfileId, VibeProfile};
use crate::store::{ItemStore, MemoryStore, StoreError, WriteOutcome};

pub fn item(id: &str, embedding: &[f32]) -> Item {
    Item {
        id: ItemId::from(id),
        title: format!("Poem {id}"),
        author: "Anon".to_string(),
        text: format!("text of {id}"),
        embedding: embedding.to_vec(),
        tags: Vec::new(),
    }
}

pub async fn corpus(items: &[(&str, &[f32])]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (id, v) in items {
        store
            .insert_item(item(id, v))
            .await
            .expect("fixture items are unique");
    }
    Arc::new(store)
}

/// The A/B/C corpus: A on one axis, B on the other, C on the diagonal.
pub async fn abc() -> Arc<MemoryStore> {
    corpus(&[("A", &[1.0, 0.0]), ("B", &[0.0, 1.0]), ("C", &[0.7, 0.7])]).await
}

/// Deterministic provider: the same text always maps to the same vector.
#[derive(Clone)]
pub struct FakeProvider {
    dim: usize,
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dim] += f32::from(b) / 255.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.is_empty() {
            return Err(ProviderError::EmptyEmbedding);
        }
        Ok(self.vector_for(text))
    }
}

/// Store whose every call fails, for error-propagation tests.
pub struct DownStore;

#[async_trait]
impl ItemStore for DownStore {
    async fn get_item(&self, _: &ItemId) -> Result<Option<Item>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn insert_item(&self, _: Item) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn item_count(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn dimension(&self) -> Result<Option<usize>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn nearest_neighbors(
        &self,
        _: &[f32],
        _: usize,
        _: Option<f32>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get_profile(
        &self,
        _: &ProfileId,
    ) -> Result<Option<VibeProfile>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list_profiles(&self) -> Result<Vec<VibeProfile>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn insert_profile(&self, _: VibeProfile) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn replace_profile(
        &self,
        _: VibeProfile,
        _: u64,
    ) -> Result<WriteOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete_profile(&self, _: &ProfileId) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Wraps a [MemoryStore] to force lost compare-and-swap races.
///
/// The first `gated_reads` profile reads wait for each other after reading, so every one of
/// those readers holds the same stale version. `forced` conflicts are returned before any
/// real write is attempted. Every conflict handed back is counted.
pub struct ContendedStore {
    inner: Arc<MemoryStore>,
    gate: AtomicUsize,
    readers: Barrier,
    forced: AtomicUsize,
    conflicts: AtomicUsize,
}

impl ContendedStore {
    pub fn new(inner: Arc<MemoryStore>, gated_reads: usize) -> Self {
        Self {
            inner,
            gate: AtomicUsize::new(gated_reads),
            readers: Barrier::new(gated_reads),
            forced: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    pub fn with_forced_conflicts(self, n: usize) -> Self {
        self.forced.store(n, Ordering::SeqCst);
        self
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ItemStore for ContendedStore {
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        self.inner.get_item(id).await
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        self.inner.insert_item(item).await
    }

    async fn item_count(&self) -> Result<usize, StoreError> {
        self.inner.item_count().await
    }

    async fn dimension(&self) -> Result<Option<usize>, StoreError> {
        self.inner.dimension().await
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        self.inner.nearest_neighbors(vector, limit, min_similarity).await
    }

    async fn get_profile(&self, id: &ProfileId) -> Result<Option<VibeProfile>, StoreError> {
        let profile = self.inner.get_profile(id).await?;
        if take_one(&self.gate) {
            self.readers.wait().await;
        }
        Ok(profile)
    }

    async fn list_profiles(&self) -> Result<Vec<VibeProfile>, StoreError> {
        self.inner.list_profiles().await
    }

    async fn insert_profile(&self, profile: VibeProfile) -> Result<(), StoreError> {
        self.inner.insert_profile(profile).await
    }

    async fn replace_profile(
        &self,
        profile: VibeProfile,
        expected_version: u64,
    ) -> Result<WriteOutcome, StoreError> {
        let outcome = if take_one(&self.forced) {
            WriteOutcome::Conflict
        } else {
            self.inner.replace_profile(profile, expected_version).await?
        };
        if outcome == WriteOutcome::Conflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn delete_profile(&self, id: &ProfileId) -> Result<bool, StoreError> {
        self.inner.delete_profile(id).await
    }
}
