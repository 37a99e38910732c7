//! Item and profile storage. [ItemStore] is the seam the engine talks to; [MemoryStore]
//! is an in-process implementation with brute-force cosine search.
//!
//! Persist a [MemoryStore] between runs with [crate::library].
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregate::cosine_similarity;
use crate::model::{Item, ItemId, Neighbor, ProfileId, VibeProfile};

/// Result of a compare-and-swap profile write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The stored version differs from the expected one; re-read and retry.
    Conflict,
    Missing,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError>;

    /// Fetch several items. Unknown ids are left out; order follows `ids`.
    async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get_item(id).await? {
                out.push(item);
            }
        }
        Ok(out)
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError>;

    async fn item_count(&self) -> Result<usize, StoreError>;

    /// Embedding dimension shared by every stored item; `None` while the store is empty.
    async fn dimension(&self) -> Result<Option<usize>, StoreError>;

    /// Up to `limit` items by descending cosine similarity to `vector`, ties by ascending id.
    /// Items below `min_similarity` are left out.
    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Neighbor>, StoreError>;

    async fn get_profile(&self, id: &ProfileId) -> Result<Option<VibeProfile>, StoreError>;

    async fn list_profiles(&self) -> Result<Vec<VibeProfile>, StoreError>;

    /// Store a new profile. Fails if the id is taken.
    async fn insert_profile(&self, profile: VibeProfile) -> Result<(), StoreError>;

    /// Overwrite a profile only if its stored version equals `expected_version`.
    /// On success the stored version is `expected_version + 1`.
    async fn replace_profile(
        &self,
        profile: VibeProfile,
        expected_version: u64,
    ) -> Result<WriteOutcome, StoreError>;

    /// Returns whether a profile was removed.
    async fn delete_profile(&self, id: &ProfileId) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<ItemId, Item>,
    profiles: HashMap<ProfileId, VibeProfile>,
    dimension: Option<usize>,
}

/// In-memory store. Holds items and profiles; supports linear-scan similarity search.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every item and profile, items ordered by id.
    pub async fn contents(&self) -> (Vec<Item>, Vec<VibeProfile>) {
        let inner = self.inner.read().await;
        let items = inner.items.values().cloned().collect();
        let mut profiles: Vec<VibeProfile> = inner.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        (items, profiles)
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.inner.read().await.items.get(id).map(|i| i.clone()))
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.items.contains_key(&item.id) {
            return Err(StoreError::DuplicateItem(item.id));
        }
        let actual = item.embedding.len();
        if actual == 0 {
            return Err(StoreError::DimensionMismatch {
                expected: inner.dimension.unwrap_or(0),
                actual,
            });
        }
        match inner.dimension {
            Some(expected) if expected != actual => {
                return Err(StoreError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => inner.dimension = Some(actual),
        }
        inner.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn item_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.items.len())
    }

    /// Fixed by the first inserted item.
    async fn dimension(&self) -> Result<Option<usize>, StoreError> {
        Ok(self.inner.read().await.dimension)
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let inner = self.inner.read().await;
        if inner.items.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dimension {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        let floor = min_similarity.unwrap_or(f32::NEG_INFINITY);
        // BTreeMap iteration is id-ascending, so the stable sort keeps ties in id order.
        let mut scored: Vec<Neighbor> = inner
            .items
            .iter()
            .map(|(id, item)| Neighbor {
                id: id.clone(),
                similarity: cosine_similarity(vector, &item.embedding),
            })
            .filter(|n| n.similarity >= floor)
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_profile(&self, id: &ProfileId) -> Result<Option<VibeProfile>, StoreError> {
        Ok(self.inner.read().await.profiles.get(id).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<VibeProfile>, StoreError> {
        Ok(self.inner.read().await.profiles.values().cloned().collect())
    }

    async fn insert_profile(&self, profile: VibeProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.profiles.contains_key(&profile.id) {
            return Err(StoreError::DuplicateProfile(profile.id));
        }
        inner.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn replace_profile(
        &self,
        mut profile: VibeProfile,
        expected_version: u64,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(current) = inner.profiles.get_mut(&profile.id) else {
            return Ok(WriteOutcome::Missing);
        };
        if current.version != expected_version {
            return Ok(WriteOutcome::Conflict);
        }
        profile.version = expected_version + 1;
        *current = profile;
        Ok(WriteOutcome::Written)
    }

    async fn delete_profile(&self, id: &ProfileId) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.profiles.remove(id).is_some())
    }
}

/// Runs a store call under a deadline.
pub(crate) async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding has {actual} dimensions, corpus uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("item already exists: {0}")]
    DuplicateItem(ItemId),
    #[error("profile already exists: {0}")]
    DuplicateProfile(ProfileId),
}

impl StoreError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}
