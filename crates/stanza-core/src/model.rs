//! Items, vibe profiles, and similarity results shared across the engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a poem or quote in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id, used when ingesting items without one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identifier of a vibe profile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A recommendable poem or quote with its precomputed embedding.
/// Items are immutable once ingested; the engine only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub author: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Lifecycle state of a profile. There is no way back to `Empty` once active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Empty,
    Active,
}

/// A named aggregate of seed items, used as a query vector for recommendations.
///
/// Seeds are held by id only; embeddings are always re-fetched from the store.
/// `aggregate_vector` is the centroid of the current seeds' embeddings, or `None`
/// while there are no seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibeProfile {
    pub id: ProfileId,
    pub name: String,
    pub seed_item_ids: Vec<ItemId>,
    pub aggregate_vector: Option<Vec<f32>>,
    /// Bumped on every write; used for compare-and-swap updates.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VibeProfile {
    /// A new profile with no seeds yet.
    pub fn empty(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProfileId::generate(),
            name: name.into(),
            seed_item_ids: Vec::new(),
            aggregate_vector: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of seed items.
    pub fn size(&self) -> usize {
        self.seed_item_ids.len()
    }

    pub fn state(&self) -> ProfileState {
        if self.aggregate_vector.is_some() {
            ProfileState::Active
        } else {
            ProfileState::Empty
        }
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.seed_item_ids.contains(item_id)
    }

    /// Same seed set, ignoring order.
    pub fn has_seed_set(&self, ids: &[ItemId]) -> bool {
        let mut mine: Vec<&ItemId> = self.seed_item_ids.iter().collect();
        let mut theirs: Vec<&ItemId> = ids.iter().collect();
        mine.sort();
        mine.dedup();
        theirs.sort();
        theirs.dedup();
        mine == theirs
    }
}

/// One hit from the store's nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: ItemId,
    pub similarity: f32,
}

/// A ranked recommendation. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub item: Item,
    /// Cosine similarity in [-1, 1]; higher is more similar.
    pub similarity: f32,
}

/// Removes repeated ids, keeping the first occurrence of each.
pub fn dedup_preserving_order(ids: &[ItemId]) -> Vec<ItemId> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}
