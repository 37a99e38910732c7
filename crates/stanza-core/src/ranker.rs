//! Nearest-neighbor recommendations for an item, a profile, or free text.
//!
//! Results are ordered by descending cosine similarity, ties by ascending item id.
//! Excluded ids (the query item, a profile's seeds, caller exclusions) are over-fetched
//! for, so removing them still leaves `limit` results when the corpus has enough.
//! Store failures are returned as-is; nothing here retries.

use std::collections::HashSet;
use std::sync::Arc;

use crate::aggregate::AggregateError;
use crate::config::EngineOptions;
use crate::embedding::{self, EmbeddingProvider, ProviderError};
use crate::model::{ItemId, Neighbor, ProfileId, SimilarityResult};
use crate::store::{self, ItemStore, StoreError};

/// Extra knobs for the `*_with` queries.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Ids to leave out in addition to the query's own (e.g. already shown).
    pub exclude: HashSet<ItemId>,
    /// Drop results below this similarity.
    pub min_similarity: Option<f32>,
}

pub struct SimilarityRanker {
    store: Arc<dyn ItemStore>,
    provider: Arc<dyn EmbeddingProvider>,
    options: EngineOptions,
}

impl SimilarityRanker {
    pub fn new(
        store: Arc<dyn ItemStore>,
        provider: Arc<dyn EmbeddingProvider>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    pub async fn find_similar_to_item(
        &self,
        item_id: &ItemId,
        limit: usize,
        exclude_self: bool,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        self.find_similar_to_item_with(item_id, limit, exclude_self, &SearchOptions::default())
            .await
    }

    pub async fn find_similar_to_item_with(
        &self,
        item_id: &ItemId,
        limit: usize,
        exclude_self: bool,
        search: &SearchOptions,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        check_limit(limit)?;
        let item = store::within(self.options.timeout, self.store.get_item(item_id))
            .await?
            .ok_or_else(|| RankError::ItemNotFound(item_id.clone()))?;
        let mut excluded = search.exclude.clone();
        if exclude_self {
            excluded.insert(item.id.clone());
        }
        self.rank(&item.embedding, limit, &excluded, search.min_similarity)
            .await
    }

    pub async fn find_similar_to_profile(
        &self,
        profile_id: &ProfileId,
        limit: usize,
        exclude_seeds: bool,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        self.find_similar_to_profile_with(
            profile_id,
            limit,
            exclude_seeds,
            &SearchOptions::default(),
        )
        .await
    }

    pub async fn find_similar_to_profile_with(
        &self,
        profile_id: &ProfileId,
        limit: usize,
        exclude_seeds: bool,
        search: &SearchOptions,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        check_limit(limit)?;
        let profile = store::within(self.options.timeout, self.store.get_profile(profile_id))
            .await?
            .ok_or_else(|| RankError::ProfileNotFound(profile_id.clone()))?;
        let vector = profile
            .aggregate_vector
            .as_deref()
            .ok_or_else(|| RankError::EmptyProfile(profile_id.clone()))?;
        let mut excluded = search.exclude.clone();
        if exclude_seeds {
            excluded.extend(profile.seed_item_ids.iter().cloned());
        }
        self.rank(vector, limit, &excluded, search.min_similarity)
            .await
    }

    /// Embeds `text` and ranks the corpus against it.
    pub async fn find_similar_to_text(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        self.find_similar_to_text_with(text, limit, &SearchOptions::default())
            .await
    }

    pub async fn find_similar_to_text_with(
        &self,
        text: &str,
        limit: usize,
        search: &SearchOptions,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        check_limit(limit)?;
        let vector = embedding::within(self.options.timeout, self.provider.embed(text)).await?;
        self.rank(&vector, limit, &search.exclude, search.min_similarity)
            .await
    }

    async fn rank(
        &self,
        vector: &[f32],
        limit: usize,
        excluded: &HashSet<ItemId>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SimilarityResult>, RankError> {
        if vector.is_empty() {
            return Err(AggregateError::EmptyInput.into());
        }
        let fetch = limit.saturating_add(excluded.len());
        tracing::debug!(limit, fetch, excluded = excluded.len(), "nearest-neighbor query");
        let neighbors = store::within(
            self.options.timeout,
            self.store.nearest_neighbors(vector, fetch, min_similarity),
        )
        .await?;
        let top = select(neighbors, excluded, limit);

        let ids: Vec<ItemId> = top.iter().map(|n| n.id.clone()).collect();
        let mut items = store::within(self.options.timeout, self.store.get_items(&ids)).await?;
        let mut results = Vec::with_capacity(top.len());
        for n in top {
            match items.iter().position(|i| i.id == n.id) {
                Some(pos) => results.push(SimilarityResult {
                    item: items.swap_remove(pos),
                    similarity: n.similarity,
                }),
                None => tracing::warn!(item = %n.id, "neighbor vanished before fetch"),
            }
        }
        Ok(results)
    }
}

/// Drops excluded ids, orders by descending similarity then ascending id, keeps `limit`.
pub fn select(
    mut neighbors: Vec<Neighbor>,
    excluded: &HashSet<ItemId>,
    limit: usize,
) -> Vec<Neighbor> {
    neighbors.retain(|n| !excluded.contains(&n.id));
    for n in &mut neighbors {
        if !n.similarity.is_finite() {
            n.similarity = 0.0;
        }
    }
    neighbors.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
    neighbors.truncate(limit);
    neighbors
}

fn check_limit(limit: usize) -> Result<(), RankError> {
    if limit == 0 {
        return Err(RankError::InvalidLimit(limit));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error("profile {0} has no seeds to search with")]
    EmptyProfile(ProfileId),
    #[error("limit must be at least 1, got {0}")]
    InvalidLimit(usize),
    #[error("invalid query vector: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("store rejected the request: {0}")]
    Store(StoreError),
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),
}

impl From<StoreError> for RankError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            RankError::StoreUnavailable(err)
        } else {
            RankError::Store(err)
        }
    }
}
