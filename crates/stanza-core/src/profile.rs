//! Vibe profile lifecycle: create, add seeds, rename, delete, and maintenance.
//!
//! A profile's `aggregate_vector` is always the centroid of its current seeds'
//! embeddings. Every mutation re-fetches all seed embeddings from the store and
//! recomputes the centroid from scratch, then writes it back with a
//! compare-and-swap on the profile's version. A lost race re-reads and retries.
//!
//! Seed removal is not supported: profiles only ever grow.

use std::sync::Arc;

use chrono::Utc;

use crate::aggregate::{aggregate, AggregateError};
use crate::config::{EngineOptions, SeedPolicy};
use crate::model::{dedup_preserving_order, Item, ItemId, ProfileId, ProfileState, VibeProfile};
use crate::store::{self, ItemStore, StoreError, WriteOutcome};

/// A freshly created profile and the seed ids that could not be resolved.
#[derive(Debug, Clone)]
pub struct ProfileCreation {
    pub profile: VibeProfile,
    pub skipped: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub total_profiles: usize,
    /// Sum of every profile's seed count.
    pub total_seeds: usize,
    pub active: usize,
    pub empty: usize,
}

pub struct ProfileManager {
    store: Arc<dyn ItemStore>,
    options: EngineOptions,
}

impl ProfileManager {
    pub fn new(store: Arc<dyn ItemStore>, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Creates a profile from `seed_item_ids` (duplicates collapsed, first occurrence kept).
    ///
    /// Under [SeedPolicy::Lenient] unknown ids are skipped and reported; under
    /// [SeedPolicy::Strict] the first unknown id fails the call. With no resolvable
    /// seeds the profile is created empty only if `allow_empty` is set.
    pub async fn create_profile(
        &self,
        name: &str,
        seed_item_ids: &[ItemId],
        allow_empty: bool,
    ) -> Result<ProfileCreation, ProfileError> {
        let requested = dedup_preserving_order(seed_item_ids);
        let mut seeds = Vec::with_capacity(requested.len());
        let mut embeddings = Vec::with_capacity(requested.len());
        let mut skipped = Vec::new();
        for id in requested {
            match self.item(&id).await? {
                Some(item) => {
                    seeds.push(id);
                    embeddings.push(item.embedding);
                }
                None if self.options.seed_policy == SeedPolicy::Strict => {
                    return Err(ProfileError::ItemNotFound(id));
                }
                None => {
                    tracing::warn!(item = %id, "skipping unknown seed");
                    skipped.push(id);
                }
            }
        }
        if seeds.is_empty() && !allow_empty {
            return Err(ProfileError::NoValidSeeds { skipped });
        }

        let mut profile = VibeProfile::empty(self.unique_name(name).await?);
        profile.aggregate_vector = if embeddings.is_empty() {
            None
        } else {
            Some(aggregate(&embeddings)?)
        };
        profile.seed_item_ids = seeds;
        store::within(self.options.timeout, self.store.insert_profile(profile.clone())).await?;
        tracing::info!(
            profile = %profile.id,
            name = %profile.name,
            seeds = profile.size(),
            skipped = skipped.len(),
            "created profile"
        );
        Ok(ProfileCreation { profile, skipped })
    }

    /// Creates with the configured empty-profile permission.
    pub async fn create(
        &self,
        name: &str,
        seed_item_ids: &[ItemId],
    ) -> Result<ProfileCreation, ProfileError> {
        self.create_profile(name, seed_item_ids, self.options.allow_empty_profiles)
            .await
    }

    /// Appends `item_id` to the profile's seeds and recomputes its aggregate.
    /// Adding a seed that is already present returns the profile unchanged.
    pub async fn add_seed(
        &self,
        profile_id: &ProfileId,
        item_id: &ItemId,
    ) -> Result<VibeProfile, ProfileError> {
        let mut item_checked = false;
        for attempt in 1..=self.options.max_update_attempts {
            let current = self.require(profile_id).await?;
            if current.contains(item_id) {
                tracing::debug!(profile = %profile_id, item = %item_id, "seed already present");
                return Ok(current);
            }
            if !item_checked {
                self.item(item_id)
                    .await?
                    .ok_or_else(|| ProfileError::ItemNotFound(item_id.clone()))?;
                item_checked = true;
            }

            let mut seeds = current.seed_item_ids.clone();
            seeds.push(item_id.clone());
            match self.write_seeds(&current, seeds).await? {
                Some(updated) => {
                    tracing::info!(
                        profile = %profile_id,
                        item = %item_id,
                        seeds = updated.size(),
                        "added seed"
                    );
                    return Ok(updated);
                }
                None => {
                    tracing::warn!(profile = %profile_id, attempt, "concurrent update, retrying");
                }
            }
        }
        Err(ProfileError::Contention {
            profile: profile_id.clone(),
            attempts: self.options.max_update_attempts,
        })
    }

    /// Always fails: seed removal is not supported.
    pub async fn remove_seed(
        &self,
        profile_id: &ProfileId,
        item_id: &ItemId,
    ) -> Result<VibeProfile, ProfileError> {
        tracing::debug!(profile = %profile_id, item = %item_id, "rejecting seed removal");
        Err(ProfileError::UnsupportedOperation("removing a seed from a profile"))
    }

    /// Removes a profile. Returns `false` if it did not exist; that is not an error.
    pub async fn delete_profile(&self, profile_id: &ProfileId) -> Result<bool, ProfileError> {
        let removed =
            store::within(self.options.timeout, self.store.delete_profile(profile_id)).await?;
        if removed {
            tracing::info!(profile = %profile_id, "deleted profile");
        } else {
            tracing::debug!(profile = %profile_id, "delete of unknown profile");
        }
        Ok(removed)
    }

    pub async fn get_profile(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Option<VibeProfile>, ProfileError> {
        Ok(store::within(self.options.timeout, self.store.get_profile(profile_id)).await?)
    }

    pub async fn rename_profile(
        &self,
        profile_id: &ProfileId,
        name: &str,
    ) -> Result<VibeProfile, ProfileError> {
        for attempt in 1..=self.options.max_update_attempts {
            let current = self.require(profile_id).await?;
            if current.name == name {
                return Ok(current);
            }
            let mut next = current.clone();
            next.name = name.to_string();
            next.updated_at = Utc::now();
            if let Some(updated) = self.write(next, current.version).await? {
                return Ok(updated);
            }
            tracing::warn!(profile = %profile_id, attempt, "concurrent update, retrying");
        }
        Err(ProfileError::Contention {
            profile: profile_id.clone(),
            attempts: self.options.max_update_attempts,
        })
    }

    /// All profiles, newest first.
    pub async fn list_profiles(&self) -> Result<Vec<VibeProfile>, ProfileError> {
        let mut profiles = store::within(self.options.timeout, self.store.list_profiles()).await?;
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(profiles)
    }

    /// Profiles that use `item_id` as a seed.
    pub async fn profiles_containing(
        &self,
        item_id: &ItemId,
    ) -> Result<Vec<VibeProfile>, ProfileError> {
        let mut profiles = self.list_profiles().await?;
        profiles.retain(|p| p.contains(item_id));
        Ok(profiles)
    }

    /// A profile whose seed set equals `ids`, ignoring order and duplicates.
    pub async fn find_profile_with_seeds(
        &self,
        ids: &[ItemId],
    ) -> Result<Option<VibeProfile>, ProfileError> {
        Ok(self
            .list_profiles()
            .await?
            .into_iter()
            .find(|p| p.has_seed_set(ids)))
    }

    /// The profile's seed items, in seed order.
    pub async fn seed_items(&self, profile_id: &ProfileId) -> Result<Vec<Item>, ProfileError> {
        let profile = self.require(profile_id).await?;
        Ok(store::within(
            self.options.timeout,
            self.store.get_items(&profile.seed_item_ids),
        )
        .await?)
    }

    pub async fn stats(&self) -> Result<ProfileStats, ProfileError> {
        let profiles = store::within(self.options.timeout, self.store.list_profiles()).await?;
        let mut stats = ProfileStats {
            total_profiles: profiles.len(),
            ..ProfileStats::default()
        };
        for p in &profiles {
            stats.total_seeds += p.size();
            match p.state() {
                ProfileState::Active => stats.active += 1,
                ProfileState::Empty => stats.empty += 1,
            }
        }
        Ok(stats)
    }

    /// Deletes every profile with fewer than `min_seeds` seeds. Returns the deleted ids.
    pub async fn prune(&self, min_seeds: usize) -> Result<Vec<ProfileId>, ProfileError> {
        let mut deleted = Vec::new();
        for profile in self.list_profiles().await? {
            if profile.size() < min_seeds && self.delete_profile(&profile.id).await? {
                deleted.push(profile.id);
            }
        }
        tracing::info!(deleted = deleted.len(), min_seeds, "pruned profiles");
        Ok(deleted)
    }

    /// Recomputes the aggregate from the seeds' current embeddings.
    pub async fn refresh_aggregate(
        &self,
        profile_id: &ProfileId,
    ) -> Result<VibeProfile, ProfileError> {
        for attempt in 1..=self.options.max_update_attempts {
            let current = self.require(profile_id).await?;
            if current.seed_item_ids.is_empty() {
                return Ok(current);
            }
            if let Some(updated) = self.write_seeds(&current, current.seed_item_ids.clone()).await? {
                return Ok(updated);
            }
            tracing::warn!(profile = %profile_id, attempt, "concurrent update, retrying");
        }
        Err(ProfileError::Contention {
            profile: profile_id.clone(),
            attempts: self.options.max_update_attempts,
        })
    }

    /// Refreshes every non-empty profile. Returns how many were recomputed.
    pub async fn refresh_all(&self) -> Result<usize, ProfileError> {
        let mut refreshed = 0;
        for profile in self.list_profiles().await? {
            if profile.state() == ProfileState::Empty {
                continue;
            }
            match self.refresh_aggregate(&profile.id).await {
                Ok(_) => refreshed += 1,
                // Deleted while we were iterating.
                Err(ProfileError::ProfileNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(refreshed)
    }

    /// Recomputes the aggregate over `seeds` and CASes it onto `current`.
    /// `None` means another writer got there first.
    async fn write_seeds(
        &self,
        current: &VibeProfile,
        seeds: Vec<ItemId>,
    ) -> Result<Option<VibeProfile>, ProfileError> {
        let mut embeddings = Vec::with_capacity(seeds.len());
        for id in &seeds {
            let item = self
                .item(id)
                .await?
                .ok_or_else(|| ProfileError::ItemNotFound(id.clone()))?;
            embeddings.push(item.embedding);
        }
        let mut next = current.clone();
        next.aggregate_vector = Some(aggregate(&embeddings)?);
        next.seed_item_ids = seeds;
        next.updated_at = Utc::now();
        self.write(next, current.version).await
    }

    async fn write(
        &self,
        mut next: VibeProfile,
        expected_version: u64,
    ) -> Result<Option<VibeProfile>, ProfileError> {
        let id = next.id.clone();
        let outcome = store::within(
            self.options.timeout,
            self.store.replace_profile(next.clone(), expected_version),
        )
        .await?;
        match outcome {
            WriteOutcome::Written => {
                next.version = expected_version + 1;
                Ok(Some(next))
            }
            WriteOutcome::Conflict => Ok(None),
            WriteOutcome::Missing => Err(ProfileError::ProfileNotFound(id)),
        }
    }

    async fn require(&self, profile_id: &ProfileId) -> Result<VibeProfile, ProfileError> {
        self.get_profile(profile_id)
            .await?
            .ok_or_else(|| ProfileError::ProfileNotFound(profile_id.clone()))
    }

    async fn item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        store::within(self.options.timeout, self.store.get_item(id)).await
    }

    /// `name`, or `name (2)`, `name (3)`, … if taken.
    async fn unique_name(&self, name: &str) -> Result<String, StoreError> {
        let taken: Vec<String> = store::within(self.options.timeout, self.store.list_profiles())
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        if !taken.iter().any(|n| n == name) {
            return Ok(name.to_string());
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name} ({n})");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error("none of the seed items could be found ({} skipped)", .skipped.len())]
    NoValidSeeds { skipped: Vec<ItemId> },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("gave up updating profile {profile} after {attempts} conflicting writes")]
    Contention { profile: ProfileId, attempts: u32 },
    #[error("aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("store rejected the request: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ProfileError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            ProfileError::StoreUnavailable(err)
        } else {
            ProfileError::Store(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::testing::{abc, corpus, ContendedStore, DownStore};

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|s| ItemId::from(*s)).collect()
    }

    fn manager(store: Arc<dyn ItemStore>) -> ProfileManager {
        ProfileManager::new(store, EngineOptions::default())
    }

    #[tokio::test]
    async fn create_averages_seeds() {
        let m = manager(abc().await);
        let created = m.create_profile("p", &ids(&["A", "B"]), false).await.unwrap();
        assert_eq!(created.profile.aggregate_vector, Some(vec![0.5, 0.5]));
        assert_eq!(created.profile.state(), ProfileState::Active);
        assert!(created.skipped.is_empty());
    }

    #[tokio::test]
    async fn create_collapses_duplicates() {
        let m = manager(abc().await);
        let created = m.create_profile("p", &ids(&["B", "A", "B"]), false).await.unwrap();
        assert_eq!(created.profile.seed_item_ids, ids(&["B", "A"]));
        assert_eq!(created.profile.size(), 2);
    }

    #[tokio::test]
    async fn lenient_create_skips_unknown() {
        let m = manager(abc().await);
        let created = m.create_profile("p", &ids(&["A", "ghost"]), false).await.unwrap();
        assert_eq!(created.profile.seed_item_ids, ids(&["A"]));
        assert_eq!(created.skipped, ids(&["ghost"]));
        assert_eq!(created.profile.aggregate_vector, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn strict_create_fails_on_unknown() {
        let options = EngineOptions {
            seed_policy: SeedPolicy::Strict,
            ..EngineOptions::default()
        };
        let m = ProfileManager::new(abc().await, options);
        let err = m.create_profile("p", &ids(&["A", "ghost"]), false).await.unwrap_err();
        assert!(matches!(err, ProfileError::ItemNotFound(id) if id.as_str() == "ghost"));
        assert!(m.list_profiles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_create_needs_permission() {
        let m = manager(abc().await);
        let err = m.create_profile("p", &[], false).await.unwrap_err();
        assert!(matches!(err, ProfileError::NoValidSeeds { .. }));

        let created = m.create_profile("p", &[], true).await.unwrap();
        assert_eq!(created.profile.state(), ProfileState::Empty);
        assert!(created.profile.aggregate_vector.is_none());
    }

    #[tokio::test]
    async fn all_unknown_seeds_is_no_valid_seeds() {
        let m = manager(abc().await);
        let err = m.create_profile("p", &ids(&["x", "y"]), false).await.unwrap_err();
        match err {
            ProfileError::NoValidSeeds { skipped } => assert_eq!(skipped, ids(&["x", "y"])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_seed_recomputes_and_activates() {
        let m = manager(abc().await);
        let empty = m.create_profile("p", &[], true).await.unwrap().profile;

        let one = m.add_seed(&empty.id, &ItemId::from("A")).await.unwrap();
        assert_eq!(one.state(), ProfileState::Active);
        assert_eq!(one.aggregate_vector, Some(vec![1.0, 0.0]));

        let two = m.add_seed(&empty.id, &ItemId::from("B")).await.unwrap();
        assert_eq!(two.aggregate_vector, Some(vec![0.5, 0.5]));
        assert_eq!(two.seed_item_ids, ids(&["A", "B"]));

        let stored = m.get_profile(&empty.id).await.unwrap().unwrap();
        assert_eq!(stored, two);
    }

    #[tokio::test]
    async fn add_seed_is_idempotent() {
        let m = manager(abc().await);
        let p = m.create_profile("p", &ids(&["A", "C"]), false).await.unwrap().profile;
        let again = m.add_seed(&p.id, &ItemId::from("A")).await.unwrap();
        assert_eq!(again.seed_item_ids, p.seed_item_ids);
        assert_eq!(again.aggregate_vector, p.aggregate_vector);
        assert_eq!(again.version, p.version);
    }

    #[tokio::test]
    async fn add_seed_errors() {
        let m = manager(abc().await);
        let p = m.create_profile("p", &ids(&["A"]), false).await.unwrap().profile;

        let err = m.add_seed(&ProfileId::from("nope"), &ItemId::from("A")).await.unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound(_)));

        let err = m.add_seed(&p.id, &ItemId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, ProfileError::ItemNotFound(_)));
        let unchanged = m.get_profile(&p.id).await.unwrap().unwrap();
        assert_eq!(unchanged.seed_item_ids, ids(&["A"]));
    }

    #[tokio::test]
    async fn remove_seed_is_unsupported() {
        let m = manager(abc().await);
        let p = m.create_profile("p", &ids(&["A", "B"]), false).await.unwrap().profile;
        let err = m.remove_seed(&p.id, &ItemId::from("A")).await.unwrap_err();
        assert!(matches!(err, ProfileError::UnsupportedOperation(_)));
        assert_eq!(m.get_profile(&p.id).await.unwrap().unwrap().size(), 2);
    }

    #[tokio::test]
    async fn delete_unknown_is_not_an_error() {
        let m = manager(abc().await);
        assert!(!m.delete_profile(&ProfileId::from("nonexistent")).await.unwrap());

        let p = m.create_profile("p", &ids(&["A"]), false).await.unwrap().profile;
        assert!(m.delete_profile(&p.id).await.unwrap());
        assert!(m.get_profile(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn names_stay_unique() {
        let m = manager(abc().await);
        let a = m.create_profile("rain", &ids(&["A"]), false).await.unwrap().profile;
        let b = m.create_profile("rain", &ids(&["B"]), false).await.unwrap().profile;
        let c = m.create_profile("rain", &ids(&["C"]), false).await.unwrap().profile;
        assert_eq!(a.name, "rain");
        assert_eq!(b.name, "rain (2)");
        assert_eq!(c.name, "rain (3)");
    }

    #[tokio::test]
    async fn rename_and_lookup() {
        let m = manager(abc().await);
        let p = m.create_profile("p", &ids(&["A", "C"]), false).await.unwrap().profile;
        let renamed = m.rename_profile(&p.id, "morning").await.unwrap();
        assert_eq!(renamed.name, "morning");
        assert_eq!(renamed.aggregate_vector, p.aggregate_vector);

        let found = m.find_profile_with_seeds(&ids(&["C", "A"])).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(p.id.clone()));
        let containing = m.profiles_containing(&ItemId::from("C")).await.unwrap();
        assert_eq!(containing.len(), 1);
        assert!(m.profiles_containing(&ItemId::from("B")).await.unwrap().is_empty());

        let seeds = m.seed_items(&p.id).await.unwrap();
        let seed_ids: Vec<&str> = seeds.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(seed_ids, ["A", "C"]);
    }

    #[tokio::test]
    async fn stats_and_prune() {
        let m = manager(abc().await);
        m.create_profile("one", &ids(&["A"]), false).await.unwrap();
        let keep = m.create_profile("two", &ids(&["A", "B"]), false).await.unwrap().profile;
        m.create_profile("none", &[], true).await.unwrap();

        let stats = m.stats().await.unwrap();
        assert_eq!(
            stats,
            ProfileStats {
                total_profiles: 3,
                total_seeds: 3,
                active: 2,
                empty: 1
            }
        );

        let deleted = m.prune(2).await.unwrap();
        assert_eq!(deleted.len(), 2);
        let left = m.list_profiles().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep.id);
    }

    #[tokio::test]
    async fn refresh_matches_create() {
        let m = manager(abc().await);
        let p = m.create_profile("p", &ids(&["A", "B", "C"]), false).await.unwrap().profile;
        m.create_profile("e", &[], true).await.unwrap();
        let refreshed = m.refresh_aggregate(&p.id).await.unwrap();
        assert_eq!(refreshed.aggregate_vector, p.aggregate_vector);
        assert_eq!(m.refresh_all().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_keep_every_seed() {
        let letters: Vec<String> = (0..16).map(|i| format!("s{i:02}")).collect();
        let vectors: Vec<[f32; 2]> = (0..16).map(|i| [i as f32, 1.0]).collect();
        let items: Vec<(&str, &[f32])> = letters
            .iter()
            .zip(&vectors)
            .map(|(id, v)| (id.as_str(), v.as_slice()))
            .collect();
        // All 16 first reads see version 0, so at most one of those writes can land.
        let store = Arc::new(ContendedStore::new(corpus(&items).await, letters.len()));
        let options = EngineOptions {
            max_update_attempts: 64,
            ..EngineOptions::default()
        };
        let m = Arc::new(ProfileManager::new(store.clone(), options));
        let p = m.create_profile("crowd", &[], true).await.unwrap().profile;

        let mut tasks = Vec::new();
        for id in &letters {
            let m = m.clone();
            let pid = p.id.clone();
            let id = ItemId::from(id.as_str());
            tasks.push(tokio::spawn(async move { m.add_seed(&pid, &id).await }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert!(store.conflicts() >= letters.len() - 1, "conflicts: {}", store.conflicts());
        let all: Vec<ItemId> = letters.iter().map(|s| ItemId::from(s.as_str())).collect();
        let stored = m.get_profile(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.size(), 16);
        assert_eq!(stored.version, 16);
        assert!(stored.has_seed_set(&all));
        let fresh = m.create_profile("ref", &all, false).await.unwrap().profile;
        assert_eq!(stored.aggregate_vector, fresh.aggregate_vector);
    }

    #[tokio::test]
    async fn retries_past_lost_writes() {
        let store = Arc::new(ContendedStore::new(abc().await, 0).with_forced_conflicts(2));
        let options = EngineOptions {
            max_update_attempts: 3,
            ..EngineOptions::default()
        };
        let m = ProfileManager::new(store.clone(), options);
        let p = m.create_profile("p", &ids(&["A"]), false).await.unwrap().profile;

        let updated = m.add_seed(&p.id, &ItemId::from("B")).await.unwrap();
        assert_eq!(store.conflicts(), 2);
        assert_eq!(updated.seed_item_ids, ids(&["A", "B"]));
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = Arc::new(ContendedStore::new(abc().await, 0).with_forced_conflicts(3));
        let options = EngineOptions {
            max_update_attempts: 3,
            ..EngineOptions::default()
        };
        let m = ProfileManager::new(store.clone(), options);
        let p = m.create_profile("p", &ids(&["A"]), false).await.unwrap().profile;

        let err = m.add_seed(&p.id, &ItemId::from("B")).await.unwrap_err();
        assert!(matches!(
            err,
            ProfileError::Contention { ref profile, attempts: 3 } if *profile == p.id
        ));
        assert_eq!(store.conflicts(), 3);
        let unchanged = m.get_profile(&p.id).await.unwrap().unwrap();
        assert_eq!(unchanged.seed_item_ids, ids(&["A"]));
        assert_eq!(unchanged.version, 0);

        // Conflicts exhausted: the next rename goes straight through.
        let renamed = m.rename_profile(&p.id, "calm").await.unwrap();
        assert_eq!(renamed.name, "calm");
    }

    #[tokio::test]
    async fn store_failure_surfaces() {
        let m = manager(Arc::new(DownStore));
        let err = m.create_profile("p", &ids(&["A"]), false).await.unwrap_err();
        assert!(matches!(err, ProfileError::StoreUnavailable(StoreError::Unavailable(_))));
        let err = m.delete_profile(&ProfileId::from("x")).await.unwrap_err();
        assert!(matches!(err, ProfileError::StoreUnavailable(_)));
    }

    #[test]
    fn only_transient_store_errors_are_unavailable() {
        let err = ProfileError::from(StoreError::Timeout(std::time::Duration::from_secs(1)));
        assert!(matches!(err, ProfileError::StoreUnavailable(StoreError::Timeout(_))));
        let err = ProfileError::from(StoreError::DuplicateProfile(ProfileId::from("p")));
        assert!(matches!(err, ProfileError::Store(StoreError::DuplicateProfile(_))));
        let err = ProfileError::from(StoreError::DimensionMismatch {
            expected: 2,
            actual: 3,
        });
        assert!(matches!(err, ProfileError::Store(StoreError::DimensionMismatch { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn incremental_equals_created(
            vectors in prop::collection::vec(prop::collection::vec(-50.0f32..50.0, 3), 1..8),
            order_seed in any::<u64>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let names: Vec<String> = (0..vectors.len()).map(|i| format!("i{i}")).collect();
                let items: Vec<(&str, &[f32])> = names
                    .iter()
                    .zip(&vectors)
                    .map(|(n, v)| (n.as_str(), v.as_slice()))
                    .collect();
                let m = manager(corpus(&items).await);
                let all: Vec<ItemId> = names.iter().map(|n| ItemId::from(n.as_str())).collect();

                let mut order = all.clone();
                let k = (order_seed as usize) % order.len();
                order.rotate_left(k);
                if order_seed % 2 == 0 {
                    order.reverse();
                }

                let built = m.create_profile("inc", &[], true).await.unwrap().profile;
                for id in &order {
                    m.add_seed(&built.id, id).await.unwrap();
                }
                let built = m.get_profile(&built.id).await.unwrap().unwrap();
                let direct = m.create_profile("direct", &all, false).await.unwrap().profile;
                assert_eq!(built.aggregate_vector, direct.aggregate_vector);
            });
        }
    }
}
