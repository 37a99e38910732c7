//! All engine logic independent of how the app is run (CLI or an HTTP layer).
//!
//! Seed items are aggregated into a vibe profile's centroid ([aggregate]), profiles are
//! managed by [ProfileManager], and recommendations come from [SimilarityRanker]. The
//! item store and embedding provider are injected as [ItemStore] and [EmbeddingProvider].

pub mod aggregate;
pub mod app_data;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod library;
pub mod model;
pub mod ollama;
pub mod profile;
pub mod ranker;
pub mod store;

#[cfg(test)]
mod testing;

pub use aggregate::{aggregate, cosine_similarity, AggregateError};
pub use app_data::app_data_dir;
pub use catalog::{CatalogError, ImportReport, ItemCatalog};
pub use config::{
    load_config, save_config, set_library_path, Config, ConfigError, EngineOptions, SeedPolicy,
};
pub use embedding::{CachedProvider, EmbeddingProvider, ProviderError};
pub use library::{load_library, save_library, scan_corpus, CorpusEntry, Library, LibraryError};
pub use model::{Item, ItemId, Neighbor, ProfileId, ProfileState, SimilarityResult, VibeProfile};
pub use ollama::{OllamaClient, OllamaError};
pub use profile::{ProfileCreation, ProfileError, ProfileManager, ProfileStats};
pub use ranker::{RankError, SearchOptions, SimilarityRanker};
pub use store::{ItemStore, MemoryStore, StoreError, WriteOutcome};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "stanza-core ready"
}
