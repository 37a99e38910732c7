//! Ingestion pipeline: corpus entries → embed (when missing) → store.

use std::sync::Arc;

use crate::config::EngineOptions;
use crate::embedding::{self, EmbeddingProvider, ProviderError};
use crate::library::CorpusEntry;
use crate::model::{Item, ItemId};
use crate::store::{self, ItemStore, StoreError};

/// Counts from an [ItemCatalog::import] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    /// Entries whose id was already in the store.
    pub skipped: Vec<ItemId>,
}

pub struct ItemCatalog {
    store: Arc<dyn ItemStore>,
    provider: Arc<dyn EmbeddingProvider>,
    options: EngineOptions,
}

impl ItemCatalog {
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

    /// Adds a single entry, embedding its text if it has no embedding.
    pub async fn add_item(&self, entry: CorpusEntry) -> Result<Item, CatalogError> {
        let id = entry.id.clone().map(ItemId::from).unwrap_or_else(ItemId::generate);
        if self.get(&id).await?.is_some() {
            return Err(CatalogError::Store(StoreError::DuplicateItem(id)));
        }
        let embedding = match entry.embedding {
            Some(v) => v,
            None => embedding::within(self.options.timeout, self.provider.embed(&entry.text)).await?,
        };
        let item = into_item(id, entry.title, entry.author, entry.text, embedding, entry.tags);
        self.insert(item.clone()).await?;
        tracing::info!(id = %item.id, "added item");
        Ok(item)
    }

    /// Adds every entry not already present. Entries without embeddings are embedded in one batch.
    pub async fn import(&self, entries: Vec<CorpusEntry>) -> Result<ImportReport, CatalogError> {
        let mut report = ImportReport::default();
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id.clone().map(ItemId::from).unwrap_or_else(ItemId::generate);
            if self.get(&id).await?.is_some() || fresh.iter().any(|(i, _)| i == &id) {
                report.skipped.push(id);
                continue;
            }
            fresh.push((id, entry));
        }

        let texts: Vec<String> = fresh
            .iter()
            .filter(|(_, e)| e.embedding.is_none())
            .map(|(_, e)| e.text.clone())
            .collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            tracing::debug!(
                count = texts.len(),
                model = self.provider.model_name(),
                "embedding corpus entries"
            );
            embedding::within(self.options.timeout, self.provider.embed_batch(&texts)).await?
        };
        if vectors.len() != texts.len() {
            return Err(ProviderError::BatchMismatch {
                sent: texts.len(),
                received: vectors.len(),
            }
            .into());
        }
        let mut embedded = vectors.into_iter();
        let mut items = Vec::with_capacity(fresh.len());
        for (id, entry) in fresh {
            let embedding = match entry.embedding {
                Some(v) => v,
                None => embedded.next().ok_or(ProviderError::EmptyEmbedding)?,
            };
            items.push(into_item(id, entry.title, entry.author, entry.text, embedding, entry.tags));
        }

        // Nothing is inserted unless every item fits the corpus dimension.
        let stored = store::within(self.options.timeout, self.store.dimension()).await?;
        if let Some(expected) = stored.or_else(|| items.first().map(|i| i.embedding.len())) {
            if let Some(bad) = items
                .iter()
                .find(|i| i.embedding.is_empty() || i.embedding.len() != expected)
            {
                return Err(CatalogError::DimensionMismatch {
                    id: bad.id.clone(),
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        for item in items {
            self.insert(item).await?;
            report.added += 1;
        }
        tracing::info!(added = report.added, skipped = report.skipped.len(), "import finished");
        Ok(report)
    }

    async fn get(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        store::within(self.options.timeout, self.store.get_item(id)).await
    }

    async fn insert(&self, item: Item) -> Result<(), StoreError> {
        store::within(self.options.timeout, self.store.insert_item(item)).await
    }
}

fn into_item(
    id: ItemId,
    title: String,
    author: String,
    text: String,
    embedding: Vec<f32>,
    tags: Vec<String>,
) -> Item {
    Item {
        id,
        title: if title.trim().is_empty() { "Untitled".to_string() } else { title },
        author: if author.trim().is_empty() { "Unknown".to_string() } else { author },
        text,
        embedding,
        tags,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("embedding error: {0}")]
    Provider(#[from] ProviderError),
    #[error("item {id} has {actual} dimensions, corpus uses {expected}")]
    DimensionMismatch {
        id: ItemId,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FakeProvider;

    fn entry(id: Option<&str>, text: &str, embedding: Option<Vec<f32>>) -> CorpusEntry {
        CorpusEntry {
            id: id.map(str::to_string),
            title: String::new(),
            author: "Dickinson".into(),
            text: text.into(),
            embedding,
            tags: Vec::new(),
        }
    }

    fn catalog(store: Arc<MemoryStore>, provider: FakeProvider) -> ItemCatalog {
        ItemCatalog::new(store, Arc::new(provider), EngineOptions::default())
    }

    #[tokio::test]
    async fn import_embeds_only_missing() {
        let store = Arc::new(MemoryStore::new());
        let provider = FakeProvider::new(3);
        let catalog = catalog(store.clone(), provider.clone());

        let report = catalog
            .import(vec![
                entry(Some("a"), "Hope is the thing with feathers", Some(vec![1.0, 0.0, 0.0])),
                entry(Some("b"), "Because I could not stop for Death", None),
                entry(Some("a"), "duplicate in the same batch", None),
            ])
            .await
            .unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, vec![ItemId::from("a")]);
        assert_eq!(provider.calls(), 1);
        let b = store.get_item(&ItemId::from("b")).await.unwrap().unwrap();
        assert_eq!(b.embedding, provider.vector_for("Because I could not stop for Death"));
        assert_eq!(b.title, "Untitled");
    }

    #[tokio::test]
    async fn reimport_skips_existing() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone(), FakeProvider::new(3));
        catalog.import(vec![entry(Some("a"), "x", None)]).await.unwrap();
        let report = catalog.import(vec![entry(Some("a"), "x", None)]).await.unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_batch_inserts_nothing() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone(), FakeProvider::new(3));
        catalog.import(vec![entry(Some("a"), "x", None)]).await.unwrap();

        let err = catalog
            .import(vec![
                entry(Some("b"), "fits", None),
                entry(Some("c"), "too short", Some(vec![1.0, 0.0])),
                entry(Some("d"), "also fits", None),
            ])
            .await
            .unwrap_err();
        match err {
            CatalogError::DimensionMismatch {
                id,
                expected,
                actual,
            } => {
                assert_eq!(id.as_str(), "c");
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn first_import_must_agree_with_itself() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone(), FakeProvider::new(3));
        let err = catalog
            .import(vec![
                entry(Some("a"), "x", Some(vec![1.0, 0.0])),
                entry(Some("b"), "y", None),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert_eq!(store.item_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_item_generates_id() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone(), FakeProvider::new(3));
        let item = catalog.add_item(entry(None, "A word is dead", None)).await.unwrap();
        assert!(!item.id.as_str().is_empty());
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn provider_failure_surfaces() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog(store.clone(), FakeProvider::new(3));
        let err = catalog.add_item(entry(Some("e"), "", None)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Provider(ProviderError::EmptyEmbedding)));
        assert_eq!(store.item_count().await.unwrap(), 0);
    }
}
