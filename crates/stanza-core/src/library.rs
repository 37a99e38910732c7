//! On-disk library: a JSON snapshot of items and profiles, and corpus files to import.
//!
//! Corpus files are `.json`, `.yaml` or `.yml` lists of entries. Entries may carry a
//! precomputed embedding; those without one are embedded on import (see [crate::catalog]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::model::{Item, VibeProfile};
use crate::store::{ItemStore, MemoryStore, StoreError};

/// Everything a [MemoryStore] holds, in a serializable shape.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub profiles: Vec<VibeProfile>,
}

impl Library {
    pub async fn snapshot(store: &MemoryStore) -> Self {
        let (items, profiles) = store.contents().await;
        Self { items, profiles }
    }

    /// Build a store holding this library's items and profiles.
    pub async fn into_store(self) -> Result<MemoryStore, StoreError> {
        let store = MemoryStore::new();
        for item in self.items {
            store.insert_item(item).await?;
        }
        for profile in self.profiles {
            store.insert_profile(profile).await?;
        }
        Ok(store)
    }
}

/// Read a library snapshot. A missing file is an empty library.
pub fn load_library(path: &Path) -> Result<Library, LibraryError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Library::default()),
        Err(e) => return Err(LibraryError::Read(path.to_path_buf(), e)),
    };
    serde_json::from_str(&raw).map_err(|e| LibraryError::Json(path.to_path_buf(), e))
}

/// Write a library snapshot, replacing the file atomically.
pub fn save_library(path: &Path, library: &Library) -> Result<(), LibraryError> {
    let json = serde_json::to_string_pretty(library)
        .map_err(|e| LibraryError::Json(path.to_path_buf(), e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| LibraryError::Write(tmp.clone(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| LibraryError::Write(path.to_path_buf(), e))
}

/// One poem or quote as it appears in a corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reads corpus entries from `root`, which may be a single file or a directory.
/// Directories are walked recursively; hidden entries are skipped.
pub fn scan_corpus(root: &Path) -> Result<Vec<CorpusEntry>, LibraryError> {
    if root.is_file() {
        return read_corpus_file(root);
    }
    if !root.is_dir() {
        return Err(LibraryError::NotFound(root.to_path_buf()));
    }
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| LibraryError::Walk(e.to_string()))?;
        let path = entry.path();
        if path.is_file() && corpus_format(path).is_some() {
            entries.extend(read_corpus_file(path)?);
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn corpus_format(path: &Path) -> Option<Format> {
    match path.extension()?.to_str()? {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        _ => None,
    }
}

fn read_corpus_file(path: &Path) -> Result<Vec<CorpusEntry>, LibraryError> {
    let format =
        corpus_format(path).ok_or_else(|| LibraryError::UnknownFormat(path.to_path_buf()))?;
    let raw =
        std::fs::read_to_string(path).map_err(|e| LibraryError::Read(path.to_path_buf(), e))?;
    let entries = match format {
        Format::Json => serde_json::from_str(&raw)
            .map_err(|e| LibraryError::Json(path.to_path_buf(), e))?,
        Format::Yaml => serde_yaml::from_str(&raw)
            .map_err(|e| LibraryError::Yaml(path.to_path_buf(), e))?,
    };
    Ok(entries)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("no such file or directory: {0}")]
    NotFound(PathBuf),
    #[error("not a corpus file (expected .json, .yaml or .yml): {0}")]
    UnknownFormat(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("write error for {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("invalid JSON in {0}: {1}")]
    Json(PathBuf, serde_json::Error),
    #[error("invalid YAML in {0}: {1}")]
    Yaml(PathBuf, serde_yaml::Error),
}
