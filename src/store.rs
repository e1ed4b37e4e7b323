//! Document corpus storage.
//!
//! The [`DocumentStore`] trait is the narrow seam between the retrieval
//! pipeline and the filesystem: a JSON-backed implementation for production
//! and an in-memory one for tests. Documents are the source of truth; the
//! similarity index is always rebuilt from them.

use std::path::PathBuf;
use std::sync::RwLock;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::models::Document;

/// Errors from the corpus storage layer.
///
/// A missing corpus file is not an error (empty corpus); a file that exists
/// but cannot be parsed is fatal and must reach the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corpus file is corrupt: {0}")]
    CorpusCorrupt(String),
    #[error("corpus I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract document corpus backend.
pub trait DocumentStore: Send + Sync {
    /// Load the full corpus. Missing backing file yields an empty corpus.
    fn load(&self) -> Result<Vec<Document>, StoreError>;

    /// Replace the full corpus.
    fn save(&self, docs: &[Document]) -> Result<(), StoreError>;
}

/// JSON-file-backed corpus store.
///
/// The on-disk format is a pretty-printed JSON array of documents and
/// round-trips byte-for-byte on load → save.
pub struct JsonDocumentStore {
    path: PathBuf,
}

impl JsonDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentStore for JsonDocumentStore {
    fn load(&self) -> Result<Vec<Document>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| StoreError::CorpusCorrupt(e.to_string()))
    }

    fn save(&self, docs: &[Document]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(docs)
            .map_err(|e| StoreError::CorpusCorrupt(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory corpus store for tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.docs.read().unwrap().clone())
    }

    fn save(&self, docs: &[Document]) -> Result<(), StoreError> {
        *self.docs.write().unwrap() = docs.to_vec();
        Ok(())
    }
}

/// Content-derived document id: first 12 hex chars of `sha256(title ‖ text)`.
///
/// Identical content always yields an identical id, which makes re-adding the
/// same document idempotent.
pub fn document_id(title: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

/// Add a document to the corpus and persist it.
///
/// Re-adding identical `(title, text)` content is a no-op that returns the
/// already-stored document.
pub fn add_document(
    store: &dyn DocumentStore,
    title: &str,
    text: &str,
    source: &str,
) -> Result<Document, StoreError> {
    let mut docs = store.load()?;

    let id = document_id(title, text);
    if let Some(existing) = docs.iter().find(|d| d.id == id) {
        info!(id = %id, "document already present, skipping add");
        return Ok(existing.clone());
    }

    let doc = Document {
        id: id.clone(),
        title: title.to_string(),
        text: text.to_string(),
        source: source.to_string(),
    };
    docs.push(doc.clone());
    store.save(&docs)?;

    info!(id = %id, title = %title, "document added");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_corpus() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = JsonDocumentStore::new(tmp.path().join("docs_store.json"));
        assert_eq!(store.load().unwrap().len(), 0);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docs_store.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonDocumentStore::new(path);
        match store.load() {
            Err(StoreError::CorpusCorrupt(_)) => {}
            other => panic!("expected CorpusCorrupt, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docs_store.json");
        let store = JsonDocumentStore::new(&path);

        let docs = vec![Document {
            id: "d1".to_string(),
            title: "Git".to_string(),
            text: "version control basics".to_string(),
            source: "manual".to_string(),
        }];
        store.save(&docs).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, docs);

        // Saving the loaded corpus back produces identical bytes.
        let before = std::fs::read(&path).unwrap();
        store.save(&loaded).unwrap();
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_content_derived_id_is_deterministic() {
        let a = document_id("Git", "version control basics");
        let b = document_id("Git", "version control basics");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);

        let c = document_id("Git", "different text");
        assert_ne!(a, c);
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = MemoryDocumentStore::new();

        let first = add_document(&store, "Git", "version control basics", "manual").unwrap();
        let second = add_document(&store, "Git", "version control basics", "manual").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
