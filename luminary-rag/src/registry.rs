//! Document registry: the durable source of truth for which documents exist.
//!
//! The registry stores one [`DocumentRecord`] and the raw content per
//! document. The engine consults it before and after every vector index
//! mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::DocumentRecord;
use crate::error::{RagError, Result};
use crate::persistent::{read_json, write_json_atomic};

/// Durable storage for document summaries and raw bodies.
pub trait DocumentRegistry: Send + Sync {
    /// Whether `doc_id` is registered.
    fn contains(&self, doc_id: &str) -> Result<bool> {
        Ok(self.get(doc_id)?.is_some())
    }

    /// The record for `doc_id`, if registered.
    fn get(&self, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// The raw content of `doc_id`, if registered.
    fn content(&self, doc_id: &str) -> Result<Option<String>>;

    /// Register a new document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the id is already registered or the
    /// write fails. Nothing is stored in either case.
    fn insert(&self, record: DocumentRecord, content: &str) -> Result<()>;

    /// Remove a document and its content, returning the removed record.
    fn remove(&self, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// Every registered record, oldest first.
    fn list(&self) -> Result<Vec<DocumentRecord>>;
}

/// Validate a document id before it is used as a storage key.
///
/// Ids must be non-empty, must not be `.` or `..`, and must not contain path
/// separators or control characters.
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    let invalid = doc_id.trim().is_empty()
        || doc_id == "."
        || doc_id == ".."
        || doc_id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(RagError::InvalidArgument(format!("'{doc_id}' is not a valid document id")));
    }
    Ok(())
}

fn sorted(records: impl Iterator<Item = DocumentRecord>) -> Vec<DocumentRecord> {
    let mut all: Vec<DocumentRecord> = records.collect();
    all.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.doc_id.cmp(&b.doc_id)));
    all
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RegistryIndex {
    documents: BTreeMap<String, DocumentRecord>,
}

#[derive(Debug)]
struct Entry {
    record: DocumentRecord,
    content: String,
}

/// A registry held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    documents: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.documents.read().map_err(|e| RagError::storage("read", format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.documents.write().map_err(|e| RagError::storage("write", format!("lock poisoned: {e}")))
    }
}

impl DocumentRegistry for InMemoryRegistry {
    fn get(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.read()?.get(doc_id).map(|e| e.record.clone()))
    }

    fn content(&self, doc_id: &str) -> Result<Option<String>> {
        Ok(self.read()?.get(doc_id).map(|e| e.content.clone()))
    }

    fn insert(&self, record: DocumentRecord, content: &str) -> Result<()> {
        let mut documents = self.write()?;
        if documents.contains_key(&record.doc_id) {
            return Err(RagError::storage(
                "insert",
                format!("document '{}' is already registered", record.doc_id),
            ));
        }
        documents
            .insert(record.doc_id.clone(), Entry { record, content: content.to_string() });
        Ok(())
    }

    fn remove(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.write()?.remove(doc_id).map(|e| e.record))
    }

    fn list(&self) -> Result<Vec<DocumentRecord>> {
        Ok(sorted(self.read()?.values().map(|e| e.record.clone())))
    }
}

/// A registry persisted under a directory.
///
/// Layout: `<root>/index.json` holds every record; `<root>/documents/<id>.txt`
/// holds each raw body. The index is rewritten atomically on every change.
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    index: RwLock<RegistryIndex>,
}

impl FileRegistry {
    /// Open (or create) a registry rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the directories cannot be created or
    /// an existing index cannot be parsed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("documents"))
            .map_err(|e| RagError::storage("open", format!("{}: {e}", root.display())))?;

        let index: RegistryIndex = read_json(&root.join("index.json"))
            .map_err(|e| RagError::storage("load_index", e))?
            .unwrap_or_default();

        info!(root = %root.display(), document_count = index.documents.len(), "opened document registry");
        Ok(Self { root, index: RwLock::new(index) })
    }

    /// The registry root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn content_path(&self, doc_id: &str) -> PathBuf {
        self.root.join("documents").join(format!("{doc_id}.txt"))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryIndex>> {
        self.index.read().map_err(|e| RagError::storage("read", format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryIndex>> {
        self.index.write().map_err(|e| RagError::storage("write", format!("lock poisoned: {e}")))
    }
}

impl DocumentRegistry for FileRegistry {
    fn get(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.read()?.documents.get(doc_id).cloned())
    }

    fn content(&self, doc_id: &str) -> Result<Option<String>> {
        if !self.read()?.documents.contains_key(doc_id) {
            return Ok(None);
        }
        fs::read_to_string(self.content_path(doc_id))
            .map(Some)
            .map_err(|e| RagError::storage("read_content", format!("document '{doc_id}': {e}")))
    }

    fn insert(&self, record: DocumentRecord, content: &str) -> Result<()> {
        validate_doc_id(&record.doc_id)?;
        let mut index = self.write()?;
        if index.documents.contains_key(&record.doc_id) {
            return Err(RagError::storage(
                "insert",
                format!("document '{}' is already registered", record.doc_id),
            ));
        }

        let content_path = self.content_path(&record.doc_id);
        fs::write(&content_path, content)
            .map_err(|e| RagError::storage("write_content", format!("document '{}': {e}", record.doc_id)))?;

        let doc_id = record.doc_id.clone();
        let mut updated = index.clone();
        updated.documents.insert(doc_id.clone(), record);
        if let Err(e) = write_json_atomic(&self.index_path(), &updated) {
            if let Err(cleanup) = fs::remove_file(&content_path) {
                warn!(doc.id = %doc_id, error = %cleanup, "could not remove orphaned content file");
            }
            return Err(RagError::storage("save_index", e));
        }

        *index = updated;
        debug!(doc.id = %doc_id, "registered document");
        Ok(())
    }

    fn remove(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let mut index = self.write()?;
        if !index.documents.contains_key(doc_id) {
            return Ok(None);
        }

        let mut updated = index.clone();
        let removed = updated.documents.remove(doc_id);
        write_json_atomic(&self.index_path(), &updated).map_err(|e| RagError::storage("save_index", e))?;
        *index = updated;

        match fs::remove_file(self.content_path(doc_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(doc.id = %doc_id, error = %e, "could not remove content file"),
        }
        debug!(doc.id = %doc_id, "unregistered document");
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<DocumentRecord>> {
        Ok(sorted(self.read()?.documents.values().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::document::Metadata;

    fn record(doc_id: &str, offset_secs: i64) -> DocumentRecord {
        DocumentRecord {
            doc_id: doc_id.to_string(),
            title: format!("Title {doc_id}"),
            metadata: Metadata::new(),
            added_at: Utc::now() + Duration::seconds(offset_secs),
            chunk_count: 1,
            char_count: 10,
            word_count: 2,
        }
    }

    fn exercise(registry: &dyn DocumentRegistry) {
        registry.insert(record("b", 1), "second body").unwrap();
        registry.insert(record("a", 2), "first body").unwrap();
        assert!(registry.contains("a").unwrap());
        assert_eq!(registry.content("b").unwrap().as_deref(), Some("second body"));

        let err = registry.insert(record("a", 3), "again").unwrap_err();
        assert!(matches!(err, RagError::Storage { operation, .. } if operation == "insert"));
        assert_eq!(registry.content("a").unwrap().as_deref(), Some("first body"));

        let ids: Vec<String> = registry.list().unwrap().into_iter().map(|r| r.doc_id).collect();
        assert_eq!(ids, vec!["b", "a"]);

        assert_eq!(registry.remove("a").unwrap().map(|r| r.doc_id).as_deref(), Some("a"));
        assert!(registry.remove("a").unwrap().is_none());
        assert!(registry.content("a").unwrap().is_none());
    }

    #[test]
    fn in_memory_registry_contract() {
        exercise(&InMemoryRegistry::new());
    }

    #[test]
    fn file_registry_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileRegistry::open(dir.path()).unwrap());
    }

    #[test]
    fn file_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = FileRegistry::open(dir.path()).unwrap();
            registry.insert(record("d1", 0), "Para one.\n\nPara two.").unwrap();
        }
        let registry = FileRegistry::open(dir.path()).unwrap();
        assert_eq!(registry.get("d1").unwrap().unwrap().title, "Title d1");
        assert_eq!(registry.content("d1").unwrap().unwrap(), "Para one.\n\nPara two.");
        assert!(dir.path().join("documents").join("d1.txt").exists());
    }

    #[test]
    fn rejects_path_like_ids() {
        for bad in ["", " ", "..", "a/b", "a\\b"] {
            assert!(validate_doc_id(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_doc_id("3f2a9c1b0d4e5f67").is_ok());
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path()).unwrap();
        assert!(registry.insert(record("../escape", 0), "x").is_err());
    }
}
