//! File-backed vector index.
//!
//! [`PersistentVectorIndex`] serves every read from an
//! [`InMemoryVectorIndex`] and rewrites a JSON snapshot after each mutation.
//! Snapshots are written to a temporary file in the same directory and
//! renamed into place, so a crash never leaves a half-written index behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::document::{IndexMatch, IndexedChunk};
use crate::error::{RagError, Result};
use crate::inmemory::{InMemoryVectorIndex, ensure_unique_ids};
use crate::vectorindex::{MetadataFilter, VectorIndex};

const BACKEND: &str = "Persistent";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    chunks: Vec<IndexedChunk>,
}

/// Serialize `value` as pretty JSON to `path`, atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RagError::Io(e.error))?;
    Ok(())
}

/// Read JSON from `path`, or `None` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match File::open(path) {
        Ok(file) => Ok(Some(serde_json::from_reader(BufReader::new(file))?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A vector index that survives process restarts.
///
/// # Example
///
/// ```rust,no_run
/// use luminary_rag::{PersistentVectorIndex, VectorIndex};
///
/// let index = PersistentVectorIndex::open("luminary_storage/vectors.json")?;
/// println!("{} chunks indexed", index.count()?);
/// # Ok::<(), luminary_rag::RagError>(())
/// ```
#[derive(Debug)]
pub struct PersistentVectorIndex {
    path: PathBuf,
    inner: InMemoryVectorIndex,
    writer: Mutex<()>,
}

impl PersistentVectorIndex {
    /// Open the index stored at `path`, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorIndex`] if the snapshot exists but cannot be
    /// read or has an unsupported version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot: Option<Snapshot> = read_json(&path).map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to read vector index snapshot");
            RagError::index(BACKEND, format!("cannot load '{}': {e}", path.display()))
        })?;

        let chunks = match snapshot {
            Some(s) if s.version == SNAPSHOT_VERSION => s.chunks,
            Some(s) => {
                return Err(RagError::index(
                    BACKEND,
                    format!("unsupported snapshot version {} in '{}'", s.version, path.display()),
                ));
            }
            None => Vec::new(),
        };

        info!(path = %path.display(), chunk_count = chunks.len(), "opened vector index");
        Ok(Self { path, inner: InMemoryVectorIndex::from_chunks(chunks), writer: Mutex::new(()) })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `op` to the working set and persist it, restoring the previous
    /// contents if the snapshot cannot be written.
    fn mutate<T>(&self, op: impl FnOnce(&InMemoryVectorIndex) -> Result<T>) -> Result<T> {
        let _guard =
            self.writer.lock().map_err(|e| RagError::index(BACKEND, format!("lock poisoned: {e}")))?;

        let before = self.inner.snapshot()?;
        let out = op(&self.inner)?;

        let snapshot = Snapshot { version: SNAPSHOT_VERSION, chunks: self.inner.snapshot()? };
        if let Err(e) = write_json_atomic(&self.path, &snapshot) {
            error!(path = %self.path.display(), error = %e, "failed to persist vector index");
            self.inner.replace_all(before)?;
            return Err(RagError::index(BACKEND, format!("cannot persist '{}': {e}", self.path.display())));
        }
        debug!(path = %self.path.display(), chunk_count = snapshot.chunks.len(), "persisted vector index");
        Ok(out)
    }
}

impl VectorIndex for PersistentVectorIndex {
    fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        ensure_unique_ids(chunks)?;
        self.mutate(|inner| inner.upsert(chunks))
    }

    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        self.inner.query(embedding, k, filter)
    }

    fn delete_ids(&self, ids: &[&str]) -> Result<()> {
        self.mutate(|inner| inner.delete_ids(ids))
    }

    fn delete_where(&self, filter: &MetadataFilter) -> Result<usize> {
        self.mutate(|inner| inner.delete_where(filter))
    }

    fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexedChunk>> {
        self.inner.get_where(filter)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}
