use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

/// Opaque handle identifying one stored archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(String);

impl ArchiveId {
    /// Wrap an existing id string (e.g. one typed on the command line).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inventory entry: an id plus the free-text metadata string stored with it.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Archive handle.
    pub id: ArchiveId,
    /// Raw metadata string as stored.
    pub meta: String,
}

/// Failure talking to the archive store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No archive exists under the given id.
    #[error("archive not found: {0}")]
    NotFound(ArchiveId),
    /// Underlying I/O failure.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    /// Backend rejected the request.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The external archive-store collaborator: upload, list, fetch, delete.
///
/// No retry, backoff, or auth handling happens at this layer; errors propagate
/// to the caller as [`StoreError`]. Concurrent deletes are independent requests
/// with no ordering or atomicity promised across them.
#[async_trait]
pub trait ArchiveStore: Send + Sync + 'static {
    /// Full inventory of stored archives.
    async fn list_archives(&self) -> Result<Vec<ArchiveEntry>, StoreError>;
    /// Store `bytes` with the given metadata string; returns the new id.
    async fn put_archive(&self, bytes: &[u8], meta: &str) -> Result<ArchiveId, StoreError>;
    /// Fetch the bytes of one archive.
    async fn get_archive(&self, id: &ArchiveId) -> Result<Vec<u8>, StoreError>;
    /// Delete one archive.
    async fn delete_archive(&self, id: &ArchiveId) -> Result<(), StoreError>;
}

/* --------------------- filesystem backend --------------------- */

/// Filesystem-backed archive store used as the default backend.
///
/// Layout: archive bytes at `<root>/<id>.bin`, metadata sidecar at
/// `<root>/<id>.meta`. Ids are hex (creation time plus a content hash), so they
/// are always safe as file names.
#[derive(Clone)]
pub struct FsStore {
    root: PathBuf,
}

/// Open an FS-backed store rooted at `dir` (created if missing).
pub fn open_fs<P: AsRef<Path>>(dir: P) -> Result<FsStore, StoreError> {
    let root = dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&root)?;
    Ok(FsStore { root })
}

impl FsStore {
    fn bin_path(&self, id: &ArchiveId) -> PathBuf {
        self.root.join(format!("{id}.bin"))
    }

    fn meta_path(&self, id: &ArchiveId) -> PathBuf {
        self.root.join(format!("{id}.meta"))
    }

    fn check_id(id: &ArchiveId) -> Result<(), StoreError> {
        let s = id.as_str();
        if s.is_empty() || s.contains(['/', '\\']) || s.contains("..") {
            return Err(StoreError::Backend(format!("malformed archive id: {s}")));
        }
        Ok(())
    }

    fn new_id(bytes: &[u8]) -> ArchiveId {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut h = DefaultHasher::new();
        h.write(bytes);
        ArchiveId(format!("{nanos:x}-{:016x}", h.finish()))
    }

    /// Write temp then rename, so a crash never leaves a half-written archive.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for FsStore {
    async fn list_archives(&self) -> Result<Vec<ArchiveEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(ent) = dir.next_entry().await? {
            let path = ent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let meta = fs::read_to_string(&path).await?;
            entries.push(ArchiveEntry {
                id: ArchiveId(stem.to_string()),
                meta,
            });
        }
        // read_dir order is platform-defined; keep listings stable.
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn put_archive(&self, bytes: &[u8], meta: &str) -> Result<ArchiveId, StoreError> {
        let id = Self::new_id(bytes);
        Self::write_atomic(&self.bin_path(&id), bytes).await?;
        Self::write_atomic(&self.meta_path(&id), meta.as_bytes()).await?;
        Ok(id)
    }

    async fn get_archive(&self, id: &ArchiveId) -> Result<Vec<u8>, StoreError> {
        Self::check_id(id)?;
        match fs::read(self.bin_path(id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_archive(&self, id: &ArchiveId) -> Result<(), StoreError> {
        Self::check_id(id)?;
        match fs::remove_file(self.bin_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        // Sidecar may already be gone; that is fine.
        let _ = fs::remove_file(self.meta_path(id)).await;
        Ok(())
    }
}

/* --------------------- in-memory backend --------------------- */

/// In-memory store for development and tests. Supports injecting delete
/// failures per id to exercise independent failure domains during pruning.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    archives: HashMap<ArchiveId, (Vec<u8>, String)>,
    next: u64,
    fail_deletes: Vec<ArchiveId>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `delete_archive(id)` calls fail for this id.
    pub fn fail_delete_of(&self, id: ArchiveId) {
        self.inner.lock().expect("store lock").fail_deletes.push(id);
    }

    /// Insert an archive under a caller-chosen id (test setup helper).
    pub fn insert(&self, id: ArchiveId, bytes: Vec<u8>, meta: &str) {
        self.inner
            .lock()
            .expect("store lock")
            .archives
            .insert(id, (bytes, meta.to_string()));
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn list_archives(&self) -> Result<Vec<ArchiveEntry>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        let mut entries: Vec<ArchiveEntry> = inner
            .archives
            .iter()
            .map(|(id, (_, meta))| ArchiveEntry {
                id: id.clone(),
                meta: meta.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn put_archive(&self, bytes: &[u8], meta: &str) -> Result<ArchiveId, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next += 1;
        let id = ArchiveId(format!("mem-{:04}", inner.next));
        inner
            .archives
            .insert(id.clone(), (bytes.to_vec(), meta.to_string()));
        Ok(id)
    }

    async fn get_archive(&self, id: &ArchiveId) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        inner
            .archives
            .get(id)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn delete_archive(&self, id: &ArchiveId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.fail_deletes.contains(id) {
            return Err(StoreError::Backend(format!("injected failure for {id}")));
        }
        inner
            .archives
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
