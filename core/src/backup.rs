use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::meta;
use crate::retention::{self, ArchiveRecord, InvalidMetaPolicy, PruneReport};
use crate::store::{ArchiveId, ArchiveStore};

/// High-level backup operations over an archive store: upload with embedded
/// expiry metadata, list the decoded inventory, prune expired archives, and
/// restore one archive to disk.
pub struct BackupSystem<S: ArchiveStore> {
    store: Arc<S>,
    site_id: String,
    invalid_meta: InvalidMetaPolicy,
    prune_concurrency: usize,
}

impl<S: ArchiveStore> BackupSystem<S> {
    /// Build a backup system for one site against the given store.
    pub fn new(
        store: Arc<S>,
        site_id: impl Into<String>,
        invalid_meta: InvalidMetaPolicy,
        prune_concurrency: usize,
    ) -> Self {
        Self {
            store,
            site_id: site_id.into(),
            invalid_meta,
            prune_concurrency,
        }
    }

    /// Upload the file at `path`, stamping it with the site id, the current
    /// time, and `expiry`. Uploading something that has already expired is a
    /// no-op returning `Ok(None)`.
    pub async fn backup(&self, path: &Path, expiry: DateTime<Utc>) -> Result<Option<ArchiveId>> {
        let now = Utc::now();
        if expiry <= now {
            warn!("skipping backup of {}: already expired", path.display());
            return Ok(None);
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let description = meta::encode(&self.site_id, now, expiry);
        let id = self.store.put_archive(&bytes, &description).await?;
        info!("backup created: archive {id}");
        Ok(Some(id))
    }

    /// Fetch and decode the full inventory.
    pub async fn list(&self) -> Result<Vec<ArchiveRecord>> {
        let records = self
            .store
            .list_archives()
            .await?
            .into_iter()
            .map(|entry| ArchiveRecord::decode(entry.id, entry.meta))
            .collect();
        Ok(records)
    }

    /// Delete expired archives with bounded concurrency; see
    /// [`retention::prune`] for the phase breakdown.
    pub async fn prune(&self) -> Result<PruneReport> {
        let report = retention::prune(
            &self.store,
            Utc::now(),
            self.invalid_meta,
            self.prune_concurrency,
        )
        .await?;
        Ok(report)
    }

    /// Fetch one archive and write it to `out_path` (temp file then rename).
    pub async fn restore(&self, id: &ArchiveId, out_path: &Path) -> Result<()> {
        let bytes = self.store.get_archive(id).await?;
        let tmp = out_path.with_extension("restore-tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, out_path)
            .await
            .with_context(|| format!("rename to {}", out_path.display()))?;
        info!("finished restoring {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn system(store: Arc<MemoryStore>) -> BackupSystem<MemoryStore> {
        BackupSystem::new(store, "test site", InvalidMetaPolicy::Delete, 5)
    }

    #[tokio::test]
    async fn backup_of_already_expired_file_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(Arc::clone(&store));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.tar");
        std::fs::write(&file, b"payload").unwrap();

        let id = sys
            .backup(&file, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert!(id.is_none());
        assert!(store.list_archives().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backup_then_list_decodes_the_metadata() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(Arc::clone(&store));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.tar");
        std::fs::write(&file, b"payload").unwrap();

        let expiry = Utc::now() + Duration::days(7);
        let id = sys.backup(&file, expiry).await.unwrap().unwrap();

        let records = sys.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].meta.site_id, "test site");
        assert!(records[0].meta.created_at.is_some());
        // Encoded at millisecond precision.
        assert_eq!(
            records[0].meta.expiry.unwrap().timestamp_millis(),
            expiry.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn restore_writes_the_archive_bytes() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(Arc::clone(&store));
        let id = store.put_archive(b"restored bytes", "m").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tar");
        sys.restore(&id, &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"restored bytes");
    }

    #[tokio::test]
    async fn restore_of_missing_archive_errors() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(store);
        let dir = tempfile::tempdir().unwrap();
        let err = sys
            .restore(&ArchiveId::new("nope"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
