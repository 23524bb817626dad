use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::barrier::{task, Barrier, Capacity};
use crate::meta::{self, ArchiveMeta};
use crate::store::{ArchiveId, ArchiveStore, StoreError};

/// What to do with archives whose embedded dates fail to parse.
///
/// The historical behavior is `Delete` (an archive we cannot date is assumed
/// stale). Whether that is the right default is an open policy question, so it
/// is configurable rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidMetaPolicy {
    /// Treat unparsable dates as expired: select the archive for deletion.
    #[default]
    Delete,
    /// Never delete an archive we cannot date.
    Keep,
}

/// One decoded inventory entry.
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    /// Archive handle.
    pub id: ArchiveId,
    /// Decoded metadata (dates may be invalid).
    pub meta: ArchiveMeta,
    /// The metadata string exactly as stored.
    pub raw_meta: String,
}

impl ArchiveRecord {
    /// Decode a raw inventory entry.
    pub fn decode(id: ArchiveId, raw_meta: String) -> Self {
        let meta = meta::decode(&raw_meta);
        Self { id, meta, raw_meta }
    }
}

/// Outcome of one prune run. Individual deletion failures do not halt their
/// siblings; they are collected here instead of being discarded.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Ids successfully deleted.
    pub deleted: Vec<ArchiveId>,
    /// Ids whose deletion failed, with the error.
    pub failed: Vec<(ArchiveId, StoreError)>,
}

/// Select the archives to delete: expired strictly before `now`, plus (policy
/// permitting) any with an unparsable date. Pure over the snapshot; the single
/// `now` sample keeps the batch decision consistent.
pub fn classify(
    records: &[ArchiveRecord],
    now: DateTime<Utc>,
    policy: InvalidMetaPolicy,
) -> Vec<ArchiveId> {
    records
        .iter()
        .filter(|rec| match (rec.meta.created_at, rec.meta.expiry) {
            (Some(_), Some(expiry)) => expiry < now,
            _ => policy == InvalidMetaPolicy::Delete,
        })
        .map(|rec| rec.id.clone())
        .collect()
}

/// Run the full prune workload against `store`:
/// fetch the inventory (a [`StoreError`] here aborts the whole run), classify
/// against `now`, then delete the selected archives at most `concurrency` at a
/// time through a [`Barrier`].
pub async fn prune<S: ArchiveStore>(
    store: &Arc<S>,
    now: DateTime<Utc>,
    policy: InvalidMetaPolicy,
    concurrency: usize,
) -> Result<PruneReport, StoreError> {
    let records: Vec<ArchiveRecord> = store
        .list_archives()
        .await?
        .into_iter()
        .map(|entry| ArchiveRecord::decode(entry.id, entry.meta))
        .collect();

    let selected = classify(&records, now, policy);
    info!(
        "prune selected {} of {} archives",
        selected.len(),
        records.len()
    );

    let report = Arc::new(Mutex::new(PruneReport::default()));
    let barrier = Barrier::new(Capacity::Bounded(concurrency));
    for id in selected {
        let store = Arc::clone(store);
        let report = Arc::clone(&report);
        barrier
            .submit(task(async move {
                let outcome = store.delete_archive(&id).await;
                let mut report = report.lock().expect("report lock");
                match outcome {
                    Ok(()) => report.deleted.push(id),
                    Err(e) => {
                        warn!("delete failed id={id} err={e}");
                        report.failed.push((id, e));
                    }
                }
            }))
            .expect("barrier sealed before all submissions");
    }
    barrier
        .wait()
        .expect("prune waits once per barrier")
        .await;

    let report = std::mem::take(&mut *report.lock().expect("report lock"));
    Ok(report)
}
