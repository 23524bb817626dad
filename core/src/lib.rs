#![deny(missing_docs)]
//! stash_core: shared building blocks (barrier, metadata codec, archive store, retention).

/// Bounded-concurrency task barrier and serializer.
pub mod barrier;
/// Backup system driving backup/list/prune/restore against a store.
pub mod backup;
/// Configuration helpers (AppId, dirs, load_or_init, etc.)
pub mod cfg;
/// Tracing/log initialization helpers.
pub mod logx;
/// Archive metadata string codec (site id + created/expiry timestamps).
pub mod meta;
/// Retention policy: classify expired archives and delete them.
pub mod retention;
/// Archive store trait and backends (filesystem, in-memory).
pub mod store;
