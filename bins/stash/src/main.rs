use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{info, warn};

use stash_core::backup::BackupSystem;
use stash_core::barrier::{self, Task};
use stash_core::cfg::{self, AppId};
use stash_core::logx;
use stash_core::store::{self, ArchiveId};

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name=env!("CARGO_PKG_NAME"), version, about="Archive backup tool")]
struct Cli {
    /// The name of the backup site; prefixed into the archive metadata.
    #[arg(long)]
    name: String,
    /// Archive store root (overrides the configured default).
    #[arg(long)]
    store: Option<PathBuf>,
    /// File to upload as a new archive.
    #[arg(long)]
    backup: Option<PathBuf>,
    /// Keep the backup for a year instead of a week.
    #[arg(long, default_value_t = false)]
    long_term: bool,
    /// Prune expired backups.
    #[arg(long)]
    prune: bool,
    /// List all backups currently in the inventory.
    #[arg(long)]
    list: bool,
    /// Restore a given backup id into the current directory.
    #[arg(long)]
    restore: Option<String>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match cfg::load_or_init(&APP) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };
    let level = match cli.verbose {
        0 => cfg.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    logx::init(level);

    if let Err(e) = run(cli, cfg).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: cfg::Config) -> Result<()> {
    if cli.backup.is_none() && !cli.prune && !cli.list && cli.restore.is_none() {
        bail!("no action provided: either --backup, --restore, --prune, or --list must be given");
    }

    let root = match cli.store.or(cfg.store_root) {
        Some(root) => root,
        None => cfg::default_store_root(&APP)?,
    };
    let store = Arc::new(store::open_fs(&root).with_context(|| format!("open store {}", root.display()))?);
    let sys = Arc::new(BackupSystem::new(
        store,
        cli.name.clone(),
        cfg.invalid_meta_policy,
        cfg.prune_concurrency,
    ));

    // The steps run strictly in order through the serializer; the first failure
    // aborts the remaining ones, matching how the operations depend on each
    // other (prune and list want to see the fresh backup).
    let aborted = Arc::new(AtomicBool::new(false));
    let failure: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));
    let mut steps: Vec<Task> = Vec::new();

    if let Some(path) = cli.backup.clone() {
        let sys = Arc::clone(&sys);
        let days = if cli.long_term { 365 } else { 7 };
        steps.push(step(&aborted, &failure, async move {
            let expiry = Utc::now() + Duration::days(days);
            sys.backup(&path, expiry).await?;
            Ok(())
        }));
    }

    if cli.prune {
        let sys = Arc::clone(&sys);
        steps.push(step(&aborted, &failure, async move {
            let report = sys.prune().await?;
            info!("pruned {} archives", report.deleted.len());
            for (id, e) in &report.failed {
                warn!("failed to prune {id}: {e}");
            }
            Ok(())
        }));
    }

    if cli.list {
        let sys = Arc::clone(&sys);
        steps.push(step(&aborted, &failure, async move {
            for rec in sys.list().await? {
                let created = rec
                    .meta
                    .created_at
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}:\t{}", rec.id, created);
            }
            Ok(())
        }));
    }

    if let Some(id) = cli.restore.clone() {
        let sys = Arc::clone(&sys);
        steps.push(step(&aborted, &failure, async move {
            let out = PathBuf::from(&id);
            sys.restore(&ArchiveId::new(id), &out).await
        }));
    }

    barrier::serialize(steps).await?;

    let outcome = failure.lock().expect("failure slot").take();
    match outcome {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Wrap one CLI step: skipped if an earlier step failed, and records its own
/// failure for the driver to report after the serializer drains.
fn step<F>(
    aborted: &Arc<AtomicBool>,
    failure: &Arc<Mutex<Option<anyhow::Error>>>,
    fut: F,
) -> Task
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let aborted = Arc::clone(aborted);
    let failure = Arc::clone(failure);
    barrier::task(async move {
        if aborted.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = fut.await {
            aborted.store(true, Ordering::SeqCst);
            let mut slot = failure.lock().expect("failure slot");
            if slot.is_none() {
                *slot = Some(e);
            }
        }
    })
}
