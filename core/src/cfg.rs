use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retention::InvalidMetaPolicy;

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"stash"`.
    pub application: &'static str,
}

/// Application configuration persisted to `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    pub log_level: String,
    /// Archive store root. Defaults to `archives/` under the app data dir.
    #[serde(default)]
    pub store_root: Option<PathBuf>,
    /// Maximum concurrent deletions during prune.
    #[serde(default = "default_prune_concurrency")]
    pub prune_concurrency: usize,
    /// Whether archives with unparsable dates are pruned ("delete") or kept
    /// ("keep").
    #[serde(default)]
    pub invalid_meta_policy: InvalidMetaPolicy,
}

fn default_prune_concurrency() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store_root: None,
            prune_concurrency: default_prune_concurrency(),
            invalid_meta_policy: InvalidMetaPolicy::default(),
        }
    }
}

impl Config {
    /// Reject values that cannot work at runtime, so a bad `config.toml`
    /// surfaces as an error instead of a panic deeper in.
    pub fn validate(&self) -> Result<()> {
        if self.prune_concurrency == 0 {
            anyhow::bail!("prune_concurrency must be at least 1");
        }
        Ok(())
    }
}

fn project_dirs(app: &AppId) -> Result<ProjectDirs> {
    ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))
}

/// Return the configuration directory for this app, creating it if needed.
/// `<APP>_CONFIG_DIR` (e.g. `STASH_CONFIG_DIR`) overrides the platform
/// default, which keeps tests and scripted runs away from the user's home.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let var = format!("{}_CONFIG_DIR", app.application.to_uppercase());
    let dir = match std::env::var_os(&var) {
        Some(dir) => PathBuf::from(dir),
        None => project_dirs(app)?.config_dir().to_path_buf(),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Default archive store root under the app data dir (not created here).
pub fn default_store_root(app: &AppId) -> Result<PathBuf> {
    Ok(project_dirs(app)?.data_dir().join("archives"))
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    let dir = config_dir(app)?;
    let path = dir.join("config.toml");
    if path.exists() {
        let txt =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config =
            toml::from_str(&txt).with_context(|| format!("parse {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid {}", path.display()))?;
        Ok(cfg)
    } else {
        let cfg = Config::default();
        save_config(&path, &cfg)?;
        Ok(cfg)
    }
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
