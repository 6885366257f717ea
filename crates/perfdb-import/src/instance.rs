use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use perfdb_storage_sqlite::SqliteStore;

use crate::config::Config;

/// A local perfdb instance: a directory holding `perfdb.toml` and the database.
pub struct Instance {
    pub root: PathBuf,
    pub cfg: Config,
    pub store: SqliteStore,
}

impl Instance {
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        if !cfg_path.exists() {
            bail!(
                "{} is not a perfdb instance (missing {}); run `perfdb create` first",
                root.display(),
                cfg_path.display()
            );
        }
        let cfg = Config::load_from(&cfg_path)?;
        let store = SqliteStore::open(&cfg.db_path(&root), cfg.busy_timeout())?;
        tracing::debug!(instance = %cfg.instance.name, root = %root.display(), "opened instance");
        Ok(Self { root, cfg, store })
    }

    /// Write a default config if none exists and create the database.
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).ok();
        let cfg_path = Config::config_path(root);
        if !cfg_path.exists() {
            let name = root.file_name().and_then(|s| s.to_str()).unwrap_or("perfdb");
            Config::default_for_instance(name).save_to(&cfg_path)?;
            tracing::info!(path = %cfg_path.display(), "wrote default config");
        }
        Self::open(root.to_path_buf())
    }

    /// Opening migrates the schema; returns the resulting version.
    pub fn update(root: PathBuf) -> Result<i64> {
        let instance = Self::open(root)?;
        let version = instance.store.schema_version()?;
        tracing::info!(instance = %instance.cfg.instance.name, version, "database schema is current");
        Ok(version)
    }
}
