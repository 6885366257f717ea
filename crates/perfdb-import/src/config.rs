use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use perfdb_core::ReconcilePolicy;

pub const CONFIG_FILE: &str = "perfdb.toml";
pub const DEFAULT_DB_FILE: &str = "perfdb.db";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub instance: InstanceSection,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reconcile: ReconcilePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InstanceSection {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Tilde-expanded; relative paths resolve against the instance directory.
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    DEFAULT_DB_FILE.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Config {
    pub fn default_for_instance(name: &str) -> Self {
        Self {
            instance: InstanceSection { name: name.to_string() },
            database: DatabaseConfig::default(),
            reconcile: ReconcilePolicy::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(instance_root: &Path) -> PathBuf {
        instance_root.join(CONFIG_FILE)
    }

    pub fn db_path(&self, instance_root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.database.path).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            instance_root.join(expanded)
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }
}
