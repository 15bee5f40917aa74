//! Key-value preference persistence
//!
//! The only state the core writes: the last successfully used local model.
//! The store is injected into providers so tests can substitute an
//! in-memory implementation.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::constants;

/// Injected key-value persistence capability
pub trait PreferenceStore: Send + Sync {
    /// Get a preference value
    fn get(&self, key: &str) -> Option<String>;

    /// Set a preference value
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and one-shot invocations
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store at `~/.cardsmith/preferences.json`
///
/// A flat string map read and rewritten on each access; preference traffic
/// is one key per generation, so simplicity wins over caching.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default location, creating the config directory
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let dir = home.join(constants::fs::CONFIG_DIR_NAME);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self::new(dir.join(constants::fs::PREFERENCES_FILE_NAME)))
    }

    fn read_map(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        let raw = serde_json::to_string_pretty(&map)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
