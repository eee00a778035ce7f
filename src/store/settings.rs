//! File-backed keyed settings store.
//!
//! Holds the per-mode upload policies and the credential signing secret.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub struct SettingStore {
    inner: DashMap<String, Value>,
    persistence_path: Option<PathBuf>,
}

impl SettingStore {
    /// Create an empty, unpersisted store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: DashMap::new(),
            persistence_path,
        }
    }

    /// Open a store, loading previously persisted values if the file exists.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            let map: HashMap<String, Value> = serde_json::from_reader(reader)?;
            for (key, value) in map {
                store.inner.insert(key, value);
            }
            tracing::info!(count = store.inner.len(), path = ?path, "Loaded settings");
        }
        Ok(store)
    }

    /// Read a value. Missing or undecodable values read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.get(key)?.value().clone();
        serde_json::from_value(value).ok()
    }

    /// Write a value and persist the store.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner.insert(key.to_string(), value);
        self.save()
    }

    /// Seed a default for `key` unless one is already stored.
    pub fn ensure_default<T: Serialize>(&self, key: &str, default: T) -> std::io::Result<()> {
        if self.inner.contains_key(key) {
            return Ok(());
        }
        tracing::info!(key = %key, "Seeding default setting");
        self.put(key, &default)
    }

    fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let map: HashMap<String, Value> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        serde_json::to_writer_pretty(writer, &map)?;
        Ok(())
    }
}
