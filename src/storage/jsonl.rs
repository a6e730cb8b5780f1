//! JSONL-based storage implementation with in-memory caching.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{Result, VisitrackError};

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn lock_err(e: impl std::fmt::Display) -> VisitrackError {
    VisitrackError::Storage(e.to_string())
}

fn not_loaded(collection: &str) -> VisitrackError {
    VisitrackError::Storage(format!("Collection not loaded: {}", collection))
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(lock_err)?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(lock_err)?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let records = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut records = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    let record: serde_json::Value = serde_json::from_str(&line)?;
                    records.push(record);
                }
            }
            records
        } else {
            Vec::new()
        };

        log::debug!("Loaded {} records from {}", records.len(), path.display());
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Rewrite the entire collection file from the given records.
    ///
    /// Writes to a sibling temp file and renames it over the original so a crash
    /// mid-write never leaves a truncated collection.
    fn rewrite_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp_path = self.base_path.join(format!("{}.jsonl.tmp", collection));
        {
            let mut file = File::create(&tmp_path)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache.get_mut(collection).ok_or_else(|| not_loaded(collection))?;

        if records.iter().any(|r| record_id(r) == Some(record.id())) {
            return Err(VisitrackError::Storage(format!(
                "Duplicate id in {}: {}",
                collection,
                record.id()
            )));
        }

        // Append to file first (source of truth)
        self.append_to_file(collection, &value)?;
        records.push(value);

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache.get(collection).ok_or_else(|| not_loaded(collection))?;

        for record in records {
            if record_id(record) == Some(id) {
                let parsed: T = serde_json::from_value(record.clone())?;
                return Ok(Some(parsed));
            }
        }

        Ok(None)
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache.get_mut(collection).ok_or_else(|| not_loaded(collection))?;

        let slot = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| VisitrackError::Storage(format!("Record not found in {}: {}", collection, id)))?;

        let mut updated = records.clone();
        updated[slot] = value;
        self.rewrite_file(collection, &updated)?;
        *records = updated;

        Ok(())
    }

    fn update_where<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache.get_mut(collection).ok_or_else(|| not_loaded(collection))?;

        let mut updated = records.clone();
        let mut touched = Vec::new();
        for record in updated.iter_mut() {
            if !filters.iter().all(|f| f.matches(record)) {
                continue;
            }
            if let Some(fields) = record.as_object_mut() {
                for (key, value) in patch {
                    fields.insert(key.clone(), value.clone());
                }
            }
            touched.push(record.clone());
        }

        if touched.is_empty() {
            return Ok(Vec::new());
        }

        // Persist before publishing to the cache so a failed write changes nothing
        self.rewrite_file(collection, &updated)?;
        *records = updated;

        touched
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(VisitrackError::from))
            .collect()
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_loaded(collection)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        let records = cache.get_mut(collection).ok_or_else(|| not_loaded(collection))?;

        let original_len = records.len();
        let remaining: Vec<serde_json::Value> = records
            .iter()
            .filter(|r| record_id(r) != Some(id))
            .cloned()
            .collect();

        if remaining.len() == original_len {
            return Err(VisitrackError::Storage(format!("Record not found in {}: {}", collection, id)));
        }

        self.rewrite_file(collection, &remaining)?;
        *records = remaining;

        Ok(())
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache.get(collection).ok_or_else(|| not_loaded(collection))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                let parsed: T = serde_json::from_value(record.clone())?;
                results.push(parsed);
            }
        }

        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }
}
