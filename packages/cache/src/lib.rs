#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Content-addressed cache for expensive pure computations.
//!
//! Keys are SHA-256 digests of the serialized input values, so repeated
//! calls with identical inputs are free. Entries are never invalidated
//! automatically; [`Cache::clear`] is the explicit, separate operation.
//! The in-memory backend serves tests, the disk backend serves
//! production runs.

use std::collections::HashMap;
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cache storage failure. Lookup failures are not errors; a miss simply
/// recomputes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend read/write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage backend for cache entries.
pub trait CacheBackend: Send + Sync {
    /// Fetches the bytes stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Removes all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Volatile in-memory backend.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
        Ok(())
    }
}

/// Disk-backed backend storing one file per entry.
pub struct DiskBackend {
    dir: PathBuf,
}

impl DiskBackend {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheBackend for DiskBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a partial entry.
        let tmp = self.entry_path(key).with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.entry_path(key))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        if self.dir.is_dir() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

/// Content-addressed computation cache.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
}

impl Cache {
    /// In-memory cache for tests and short-lived runs.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::default()),
        }
    }

    /// Disk-backed cache rooted at `dir`.
    #[must_use]
    pub fn disk(dir: PathBuf) -> Self {
        Self {
            backend: Box::new(DiskBackend::new(dir)),
        }
    }

    /// Derives the cache key for a namespace and serializable input.
    ///
    /// # Panics
    ///
    /// Panics if the key input cannot be serialized, which only happens
    /// for non-string map keys and similar type-level mistakes.
    #[must_use]
    pub fn key<K: Serialize>(namespace: &str, input: &K) -> String {
        let bytes = serde_json::to_vec(input).expect("cache key input must serialize");
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0]);
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Returns the cached value for `input`, or runs `compute`, stores
    /// the result and returns it.
    ///
    /// A hit that fails to deserialize (e.g. after a schema change) is
    /// treated as a miss. Store failures are logged, never propagated;
    /// the computation result always wins.
    ///
    /// # Errors
    ///
    /// Returns whatever error `compute` produces.
    pub fn get_or_compute<K, V, E, F>(&self, namespace: &str, input: &K, compute: F) -> Result<V, E>
    where
        K: Serialize,
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, E>,
    {
        let key = Self::key(namespace, input);
        if let Some(bytes) = self.backend.get(&key) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    log::debug!("cache hit: {namespace}/{key}");
                    return Ok(value);
                }
                Err(e) => log::debug!("cache entry unreadable, recomputing {namespace}: {e}"),
            }
        }

        let value = compute()?;
        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.backend.put(&key, &bytes) {
                    log::warn!("failed to store cache entry {namespace}/{key}: {e}");
                }
            }
            Err(e) => log::warn!("failed to serialize cache entry {namespace}/{key}: {e}"),
        }
        Ok(value)
    }

    /// Drops every cached entry. Never happens implicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear()
    }
}

/// Streaming SHA-256 digest of a file, for content-addressing large
/// inputs without loading them into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_call_with_same_input_skips_compute() {
        let cache = Cache::memory();
        let calls = AtomicUsize::new(0);

        let compute = || -> Result<Vec<u64>, std::io::Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        };

        let first = cache
            .get_or_compute("test", &("a", 1_u64), compute)
            .unwrap();
        let second = cache
            .get_or_compute("test", &("a", 1_u64), || -> Result<Vec<u64>, std::io::Error> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9])
            })
            .unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_inputs_get_different_entries() {
        let cache = Cache::memory();
        let a: u64 = cache
            .get_or_compute("ns", &1_u64, || Ok::<_, std::io::Error>(10))
            .unwrap();
        let b: u64 = cache
            .get_or_compute("ns", &2_u64, || Ok::<_, std::io::Error>(20))
            .unwrap();
        assert_eq!((a, b), (10, 20));
    }

    #[test]
    fn disk_backend_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::disk(dir.path().join("cache"));

        let v: String = cache
            .get_or_compute("ns", &"k", || Ok::<_, std::io::Error>("value".to_string()))
            .unwrap();
        assert_eq!(v, "value");

        // Hit from a fresh cache over the same directory.
        let cache2 = Cache::disk(dir.path().join("cache"));
        let v2: String = cache2
            .get_or_compute("ns", &"k", || Ok::<_, std::io::Error>("other".to_string()))
            .unwrap();
        assert_eq!(v2, "value");

        cache2.clear().unwrap();
        let v3: String = cache2
            .get_or_compute("ns", &"k", || Ok::<_, std::io::Error>("other".to_string()))
            .unwrap();
        assert_eq!(v3, "other");
    }

    #[test]
    fn file_digest_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "lon,lat\n1,2\n").unwrap();
        let a = file_digest(&path).unwrap();
        let b = file_digest(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
