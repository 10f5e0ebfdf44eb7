//! Page cache backends: shared store interface plus the in-memory
//! implementation used on the hot read path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::page::{Page, PageReader};

/// Fixed bookkeeping cost charged per entry on top of the page buffer.
const ENTRY_OVERHEAD: i64 = 4096;

/// Page cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total budget for cached pages in MiB; 0 disables caching entirely.
    pub cache_size_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self { cache_size_mb: 1024 }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent; the caller falls back to fetching the chunk remotely.
    #[error("page not found in cache")]
    NotFound,
    /// Operation not implemented by this backend.
    #[error("not supported by this cache backend")]
    Unsupported,
}

/// Store for recently used chunk pages, shared behind `Arc<dyn CacheStore>`
/// by everything on the read/write path.
///
/// Backends also carry the upload-staging surface (`stage`, `uploaded`,
/// `scan_staging`) so the write path can address any backend through one
/// interface; only disk-backed stores implement staging.
pub trait CacheStore: Send + Sync {
    /// Insert `page` under `key`, taking one reference of its own.
    ///
    /// The caller keeps its own reference either way: if `key` is already
    /// present (or caching is disabled) the call is a no-op and the supplied
    /// page is not acquired, so the caller remains responsible for releasing
    /// it. Never fails; an insert that pushes usage over budget evicts
    /// synchronously before returning.
    fn cache(&self, key: &str, page: &Page);

    /// Reader over the cached page, refreshing its recency. The store keeps
    /// its own reference; the reader holds a transient one released on drop.
    fn load(&self, key: &str) -> Result<PageReader, CacheError>;

    /// Drop the entry if present. Used to invalidate a chunk on
    /// write/truncate/delete.
    fn remove(&self, key: &str);

    /// Point-in-time `(entry_count, used_bytes)` snapshot.
    fn stats(&self) -> (i64, i64);

    /// Write data to the staging area pending upload, returning the staged
    /// path.
    fn stage(&self, key: &str, data: &[u8], keep_cache: bool) -> Result<PathBuf, CacheError>;

    /// Notification that the staged object finished uploading.
    fn uploaded(&self, key: &str, size: usize);

    /// Staged objects left over from a previous run, keyed for re-upload.
    fn scan_staging(&self) -> HashMap<String, PathBuf>;
}

struct CacheItem {
    last_access: Instant,
    page: Page,
}

struct CacheTable {
    used: i64,
    entries: HashMap<String, CacheItem>,
}

impl CacheTable {
    fn remove_entry(&mut self, key: &str) {
        if let Some(item) = self.entries.remove(key) {
            self.used -= item.page.byte_capacity() as i64 + ENTRY_OVERHEAD;
            item.page.release();
        }
    }

    // Called with used > capacity. Walks the table in consecutive pairs,
    // evicting the less recently used entry of each pair, until usage drops
    // below capacity or the table is exhausted; at most one wrap per
    // invocation. The walk follows the map's seeded iteration order rotated
    // by a random start, keeping the pairing arbitrary across passes over an
    // unchanged table.
    fn evict(&mut self, capacity: i64) {
        let n = self.entries.len();
        if n == 0 {
            return;
        }
        let start = rand::rng().random_range(0..n);
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        let now = Instant::now();
        let mut visited = 0;
        let mut oldest: Option<(usize, Instant)> = None;
        for i in 0..n {
            let idx = (start + i) % n;
            let Some(item) = self.entries.get(&keys[idx]) else {
                continue;
            };
            match oldest {
                Some((_, at)) if at <= item.last_access => {}
                _ => oldest = Some((idx, item.last_access)),
            }
            visited += 1;
            if visited > 1 {
                let (victim, at) = oldest.take().unwrap();
                debug!(
                    "evict {} from cache, age: {:?}",
                    keys[victim],
                    now.duration_since(at)
                );
                self.remove_entry(&keys[victim]);
                visited = 0;
                if self.used < capacity {
                    break;
                }
            }
        }
    }
}

/// In-memory [`CacheStore`]. Holds one page reference per entry, accounts
/// `byte_capacity() + 4096` bytes each against a fixed budget, and evicts
/// inline from the inserting call; there is no background thread. Staging
/// is not supported by this backend.
pub struct InMemoryCacheStore {
    capacity: i64,
    table: Mutex<CacheTable>,
}

impl InMemoryCacheStore {
    pub fn new(config: &Config) -> Self {
        Self::with_capacity((config.cache_size_mb as i64) << 20)
    }

    /// Capacity in bytes; 0 disables caching.
    pub fn with_capacity(capacity: i64) -> Self {
        InMemoryCacheStore {
            capacity,
            table: Mutex::new(CacheTable {
                used: 0,
                entries: HashMap::new(),
            }),
        }
    }

    #[cfg(test)]
    fn last_access(&self, key: &str) -> Option<Instant> {
        let table = self.table.lock().unwrap();
        table.entries.get(key).map(|item| item.last_access)
    }
}

impl CacheStore for InMemoryCacheStore {
    fn cache(&self, key: &str, page: &Page) {
        if self.capacity == 0 {
            return;
        }
        let mut table = self.table.lock().unwrap();
        if table.entries.contains_key(key) {
            return;
        }
        page.acquire();
        let size = page.byte_capacity() as i64;
        table.entries.insert(
            key.to_string(),
            CacheItem {
                last_access: Instant::now(),
                page: page.clone(),
            },
        );
        table.used += size + ENTRY_OVERHEAD;
        if table.used > self.capacity {
            table.evict(self.capacity);
        }
    }

    fn load(&self, key: &str) -> Result<PageReader, CacheError> {
        let mut table = self.table.lock().unwrap();
        match table.entries.get_mut(key) {
            Some(item) => {
                item.last_access = Instant::now();
                Ok(PageReader::new(&item.page))
            }
            None => Err(CacheError::NotFound),
        }
    }

    fn remove(&self, key: &str) {
        let mut table = self.table.lock().unwrap();
        if table.entries.contains_key(key) {
            table.remove_entry(key);
            debug!("remove {key} from cache");
        }
    }

    fn stats(&self) -> (i64, i64) {
        let table = self.table.lock().unwrap();
        (table.entries.len() as i64, table.used)
    }

    fn stage(&self, _key: &str, _data: &[u8], _keep_cache: bool) -> Result<PathBuf, CacheError> {
        Err(CacheError::Unsupported)
    }

    fn uploaded(&self, _key: &str, _size: usize) {}

    fn scan_staging(&self) -> HashMap<String, PathBuf> {
        HashMap::new()
    }
}
