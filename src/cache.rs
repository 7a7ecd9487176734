//! File-based response cache for network enrichers.
//!
//! Entries are JSON files named after their key and expire after a TTL,
//! measured from the file's modification time. The default location is
//! [`platform::cache_dir`](crate::platform::cache_dir).
//!
//! # Example
//!
//! ```no_run
//! use invscan::Cache;
//!
//! let cache = Cache::new();
//! cache.set("osv_npm_lodash_4.17.20", &vec!["GHSA-35jh-r3h4-6jhm"]).unwrap();
//!
//! let ids: Option<Vec<String>> = cache.get("osv_npm_lodash_4.17.20");
//! ```

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::trace;

use crate::platform::cache_dir;

/// Default cache TTL in hours.
const CACHE_TTL_HOURS: u64 = 24;

#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    /// Cache in the platform cache directory with the default 24-hour TTL.
    pub fn new() -> Self {
        Self::with_ttl_hours(CACHE_TTL_HOURS)
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::with_dir(cache_dir(), Duration::from_secs(hours * 3600))
    }

    /// Cache rooted at `dir`.
    pub fn with_dir(dir: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Converts a cache key to a safe filename.
    fn cache_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe_key))
    }

    fn is_expired(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.ttl)
    }

    /// Returns the cached value, or `None` if it's missing, expired or
    /// unreadable. Expired entries are removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.cache_path(key);
        if !path.exists() {
            return None;
        }

        if self.is_expired(&path) {
            trace!(key, "Cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }

        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                trace!(key, error = %err, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;
        let content = serde_json::to_string(value)?;
        fs::write(self.cache_path(key), content)?;
        Ok(())
    }

    /// Removes every cached entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_dir(tmp.path().join("nested"), Duration::from_secs(60));

        cache.set("osv_npm_@scope/pkg_1.0.0", &vec![1, 2, 3]).unwrap();
        assert_eq!(cache.get::<Vec<i32>>("osv_npm_@scope/pkg_1.0.0"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("missing"), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_dir(tmp.path(), Duration::ZERO);

        cache.set("key", &"value").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get::<String>("key"), None);
        assert!(!tmp.path().join("key.json").exists());
    }

    #[test]
    fn test_corrupt_entry_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_dir(tmp.path(), Duration::from_secs(60));
        fs::write(tmp.path().join("key.json"), "{not json").unwrap();
        assert_eq!(cache.get::<String>("key"), None);
    }

    #[test]
    fn test_clear() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_dir(tmp.path(), Duration::from_secs(60));
        cache.set("a", &1).unwrap();
        cache.set("b", &2).unwrap();
        fs::write(tmp.path().join("keep.txt"), "not a cache entry").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(tmp.path().join("keep.txt").exists());
        assert_eq!(cache.get::<i32>("a"), None);
    }
}
