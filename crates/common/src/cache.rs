// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Cache utilities.
//!
//! A small filesystem-backed JSON cache used for build artifacts. Entries are
//! stored as one `<label>.json` file per label, optionally wrapped with an
//! expiry timestamp. Corrupted or expired entries are removed on load.

use std::{fs, marker::PhantomData, path::PathBuf, time::Duration};

use eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheWrapper<T> {
    pub data: T,
    pub expires_at: u64,
}

impl<T> CacheWrapper<T> {
    pub fn new(data: T, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl
                .map(|ttl| ttl.as_secs().saturating_add(chrono::Utc::now().timestamp() as u64))
                .unwrap_or(u64::MAX),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < chrono::Utc::now().timestamp() as u64
    }
}

/// Trait for cache.
pub trait Cache {
    /// The type of the data to be cached.
    type Data: Serialize + DeserializeOwned;

    /// Loads the cache for the given label.
    fn load_cache(&self, label: impl Into<String>) -> Option<Self::Data>;

    /// Saves the cache for the given label.
    fn save_cache(&self, label: impl Into<String>, data: &Self::Data) -> Result<()>;
}

/// A cache manager that stores data in the file system.
///  - `T` is the type of the data to be cached.
///  - `cache_dir` is the directory where the cache files are stored.
///  - `cache_ttl` is the time-to-live of the cache files. If it is `None`, the cache files will
///    never expire.
#[derive(Debug, Clone)]
pub struct FsCache<T> {
    cache_dir: PathBuf,
    cache_ttl: Option<Duration>,
    phantom: PhantomData<T>,
}

impl<T> FsCache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// New cache rooted at `cache_dir`. The directory is created if missing.
    pub fn new(cache_dir: impl Into<PathBuf>, cache_ttl: Option<Duration>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, cache_ttl, phantom: PhantomData })
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Returns the cache TTL.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Removes all cache entry files under the cache directory. Subdirectories
    /// and non-entry files are left alone.
    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to cleanup {:?}: {err}", path);
                }
            }
        }
        Ok(())
    }
}

impl<T> Cache for FsCache<T>
where
    T: Serialize + DeserializeOwned,
{
    type Data = T;

    fn load_cache(&self, label: impl Into<String>) -> Option<T> {
        let cache_file = self.cache_dir.join(format!("{}.json", label.into()));
        trace!("loading cache: {:?}", cache_file);
        if !cache_file.exists() {
            return None;
        }

        let content = fs::read_to_string(&cache_file).ok()?;
        let cache: CacheWrapper<_> = if let Ok(cache) = serde_json::from_str(&content) {
            cache
        } else {
            warn!("the cache file has been corrupted: {:?}", cache_file);
            let _ = fs::remove_file(&cache_file); // we do not care about the result
            return None;
        };

        if cache.is_expired() {
            trace!("the cache file has expired: {:?}", cache_file);
            let _ = fs::remove_file(&cache_file); // we do not care about the result
            None
        } else {
            trace!("hit the cache: {:?}", cache_file);
            Some(cache.data)
        }
    }

    fn save_cache(&self, label: impl Into<String>, data: &T) -> Result<()> {
        let cache_file = self.cache_dir.join(format!("{}.json", label.into()));
        trace!("saving cache: {:?}", cache_file);

        let cache = CacheWrapper::new(data, self.cache_ttl);
        let content = serde_json::to_string(&cache)?;
        fs::write(&cache_file, content)?;
        Ok(())
    }
}

impl<T> Cache for Option<FsCache<T>>
where
    T: Serialize + DeserializeOwned,
{
    type Data = T;

    fn load_cache(&self, label: impl Into<String>) -> Option<T> {
        self.as_ref()?.load_cache(label)
    }

    fn save_cache(&self, label: impl Into<String>, data: &T) -> Result<()> {
        if let Some(cache) = self {
            cache.save_cache(label, data)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        value: String,
        number: u32,
    }

    #[test]
    fn test_cache_wrapper_no_ttl() {
        let data = TestData { value: "test".to_string(), number: 42 };
        let wrapper = CacheWrapper::new(data.clone(), None);

        assert_eq!(wrapper.data, data);
        assert_eq!(wrapper.expires_at, u64::MAX);
        assert!(!wrapper.is_expired());
    }

    #[test]
    fn test_cache_wrapper_with_ttl() {
        let data = TestData { value: "test".to_string(), number: 42 };
        let ttl = Duration::from_secs(3600); // 1 hour
        let wrapper = CacheWrapper::new(data.clone(), Some(ttl));

        assert_eq!(wrapper.data, data);
        assert!(wrapper.expires_at > chrono::Utc::now().timestamp() as u64);
        assert!(!wrapper.is_expired());
    }

    #[test]
    fn test_fs_cache_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FsCache::<TestData>::new(temp_dir.path(), None).unwrap();

        let test_data = TestData { value: "hello".to_string(), number: 123 };
        let label = "test_label";

        // Save data
        cache.save_cache(label, &test_data).unwrap();

        // Load data
        let loaded_data = cache.load_cache(label);
        assert!(loaded_data.is_some());
        assert_eq!(loaded_data.unwrap(), test_data);
    }

    #[test]
    fn test_fs_cache_load_nonexistent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FsCache::<TestData>::new(temp_dir.path(), None).unwrap();

        let loaded_data = cache.load_cache("nonexistent");
        assert!(loaded_data.is_none());
    }

    #[test]
    fn test_fs_cache_expired_data() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_millis(10);
        let cache = FsCache::<TestData>::new(temp_dir.path(), Some(ttl)).unwrap();

        let test_data = TestData { value: "expire_me".to_string(), number: 999 };
        let label = "expire_test";

        // Save data
        cache.save_cache(label, &test_data).unwrap();

        // Wait for expiration
        std::thread::sleep(Duration::from_millis(2000));

        // Try to load expired data
        let loaded_data = cache.load_cache(label);
        assert!(loaded_data.is_none());

        // Cache file should be removed
        let cache_file = temp_dir.path().join(format!("{label}.json"));
        assert!(!cache_file.exists());
    }

    #[test]
    fn test_fs_cache_corrupted_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FsCache::<TestData>::new(temp_dir.path(), None).unwrap();

        let label = "corrupted";
        let cache_file = temp_dir.path().join(format!("{label}.json"));

        // Write corrupted data
        fs::write(&cache_file, "invalid json").unwrap();

        // Try to load corrupted data
        let loaded_data = cache.load_cache(label);
        assert!(loaded_data.is_none());

        // Corrupted file should be removed
        assert!(!cache_file.exists());
    }

    #[test]
    fn test_fs_cache_clear() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FsCache::<TestData>::new(temp_dir.path(), None).unwrap();

        for i in 0..5 {
            let data = TestData { value: format!("item_{i}"), number: i as u32 };
            cache.save_cache(format!("item_{i}"), &data).unwrap();
        }

        cache.clear().unwrap();

        for i in 0..5 {
            assert!(cache.load_cache(format!("item_{i}")).is_none());
        }
    }

    #[test]
    fn test_fs_cache_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FsCache::<TestData>::new(temp_dir.path(), None).unwrap();

        let label = "overwrite_test";

        // Save initial data
        let data1 = TestData { value: "original".to_string(), number: 1 };
        cache.save_cache(label, &data1).unwrap();

        // Overwrite with new data
        let data2 = TestData { value: "updated".to_string(), number: 2 };
        cache.save_cache(label, &data2).unwrap();

        // Load should return the updated data
        let loaded = cache.load_cache(label);
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap(), data2);
    }

    #[test]
    fn test_option_cache_none() {
        let cache: Option<FsCache<TestData>> = None;
        let test_data = TestData { value: "none".to_string(), number: 789 };

        // Save should succeed but do nothing
        let result = cache.save_cache("none_test", &test_data);
        assert!(result.is_ok());

        // Load should return None
        let loaded_data = cache.load_cache("none_test");
        assert!(loaded_data.is_none());
    }
}
