//! Key/value cache contract with invalidation dependencies.
//!
//! Values are stored as [`serde_json::Value`] so that any backend can hold
//! them; [`CacheExt`] adds typed access on top. An entry may carry a
//! [`Dependency`] that is evaluated when the entry is stored and checked on
//! every read: once it reports a change, the entry reads as missing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Longest key kept verbatim by [`build_key`].
const MAX_PLAIN_KEY_LEN: usize = 32;

/// Writes between two sweeps of expired entries in [`MemoryCache`].
const GC_INTERVAL: usize = 256;

/// Normalizes a key made of arbitrary serializable parts.
///
/// Short alphanumeric string keys are kept as they are; anything else is
/// JSON-encoded and hashed to its 32 hex character MD5 digest.
#[must_use]
pub fn build_key<K: Serialize + ?Sized>(key: &K) -> String {
    let encoded = match serde_json::to_value(key) {
        Ok(Value::String(s))
            if s.len() <= MAX_PLAIN_KEY_LEN && s.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            return s;
        }
        Ok(value) => value.to_string(),
        Err(err) => {
            warn!(%err, "Cache key is not serializable, hashing its error text");
            err.to_string()
        }
    };
    format!("{:x}", md5::compute(encoded.as_bytes()))
}

/// A condition a cache entry depends on.
pub trait Dependency: Send + Sync {
    /// Captures the current state. Called once, when the entry is stored.
    fn evaluate(&mut self, cache: &dyn Cache);

    /// Returns true when the captured state no longer holds.
    fn is_changed(&self, cache: &dyn Cache) -> bool;
}

/// A key/value store with optional expiry and dependencies.
pub trait Cache: Send + Sync {
    /// Returns the stored value, or `None` when missing, expired or
    /// invalidated by its dependency.
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Stores a value, replacing any previous one.
    ///
    /// A `ttl` of `None` or zero never expires.
    fn set_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> bool;

    /// Stores a value only if the key holds no valid entry.
    fn add_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> bool {
        if self.has(key) {
            return false;
        }
        self.set_value(key, value, ttl, dependency)
    }

    fn has(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    /// Removes an entry; returns false when there was none.
    fn delete(&self, key: &str) -> bool;

    /// Removes every entry.
    fn flush(&self);
}

/// Typed access over any [`Cache`].
pub trait CacheExt: Cache {
    /// Returns the value decoded as `T`; undecodable values read as missing.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Stores a serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when `value` cannot be encoded.
    fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> serde_json::Result<bool> {
        Ok(self.set_value(key, serde_json::to_value(value)?, ttl, dependency))
    }

    /// Returns the cached value, or produces, stores and returns it.
    ///
    /// When another writer stores the key first, its value wins.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when the produced value cannot be
    /// encoded.
    fn get_or_set<T, F>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> serde_json::Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = producer();
        if !self.add_value(key, serde_json::to_value(&value)?, ttl, dependency) {
            if let Some(stored) = self.get(key) {
                return Ok(stored);
            }
        }
        Ok(value)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    dependency: Option<Arc<dyn Dependency>>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local cache.
///
/// Expired entries are dropped when read and swept every few hundred
/// writes; [`MemoryCache::gc`] sweeps on demand.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .finish()
    }
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn gc(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
        only_if_absent: bool,
    ) -> bool {
        // Dependencies may read the cache, so they run before locking.
        let dependency: Option<Arc<dyn Dependency>> = dependency.map(|mut d| {
            d.evaluate(self);
            Arc::from(d)
        });
        let now = Instant::now();
        let mut entries = self.lock();
        if only_if_absent {
            let held = match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => match &entry.dependency {
                    None => return false,
                    Some(current) => Some(Arc::clone(current)),
                },
                _ => None,
            };
            if let Some(current) = held {
                // The check reads the cache, so it runs unlocked; the entry
                // must still be the one checked when the lock is retaken.
                drop(entries);
                if !current.is_changed(self) {
                    return false;
                }
                entries = self.lock();
                let replaced = entries.get(key).is_some_and(|entry| {
                    !entry
                        .dependency
                        .as_ref()
                        .is_some_and(|d| Arc::ptr_eq(d, &current))
                });
                if replaced {
                    return false;
                }
            }
        }
        let expires_at = ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| now + ttl);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                dependency,
            },
        );
        if self.writes.fetch_add(1, Ordering::Relaxed) % GC_INTERVAL == GC_INTERVAL - 1 {
            entries.retain(|_, entry| !entry.is_expired(now));
        }
        true
    }
}

impl Cache for MemoryCache {
    fn get_value(&self, key: &str) -> Option<Value> {
        let (value, dependency) = {
            let mut entries = self.lock();
            let entry = entries.get(key)?;
            if entry.is_expired(Instant::now()) {
                entries.remove(key);
                return None;
            }
            (entry.value.clone(), entry.dependency.clone())
        };
        if let Some(dependency) = dependency {
            if dependency.is_changed(self) {
                self.lock().remove(key);
                return None;
            }
        }
        Some(value)
    }

    fn set_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> bool {
        self.store(key, value, ttl, dependency, false)
    }

    fn add_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        dependency: Option<Box<dyn Dependency>>,
    ) -> bool {
        self.store(key, value, ttl, dependency, true)
    }

    fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    fn flush(&self) {
        self.lock().clear();
    }
}

fn tag_key(tag: &str) -> String {
    build_key(&["__tag__", tag])
}

fn tag_version(cache: &dyn Cache, tag: &str) -> Option<i64> {
    cache.get_value(&tag_key(tag)).and_then(|v| v.as_i64())
}

/// Invalidates every entry stored with a [`TagDependency`] on any of `tags`.
pub fn invalidate_tags<S: AsRef<str>>(cache: &dyn Cache, tags: &[S]) {
    for tag in tags {
        let tag = tag.as_ref();
        let next = tag_version(cache, tag).map_or(1, |v| v + 1);
        cache.set_value(&tag_key(tag), Value::from(next), None, None);
    }
}

/// Depends on a set of tags; invalidated by [`invalidate_tags`].
#[derive(Debug, Clone, Default)]
pub struct TagDependency {
    tags: Vec<String>,
    versions: Vec<i64>,
}

impl TagDependency {
    #[must_use]
    pub fn new<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            versions: Vec::new(),
        }
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Dependency for TagDependency {
    fn evaluate(&mut self, cache: &dyn Cache) {
        self.versions = self
            .tags
            .iter()
            .map(|tag| {
                tag_version(cache, tag).unwrap_or_else(|| {
                    cache.set_value(&tag_key(tag), Value::from(0), None, None);
                    0
                })
            })
            .collect();
    }

    fn is_changed(&self, cache: &dyn Cache) -> bool {
        self.tags
            .iter()
            .zip(&self.versions)
            .any(|(tag, version)| tag_version(cache, tag) != Some(*version))
    }
}

/// Depends on the result of a closure.
pub struct CallbackDependency {
    callback: Box<dyn Fn() -> Value + Send + Sync>,
    data: Option<Value>,
}

impl CallbackDependency {
    #[must_use]
    pub fn new(callback: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            data: None,
        }
    }
}

impl Dependency for CallbackDependency {
    fn evaluate(&mut self, _cache: &dyn Cache) {
        self.data = Some((self.callback)());
    }

    fn is_changed(&self, _cache: &dyn Cache) -> bool {
        self.data.as_ref() != Some(&(self.callback)())
    }
}

/// Combines several dependencies.
///
/// With `depend_on_all`, any changed dependency invalidates the entry;
/// otherwise all of them must have changed.
pub struct ChainedDependency {
    dependencies: Vec<Box<dyn Dependency>>,
    depend_on_all: bool,
}

impl ChainedDependency {
    #[must_use]
    pub fn new(dependencies: Vec<Box<dyn Dependency>>, depend_on_all: bool) -> Self {
        Self {
            dependencies,
            depend_on_all,
        }
    }
}

impl Dependency for ChainedDependency {
    fn evaluate(&mut self, cache: &dyn Cache) {
        for dependency in &mut self.dependencies {
            dependency.evaluate(cache);
        }
    }

    fn is_changed(&self, cache: &dyn Cache) -> bool {
        if self.dependencies.is_empty() {
            return false;
        }
        if self.depend_on_all {
            self.dependencies.iter().any(|d| d.is_changed(cache))
        } else {
            self.dependencies.iter().all(|d| d.is_changed(cache))
        }
    }
}
