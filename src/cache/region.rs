use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use crate::core::{Identifier, OrmError, Result, Value};
use super::{CacheEntry, CacheKey};

const DEFAULT_REGION_CAPACITY: usize = 10_000;
const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    ReadOnly,
    #[default]
    ReadWrite,
    NonstrictReadWrite,
    Transactional,
}

/// Handle returned by `lock_item`; required to release the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftLock(u64);

/// Access contract of an entity cache region. Implementations are shared
/// across sessions and must be thread-safe.
pub trait EntityDataAccess: fmt::Debug + Send + Sync {
    fn region_name(&self) -> &str;

    fn access_type(&self) -> AccessType;

    fn generate_cache_key(
        &self,
        identifier: &Identifier,
        root_entity: &str,
        tenant: Option<&str>,
    ) -> CacheKey {
        CacheKey {
            root_entity: root_entity.to_string(),
            identifier: identifier.clone(),
            tenant: tenant.map(str::to_string),
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Put an entry read from the database. Returns whether the entry was stored.
    fn put_from_load(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        version: Option<&Value>,
        minimal_put: bool,
    ) -> Result<bool>;

    /// Overwrite an entry after a change made in the current transaction.
    fn update(&self, key: CacheKey, entry: CacheEntry, version: Option<&Value>) -> Result<bool>;

    /// Soft-lock `key` against puts. Fails while another live lock holds it.
    fn lock_item(&self, key: &CacheKey) -> Result<SoftLock>;

    fn unlock_item(&self, key: &CacheKey, lock: SoftLock) -> Result<()>;

    fn evict(&self, key: &CacheKey) -> Result<()>;

    fn contains(&self, key: &CacheKey) -> bool;
}

/// Builds cache regions for cached hierarchies during model resolution.
pub trait RegionFactory: fmt::Debug {
    fn build_entity_access(&self, region_name: &str, access: AccessType) -> Result<Arc<dyn EntityDataAccess>>;
}

#[derive(Debug, Clone)]
enum CacheItem {
    Entry {
        entry: CacheEntry,
        version: Option<Value>,
    },
    Locked {
        lock: SoftLock,
        expires_at: DateTime<Utc>,
    },
}

impl CacheItem {
    /// A soft lock that outlived its timeout no longer protects the key.
    fn is_live_lock(&self) -> bool {
        matches!(self, Self::Locked { expires_at, .. } if *expires_at > Utc::now())
    }
}

#[derive(Debug)]
struct RegionState {
    items: LruCache<CacheKey, CacheItem>,
    next_lock: u64,
}

/// In-memory entity region bounded by an LRU policy.
pub struct InMemoryEntityRegion {
    name: String,
    access: AccessType,
    lock_timeout: Duration,
    state: Mutex<RegionState>,
}

impl InMemoryEntityRegion {
    pub fn new(name: &str, access: AccessType, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.to_string(),
            access,
            lock_timeout: Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS),
            state: Mutex::new(RegionState {
                items: LruCache::new(capacity),
                next_lock: 1,
            }),
        }
    }

    /// Set how long a soft lock keeps puts away from its key
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_locked(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .map(|s| s.items.peek(key).is_some_and(CacheItem::is_live_lock))
            .unwrap_or(false)
    }
}

impl fmt::Debug for InMemoryEntityRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEntityRegion")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("len", &self.len())
            .finish()
    }
}

impl EntityDataAccess for InMemoryEntityRegion {
    fn region_name(&self) -> &str {
        &self.name
    }

    fn access_type(&self) -> AccessType {
        self.access
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut state = self.state.lock()?;
        Ok(match state.items.get(key) {
            Some(CacheItem::Entry { entry, .. }) => Some(entry.clone()),
            _ => None,
        })
    }

    fn put_from_load(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        version: Option<&Value>,
        minimal_put: bool,
    ) -> Result<bool> {
        let mut state = self.state.lock()?;
        match state.items.peek(&key) {
            Some(item) if item.is_live_lock() => {
                trace!("Region '{}': {} is locked, skipping put", self.name, key);
                return Ok(false);
            }
            Some(CacheItem::Entry { .. }) if minimal_put => {
                trace!("Region '{}': {} already cached, minimal put", self.name, key);
                return Ok(false);
            }
            Some(CacheItem::Entry { version: Some(cached), .. }) => {
                if let Some(incoming) = version
                    && incoming < cached
                {
                    trace!("Region '{}': {} has a newer cached version", self.name, key);
                    return Ok(false);
                }
            }
            _ => {}
        }

        debug!("Region '{}': caching {}", self.name, key);
        state.items.put(
            key,
            CacheItem::Entry {
                entry,
                version: version.cloned(),
            },
        );
        Ok(true)
    }

    fn update(&self, key: CacheKey, entry: CacheEntry, version: Option<&Value>) -> Result<bool> {
        if self.access == AccessType::ReadOnly {
            return Err(OrmError::UnsupportedOperation(format!(
                "Region '{}' is read-only; cannot update {}",
                self.name, key
            )));
        }
        let mut state = self.state.lock()?;
        if state.items.peek(&key).is_some_and(CacheItem::is_live_lock) {
            return Ok(false);
        }
        debug!("Region '{}': updating {}", self.name, key);
        state.items.put(
            key,
            CacheItem::Entry {
                entry,
                version: version.cloned(),
            },
        );
        Ok(true)
    }

    fn lock_item(&self, key: &CacheKey) -> Result<SoftLock> {
        let mut state = self.state.lock()?;
        if state.items.peek(key).is_some_and(CacheItem::is_live_lock) {
            return Err(OrmError::CacheError(format!(
                "Region '{}': {} is already soft-locked",
                self.name, key
            )));
        }
        let lock = SoftLock(state.next_lock);
        state.next_lock += 1;
        let expires_at = Utc::now() + self.lock_timeout;
        state.items.put(key.clone(), CacheItem::Locked { lock, expires_at });
        Ok(lock)
    }

    fn unlock_item(&self, key: &CacheKey, lock: SoftLock) -> Result<()> {
        let mut state = self.state.lock()?;
        match state.items.peek(key) {
            Some(CacheItem::Locked { lock: held, .. }) if *held == lock => {
                state.items.pop(key);
                Ok(())
            }
            Some(CacheItem::Locked { .. }) => Err(OrmError::CacheError(format!(
                "Soft lock on {} is held by another owner",
                key
            ))),
            _ => Ok(()),
        }
    }

    fn evict(&self, key: &CacheKey) -> Result<()> {
        self.state.lock()?.items.pop(key);
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .map(|s| matches!(s.items.peek(key), Some(CacheItem::Entry { .. })))
            .unwrap_or(false)
    }
}

/// Region factory keeping one in-memory region per region name.
#[derive(Debug)]
pub struct InMemoryRegionFactory {
    capacity: usize,
    regions: Mutex<HashMap<String, Arc<InMemoryEntityRegion>>>,
}

impl InMemoryRegionFactory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            regions: Mutex::new(HashMap::new()),
        }
    }

    pub fn region(&self, name: &str) -> Option<Arc<InMemoryEntityRegion>> {
        self.regions.lock().ok()?.get(name).cloned()
    }
}

impl Default for InMemoryRegionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_CAPACITY)
    }
}

impl RegionFactory for InMemoryRegionFactory {
    fn build_entity_access(&self, region_name: &str, access: AccessType) -> Result<Arc<dyn EntityDataAccess>> {
        let mut regions = self.regions.lock()?;
        let region = regions
            .entry(region_name.to_string())
            .or_insert_with(|| Arc::new(InMemoryEntityRegion::new(region_name, access, self.capacity)))
            .clone();
        Ok(region)
    }
}
