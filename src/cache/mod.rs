//! Second-level cache access contract and an in-memory region.

pub mod entry;
pub mod region;

use serde::{Deserialize, Serialize};

pub use entry::{CacheEntry, CacheKey, CachedValue};
pub use region::{
    AccessType, EntityDataAccess, InMemoryEntityRegion, InMemoryRegionFactory, RegionFactory, SoftLock,
};

/// How a session interacts with the second-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    #[default]
    Normal,
    /// Read from the cache, never write.
    Get,
    /// Write to the cache, never read.
    Put,
    Ignore,
    /// Write to the cache, bypassing minimal puts.
    Refresh,
}

impl CacheMode {
    pub fn is_get_enabled(self) -> bool {
        matches!(self, Self::Normal | Self::Get)
    }

    pub fn is_put_enabled(self) -> bool {
        matches!(self, Self::Normal | Self::Put | Self::Refresh)
    }
}
