use serde::{Deserialize, Serialize};
use crate::cache::CacheMode;

/// Settings applied while building the runtime model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Batch size for entities and collections that do not declare one
    pub default_batch_size: usize,

    /// Maximum depth of eager join fetches; deeper eager associations are delayed
    pub max_fetch_depth: usize,

    /// Store cache entries as attribute-name maps instead of positional arrays
    pub use_structured_cache_entries: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 1,
            max_fetch_depth: 3,
            use_structured_cache_entries: false,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default batch size
    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size.max(1);
        self
    }

    /// Set the maximum join fetch depth
    pub fn max_fetch_depth(mut self, depth: usize) -> Self {
        self.max_fetch_depth = depth;
        self
    }

    /// Enable structured cache entries
    pub fn structured_cache_entries(mut self, enabled: bool) -> Self {
        self.use_structured_cache_entries = enabled;
        self
    }
}

/// Per-session load options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Entities loaded by the session are read-only unless the query says otherwise
    pub default_read_only: bool,

    pub cache_mode: CacheMode,

    /// Skip cache puts for entries already present
    pub minimal_puts: bool,

    /// Re-read entities that are already managed by the session
    pub refresh: bool,

    /// Tenant the session is bound to; rows of other tenants are rejected
    pub tenant_identifier: Option<String>,

    /// Drop repeated root entities produced by collection join fetches
    pub unique_results: bool,

    /// Largest zero-based list or array index a row may carry
    #[serde(default = "default_max_collection_index")]
    pub max_collection_index: usize,
}

fn default_max_collection_index() -> usize {
    1 << 20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_read_only: false,
            cache_mode: CacheMode::Normal,
            minimal_puts: false,
            refresh: false,
            tenant_identifier: None,
            unique_results: false,
            max_collection_index: default_max_collection_index(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entities read-only by default
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    /// Set the cache mode
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Enable minimal puts
    pub fn minimal_puts(mut self, enabled: bool) -> Self {
        self.minimal_puts = enabled;
        self
    }

    /// Force already-managed entities to be re-read
    pub fn refresh(mut self, enabled: bool) -> Self {
        self.refresh = enabled;
        self
    }

    /// Bind the session to a tenant
    pub fn tenant(mut self, tenant: &str) -> Self {
        self.tenant_identifier = Some(tenant.to_string());
        self
    }

    /// Filter duplicate root entities
    pub fn unique_results(mut self, enabled: bool) -> Self {
        self.unique_results = enabled;
        self
    }

    /// Cap the list and array index accepted from a row
    pub fn max_collection_index(mut self, index: usize) -> Self {
        self.max_collection_index = index;
        self
    }
}
