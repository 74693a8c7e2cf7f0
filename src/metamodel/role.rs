use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted path identifying a navigable within the runtime model,
/// e.g. `Order.lineItems.product`. Unique per runtime model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NavigableRole(String);

impl NavigableRole {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn append(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn full_path(&self) -> &str {
        &self.0
    }

    /// Last segment of the path.
    pub fn navigable_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('.').map(|idx| Self(self.0[..idx].to_string()))
    }
}

impl fmt::Display for NavigableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
