use std::fmt;

/// Path of a fetch within one result-shape tree, e.g. `Order.lineItems.product`.
///
/// Unlike a `NavigableRole`, the same navigable reached twice through
/// different fetches yields two distinct paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NavigablePath {
    segments: Vec<String>,
}

impl NavigablePath {
    pub fn root(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
        }
    }

    pub fn append(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        (self.segments.len() > 1).then(|| Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn local_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    pub fn full_path(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for NavigablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}
