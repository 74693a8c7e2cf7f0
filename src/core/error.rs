use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("Mapping error: {0}")]
    MappingError(String),

    #[error("Unresolved mapping reference: {0}")]
    UnresolvedReference(String),

    #[error("Wrong class: discriminator value {value} does not resolve to a subclass of '{entity}'")]
    WrongClass { entity: String, value: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Result set error: {0}")]
    ResultSetError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrmError {
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::MappingError(message.into())
    }

    /// Whether the error aborts model construction rather than a single traversal.
    pub fn is_mapping_error(&self) -> bool {
        matches!(self, Self::MappingError(_) | Self::UnresolvedReference(_))
    }
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl<T> From<std::sync::PoisonError<T>> for OrmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
