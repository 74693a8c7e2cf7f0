use serde::{Deserialize, Serialize};
use std::fmt;
use super::Value;

/// Assembled identifier value of an entity (or collection owner key).
///
/// Composite identifiers keep their parts in the local state-array order of
/// the identifier embeddable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Simple(Value),
    Composite(Vec<Value>),
}

impl Identifier {
    /// Build a simple identifier, treating NULL as "no identifier".
    pub fn simple(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self::Simple(value))
        }
    }

    /// Build a composite identifier. A composite whose parts are all NULL
    /// denotes a missing row (outer join), never a real key.
    pub fn composite(parts: Vec<Value>) -> Option<Self> {
        if parts.iter().all(Value::is_null) {
            None
        } else {
            Some(Self::Composite(parts))
        }
    }

    pub fn from_parts(mut parts: Vec<Value>, composite: bool) -> Option<Self> {
        if composite {
            Self::composite(parts)
        } else {
            match parts.pop() {
                Some(value) if parts.is_empty() => Self::simple(value),
                _ => None,
            }
        }
    }

    pub fn parts(&self) -> Vec<&Value> {
        match self {
            Self::Simple(value) => vec![value],
            Self::Composite(values) => values.iter().collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(value) => write!(f, "{}", value),
            Self::Composite(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_simple_identifier_is_absent() {
        assert!(Identifier::simple(Value::Null).is_none());
        assert_eq!(
            Identifier::simple(Value::Integer(1)),
            Some(Identifier::Simple(Value::Integer(1)))
        );
    }

    #[test]
    fn test_partially_null_composite_is_a_key() {
        assert!(Identifier::composite(vec![Value::Null, Value::Null]).is_none());
        let id = Identifier::composite(vec![Value::Integer(5), Value::Null]).unwrap();
        assert_eq!(id.to_string(), "(5, NULL)");
    }
}
