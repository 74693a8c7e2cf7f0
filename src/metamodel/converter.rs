use serde::{Deserialize, Serialize};
use crate::core::{OrmError, Result, Value};

/// Converts between the relational and the domain representation of a
/// basic value. Applied by basic assemblers after the raw read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BasicValueConverter {
    /// 'Y' / 'N' character column.
    YesNo,
    /// 'T' / 'F' character column.
    TrueFalse,
    /// 1 / 0 integer column.
    NumericBoolean,
    /// Enum stored by ordinal position.
    EnumOrdinal { variants: Vec<String> },
    /// Enum stored by name; validated against the declared variants.
    EnumName { variants: Vec<String> },
}

impl BasicValueConverter {
    pub fn to_domain_value(&self, relational: Value) -> Result<Value> {
        if relational.is_null() {
            return Ok(Value::Null);
        }

        match self {
            Self::YesNo => Self::char_flag(relational, "Y", "N"),
            Self::TrueFalse => Self::char_flag(relational, "T", "F"),
            Self::NumericBoolean => match relational.as_i64() {
                Some(1) => Ok(Value::Boolean(true)),
                Some(0) => Ok(Value::Boolean(false)),
                _ => Err(Self::unconvertible(&relational, "numeric boolean")),
            },
            Self::EnumOrdinal { variants } => {
                let ordinal = relational
                    .as_i64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| Self::unconvertible(&relational, "enum ordinal"))?;
                variants
                    .get(ordinal)
                    .map(|name| Value::Text(name.clone()))
                    .ok_or_else(|| Self::unconvertible(&relational, "enum ordinal"))
            }
            Self::EnumName { variants } => match relational.as_str() {
                Some(name) if variants.iter().any(|v| v == name) => Ok(relational),
                _ => Err(Self::unconvertible(&relational, "enum name")),
            },
        }
    }

    pub fn to_relational_value(&self, domain: Value) -> Result<Value> {
        if domain.is_null() {
            return Ok(Value::Null);
        }

        match self {
            Self::YesNo => Self::flag_char(domain, "Y", "N"),
            Self::TrueFalse => Self::flag_char(domain, "T", "F"),
            Self::NumericBoolean => domain
                .as_bool()
                .map(|b| Value::Integer(i64::from(b)))
                .ok_or_else(|| Self::unconvertible(&domain, "numeric boolean")),
            Self::EnumOrdinal { variants } => {
                let position = domain
                    .as_str()
                    .and_then(|name| variants.iter().position(|v| v == name))
                    .ok_or_else(|| Self::unconvertible(&domain, "enum ordinal"))?;
                Ok(Value::Integer(position as i64))
            }
            Self::EnumName { .. } => Ok(domain),
        }
    }

    fn char_flag(value: Value, truthy: &str, falsy: &str) -> Result<Value> {
        match value.as_str() {
            Some(s) if s.eq_ignore_ascii_case(truthy) => Ok(Value::Boolean(true)),
            Some(s) if s.eq_ignore_ascii_case(falsy) => Ok(Value::Boolean(false)),
            _ => Err(Self::unconvertible(&value, "character flag")),
        }
    }

    fn flag_char(value: Value, truthy: &str, falsy: &str) -> Result<Value> {
        match value.as_bool() {
            Some(true) => Ok(Value::Text(truthy.to_string())),
            Some(false) => Ok(Value::Text(falsy.to_string())),
            None => Err(Self::unconvertible(&value, "character flag")),
        }
    }

    fn unconvertible(value: &Value, converter: &str) -> OrmError {
        OrmError::TypeMismatch(format!(
            "Value {} cannot be converted by the {} converter",
            value, converter
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no_round_trip() {
        let converter = BasicValueConverter::YesNo;
        assert_eq!(converter.to_domain_value("Y".into()).unwrap(), Value::Boolean(true));
        assert_eq!(converter.to_domain_value("n".into()).unwrap(), Value::Boolean(false));
        assert_eq!(converter.to_relational_value(true.into()).unwrap(), Value::from("Y"));
        assert!(converter.to_domain_value("X".into()).is_err());
    }

    #[test]
    fn test_enum_ordinal() {
        let converter = BasicValueConverter::EnumOrdinal {
            variants: vec!["RED".into(), "GREEN".into()],
        };
        assert_eq!(converter.to_domain_value(Value::Integer(1)).unwrap(), Value::from("GREEN"));
        assert_eq!(converter.to_relational_value("RED".into()).unwrap(), Value::Integer(0));
        assert!(converter.to_domain_value(Value::Integer(7)).is_err());
        assert_eq!(converter.to_domain_value(Value::Null).unwrap(), Value::Null);
    }
}
