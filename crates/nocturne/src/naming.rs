//! Column label to field name mapping.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

/// How a column label is turned into a field (or map key) name.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMapper {
    /// Use the label unchanged.
    AsIs,
    /// `FIRST_NAME`, `firstName` and `FirstName` all become `first_name`.
    #[default]
    SnakeCase,
    /// `FIRST_NAME` and `first_name` become `firstName`.
    CamelCase,
    Lowercase,
    #[serde(skip)]
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl fmt::Debug for NameMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameMapper::AsIs => f.write_str("AsIs"),
            NameMapper::SnakeCase => f.write_str("SnakeCase"),
            NameMapper::CamelCase => f.write_str("CamelCase"),
            NameMapper::Lowercase => f.write_str("Lowercase"),
            NameMapper::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl NameMapper {
    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        NameMapper::Custom(Arc::new(f))
    }

    pub fn map<'a>(&self, label: &'a str) -> Cow<'a, str> {
        match self {
            NameMapper::AsIs => Cow::Borrowed(label),
            NameMapper::SnakeCase => Cow::Owned(to_snake_case(label)),
            NameMapper::CamelCase => Cow::Owned(to_camel_case(label)),
            NameMapper::Lowercase => Cow::Owned(label.to_lowercase()),
            NameMapper::Custom(f) => Cow::Owned(f(label)),
        }
    }
}

impl FromStr for NameMapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "as_is" | "asis" => Ok(NameMapper::AsIs),
            "snake_case" | "snake" => Ok(NameMapper::SnakeCase),
            "camel_case" | "camel" => Ok(NameMapper::CamelCase),
            "lowercase" | "lower" => Ok(NameMapper::Lowercase),
            other => Err(format!("unknown name mapper: {}", other)),
        }
    }
}

fn to_snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 4);
    let mut prev_lower_or_digit = false;
    // All-caps labels (the SQL default) carry no word boundaries besides '_'.
    let has_lower = label.chars().any(char::is_lowercase);
    for c in label.chars() {
        if c == '_' || c == ' ' || c == '-' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else if c.is_uppercase() {
            if has_lower && prev_lower_or_digit {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn to_camel_case(label: &str) -> String {
    let snake = to_snake_case(label);
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A [`NameMapper`] plus explicit label to field overrides. Overrides are
/// consulted first and compared exactly.
#[derive(Debug, Clone, Default)]
pub struct ColumnNaming {
    mapper: NameMapper,
    overrides: HashMap<String, String>,
}

impl ColumnNaming {
    pub fn new(mapper: NameMapper) -> Self {
        Self {
            mapper,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, label: impl Into<String>, field: impl Into<String>) -> Self {
        self.overrides.insert(label.into(), field.into());
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    /// The field name a column label maps to.
    pub fn field_name<'a>(&'a self, label: &'a str) -> Cow<'a, str> {
        match self.overrides.get(label) {
            Some(field) => Cow::Borrowed(field.as_str()),
            None => self.mapper.map(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        let m = NameMapper::SnakeCase;
        assert_eq!(m.map("FIRST_NAME"), "first_name");
        assert_eq!(m.map("firstName"), "first_name");
        assert_eq!(m.map("FirstName"), "first_name");
        assert_eq!(m.map("ID"), "id");
        assert_eq!(m.map("address2Line"), "address2_line");
        assert_eq!(m.map("already_snake"), "already_snake");
    }

    #[test]
    fn test_camel_case() {
        let m = NameMapper::CamelCase;
        assert_eq!(m.map("FIRST_NAME"), "firstName");
        assert_eq!(m.map("first_name"), "firstName");
        assert_eq!(m.map("ID"), "id");
    }

    #[test]
    fn test_custom_and_overrides() {
        let naming = ColumnNaming::new(NameMapper::custom(|l| format!("col_{}", l)))
            .with_override("PK", "id");
        assert_eq!(naming.field_name("PK"), "id");
        assert_eq!(naming.field_name("X"), "col_X");
    }

    #[test]
    fn test_parse_and_deserialize() {
        assert!(matches!("camel-case".parse::<NameMapper>(), Ok(NameMapper::CamelCase)));
        assert!("shouting".parse::<NameMapper>().is_err());
        let m: NameMapper = serde_json::from_str("\"as_is\"").unwrap();
        assert!(matches!(m, NameMapper::AsIs));
    }
}
