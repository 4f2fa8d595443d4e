//! Scalar field values.
//!
//! Rows are flat maps of column name to [`FieldValue`]. Values compare
//! loosely: two operands that both look numeric are compared as numbers,
//! anything else is compared as text.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// One row (or partial row) keyed by field name
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single scalar stored in a field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Whether the value is a number or a string spelling a number
    pub fn is_numeric(&self) -> bool {
        match self {
            FieldValue::Int(_) | FieldValue::Float(_) => true,
            FieldValue::Text(s) => parse_numeric(s).is_some(),
            FieldValue::Null => false,
        }
    }

    /// Integer view of the value, truncating floats and parsing numeric text
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) => Some(*f as i64),
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| parse_numeric(trimmed).map(|f| f as i64))
            }
            FieldValue::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => parse_numeric(s),
            FieldValue::Null => None,
        }
    }

    /// Identifier view: positive integers only, everything else is "no id"
    pub fn as_id(&self) -> i64 {
        match self.as_i64() {
            Some(id) if id > 0 => id,
            _ => 0,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values the way the condition language does.
    ///
    /// Returns `None` when either side is null.
    pub fn loose_cmp(&self, other: &FieldValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if let (FieldValue::Int(a), FieldValue::Int(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) if self.is_numeric() && other.is_numeric() => a.partial_cmp(&b),
            _ => Some(self.to_string().cmp(&other.to_string())),
        }
    }

    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            _ => self.loose_cmp(other) == Some(Ordering::Equal),
        }
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        || !trimmed.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.loose_eq(other)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Build a [`FieldMap`] from `key => value` pairs.
///
/// ```
/// use rowguard::fields;
/// let map = fields! { "title" => "hello", "parent_id" => 1 };
/// assert_eq!(map.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::FieldMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::FieldMap::new();
        $( map.insert(::std::string::String::from($key), $crate::FieldValue::from($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_strings_compare_as_numbers() {
        let a = FieldValue::from("10");
        let b = FieldValue::from(9);
        assert_eq!(a.loose_cmp(&b), Some(Ordering::Greater));
        assert!(FieldValue::from("5").loose_eq(&FieldValue::Int(5)));
        assert!(FieldValue::from("5.0").loose_eq(&FieldValue::Int(5)));
    }

    #[test]
    fn test_text_compares_lexically() {
        let a = FieldValue::from("apple");
        let b = FieldValue::from("banana");
        assert_eq!(a.loose_cmp(&b), Some(Ordering::Less));
        assert!(!a.loose_eq(&b));
    }

    #[test]
    fn test_null_is_incomparable() {
        assert_eq!(FieldValue::Null.loose_cmp(&FieldValue::Int(0)), None);
        assert!(FieldValue::Null.loose_eq(&FieldValue::Null));
        assert!(!FieldValue::Null.loose_eq(&FieldValue::from("")));
    }

    #[test]
    fn test_is_numeric_rejects_words() {
        assert!(!FieldValue::from("inf").is_numeric());
        assert!(!FieldValue::from("item 1").is_numeric());
        assert!(!FieldValue::from("").is_numeric());
        assert!(FieldValue::from(" -3.5 ").is_numeric());
    }

    #[test]
    fn test_as_id() {
        assert_eq!(FieldValue::from("7").as_id(), 7);
        assert_eq!(FieldValue::Int(-1).as_id(), 0);
        assert_eq!(FieldValue::Null.as_id(), 0);
    }

    #[test]
    fn test_fields_macro() {
        let map = fields! { "a" => 1, "b" => "x" };
        assert_eq!(map["a"], FieldValue::Int(1));
        assert_eq!(map["b"].as_str(), Some("x"));
    }

    #[test]
    fn test_json_round_trip_is_untagged() {
        let map = fields! { "id" => 3, "title" => "t" };
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"id":3,"title":"t"}"#);
        let back: FieldMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
