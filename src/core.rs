//! # Core Utilities
//!
//! Serde helpers shared across the crate's wire types, plus identifier
//! generation.

pub mod generate;

use serde::{Deserialize, Serialize};

/// `Kind` allows serde to serialize/deserialize a string or an object.
///
/// A credential may arrive either as a compact JWT (a string) or as a JSON
/// object; `Kind` preserves the distinction so callers can reject the form
/// they do not support.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Kind<T> {
    /// Simple string value
    String(String),

    /// Complex object value
    Object(T),
}

impl<T> Default for Kind<T> {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl<T> From<String> for Kind<T> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> Kind<T> {
    /// Returns the string value, if the kind is a string.
    pub const fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            Self::Object(_) => None,
        }
    }

    /// Returns the object value, if the kind is an object.
    pub const fn as_object(&self) -> Option<&T> {
        match self {
            Self::String(_) => None,
            Self::Object(o) => Some(o),
        }
    }
}

/// `OneMany` allows serde to serialize/deserialize a single object or a set
/// of objects.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneMany<T> {
    /// Single object
    One(T),

    /// Set of objects
    Many(Vec<T>),
}

impl<T: Default> Default for OneMany<T> {
    fn default() -> Self {
        Self::One(T::default())
    }
}

impl<T> From<T> for OneMany<T> {
    fn from(value: T) -> Self {
        Self::One(value)
    }
}

impl<T> OneMany<T> {
    /// Returns the single object, if exactly one is held.
    pub const fn as_one(&self) -> Option<&T> {
        match self {
            Self::One(o) => Some(o),
            Self::Many(_) => None,
        }
    }

    /// Returns the set of objects, if more than one can be held.
    pub const fn as_many(&self) -> Option<&[T]> {
        match self {
            Self::One(_) => None,
            Self::Many(m) => Some(m.as_slice()),
        }
    }

    /// Adds an object. If the quota is a single object, it is converted to a
    /// set of objects.
    pub fn add(&mut self, item: T)
    where
        T: Clone,
    {
        match self {
            Self::One(one) => {
                *self = Self::Many(vec![one.clone(), item]);
            }
            Self::Many(many) => {
                many.push(item);
            }
        }
    }

    /// Returns the number of objects held.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// Returns `true` if the quota is an empty `Many`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_untagged() {
        let string: Kind<Vec<String>> = serde_json::from_value(json!("a string")).expect("string");
        assert_eq!(string.as_string(), Some("a string"));

        let object: Kind<Vec<String>> = serde_json::from_value(json!(["a", "b"])).expect("object");
        assert_eq!(object.as_object(), Some(&vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn one_many_round_trip() {
        let one = OneMany::One("revocation".to_string());
        assert_eq!(serde_json::to_value(&one).expect("should serialize"), json!("revocation"));

        let many = OneMany::Many(vec!["revocation".to_string(), "suspension".to_string()]);
        assert_eq!(
            serde_json::to_value(&many).expect("should serialize"),
            json!(["revocation", "suspension"])
        );

        let mut grown = one;
        grown.add("suspension".to_string());
        assert_eq!(grown.len(), 2);
        assert_eq!(grown, many);
    }
}
