// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Cache keywords
//!
//! A request's cache key is the ordered list of every value that affects its
//! result. [`cache_key`] renders that list canonically; [`KeyHash::of`] hashes
//! the rendering.
//!
//! The rendering is unambiguous: text is always quoted and escaped, so no
//! combination of keywords can produce the same key as a different one.
//! Signed and unsigned integers with the same value render (and compare) equal.
//!
//! [`KeyHash::of`]: crate::KeyHash::of

use serde_json::Value;
use std::fmt;

use super::UnixTimestamp;

/// One scalar (or list) component of a cache key
#[derive(Debug, Clone)]
pub enum Keyword {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<Keyword>),
}

impl Keyword {
    /// Converts a JSON parameter value into a keyword.
    ///
    /// Objects have no keyword form of their own and are rendered as their
    /// JSON text, which is canonical for `serde_json`'s sorted maps.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Keyword::Null,
            Value::Bool(b) => Keyword::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Keyword::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    Keyword::Int(i)
                } else {
                    Keyword::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Keyword::Text(s.clone()),
            Value::Array(items) => Keyword::List(items.iter().map(Keyword::from_json).collect()),
            Value::Object(_) => Keyword::Text(value.to_string()),
        }
    }

    /// Returns the list items when this keyword is a list.
    pub fn as_list(&self) -> Option<&[Keyword]> {
        match self {
            Keyword::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` if `needle` equals this keyword or, for lists, one of its items.
    pub fn contains(&self, needle: &Keyword) -> bool {
        self == needle || self.as_list().is_some_and(|items| items.contains(needle))
    }
}

impl PartialEq for Keyword {
    fn eq(&self, other: &Self) -> bool {
        use Keyword::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Int(a), UInt(b)) | (UInt(b), Int(a)) => u64::try_from(*a).is_ok_and(|a| a == *b),
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Text(a), Text(b)) => a == b,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keyword::Null => f.write_str("null"),
            Keyword::Bool(b) => write!(f, "{b}"),
            Keyword::Int(i) => write!(f, "{i}"),
            Keyword::UInt(u) => write!(f, "{u}"),
            // Debug keeps the decimal point so 5.0 never collides with 5
            Keyword::Float(x) => write!(f, "{x:?}"),
            Keyword::Text(s) => write!(f, "{s:?}"),
            Keyword::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Renders keywords into the canonical cache key string.
pub fn cache_key(keywords: &[Keyword]) -> String {
    Keyword::List(keywords.to_vec()).to_string()
}

impl From<&str> for Keyword {
    fn from(s: &str) -> Self {
        Keyword::Text(s.to_string())
    }
}

impl From<String> for Keyword {
    fn from(s: String) -> Self {
        Keyword::Text(s)
    }
}

impl From<bool> for Keyword {
    fn from(b: bool) -> Self {
        Keyword::Bool(b)
    }
}

impl From<i64> for Keyword {
    fn from(i: i64) -> Self {
        Keyword::Int(i)
    }
}

impl From<i32> for Keyword {
    fn from(i: i32) -> Self {
        Keyword::Int(i.into())
    }
}

impl From<u64> for Keyword {
    fn from(u: u64) -> Self {
        Keyword::UInt(u)
    }
}

impl From<u32> for Keyword {
    fn from(u: u32) -> Self {
        Keyword::UInt(u.into())
    }
}

impl From<usize> for Keyword {
    fn from(u: usize) -> Self {
        Keyword::UInt(u as u64)
    }
}

impl From<f64> for Keyword {
    fn from(x: f64) -> Self {
        Keyword::Float(x)
    }
}

impl From<UnixTimestamp> for Keyword {
    fn from(ts: UnixTimestamp) -> Self {
        Keyword::Int(ts.0)
    }
}

impl<T: Into<Keyword>> From<Vec<T>> for Keyword {
    fn from(items: Vec<T>) -> Self {
        Keyword::List(items.into_iter().map(Into::into).collect())
    }
}
