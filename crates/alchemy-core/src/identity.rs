use std::fmt;

use serde::{Deserialize, Serialize};

/// Derive the identity key for an element name.
///
/// Lowercases the input and folds every run of whitespace into a single `-`.
/// Leading and trailing whitespace are folded too, not trimmed. Names that
/// differ only in case or spacing map to the same identity, which is the
/// catalog and cache dedup rule. Unrelated names can also collide
/// ("Sun-Flower" and "sun flower" both become `sun-flower`).
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('-');
                in_whitespace = true;
            }
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// Normalized element identity. Used as the cache key and the catalog key.
///
/// Every constructor runs [`normalize`], including deserialization, so an
/// `Identity` value is always in normal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn from_name(name: &str) -> Self {
        Self(normalize(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::from_name(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
