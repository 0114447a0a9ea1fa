//! Key Patterns
//!
//! Patterns select keys for invalidation and for pattern-based admission.
//!
//! Parsing rules for the string form:
//! - `/expr/` is a regular expression
//! - text containing `*`, `?` or `[` is a glob (`*` also crosses `/`)
//! - anything else is a literal prefix

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A key matcher
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Keys starting with the given text
    Prefix(String),
    /// Shell-style wildcard over the whole key
    Glob(glob::Pattern),
    /// Regular expression searched anywhere in the key
    Regex(Regex),
}

impl KeyPattern {
    /// Literal prefix pattern
    pub fn prefix(prefix: impl Into<String>) -> Self {
        KeyPattern::Prefix(prefix.into())
    }

    /// Glob pattern
    pub fn glob(pattern: &str) -> Result<Self> {
        glob::Pattern::new(pattern)
            .map(KeyPattern::Glob)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Regular expression pattern
    pub fn regex(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(KeyPattern::Regex)
            .map_err(|e| Error::InvalidPattern {
                pattern: expr.to_string(),
                reason: e.to_string(),
            })
    }

    /// Check a key against the pattern
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Glob(pattern) => pattern.matches(key),
            KeyPattern::Regex(re) => re.is_match(key),
        }
    }

    /// Parse a list of pattern strings
    pub fn parse_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<KeyPattern>> {
        patterns.iter().map(|p| p.as_ref().parse()).collect()
    }
}

impl FromStr for KeyPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() >= 2 && s.starts_with('/') && s.ends_with('/') {
            KeyPattern::regex(&s[1..s.len() - 1])
        } else if s.contains(['*', '?', '[']) {
            KeyPattern::glob(s)
        } else {
            Ok(KeyPattern::prefix(s))
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Prefix(prefix) => f.write_str(prefix),
            KeyPattern::Glob(pattern) => f.write_str(pattern.as_str()),
            KeyPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for KeyPattern {
    /// Plain strings are prefixes; use `parse()` for glob/regex detection
    fn from(prefix: &str) -> Self {
        KeyPattern::prefix(prefix)
    }
}

impl From<String> for KeyPattern {
    fn from(prefix: String) -> Self {
        KeyPattern::Prefix(prefix)
    }
}

impl From<Regex> for KeyPattern {
    fn from(re: Regex) -> Self {
        KeyPattern::Regex(re)
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Serialize for KeyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
