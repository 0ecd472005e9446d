/*!
Validated site-list entries
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const SCHEMES: [&str; 2] = ["https://", "http://"];

/// A normalized `http`/`https` URL with any explicit port removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Entry(String);

impl Entry {
    /// Validate and normalize raw user input.
    ///
    /// `https://host:8080/path` becomes `https://host/path`. Anything after the
    /// authority (path, query, fragment) is kept as typed.
    pub fn normalize(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let Some(scheme) = SCHEMES.iter().find(|scheme| raw.starts_with(*scheme)) else {
            return Err(invalid(raw, "must start with http:// or https://"));
        };

        let rest = &raw[scheme.len()..];
        let authority_end = rest
            .find(|c: char| matches!(c, '/' | '?' | '#'))
            .unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        let host = strip_port(authority);
        if host.is_empty() {
            return Err(invalid(raw, "missing host"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid(raw, "host contains whitespace"));
        }

        Ok(Self(format!("{scheme}{host}{tail}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_port(authority: &str) -> &str {
    // IPv6 literals are bracketed and contain colons of their own
    let search_from = authority.rfind(']').map_or(0, |idx| idx + 1);
    match authority[search_from..].find(':') {
        Some(offset) => &authority[..search_from + offset],
        None => authority,
    }
}

fn invalid(input: &str, reason: &'static str) -> EngineError {
    EngineError::InvalidEntry {
        input: input.to_string(),
        reason,
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Entry {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Entry {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for Entry {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        Self::normalize(&value)
    }
}

impl From<Entry> for String {
    fn from(entry: Entry) -> Self {
        entry.0
    }
}
