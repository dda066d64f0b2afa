use crate::error::ModelError;
use std::fmt;

/// Canonical form of a lock path.
///
/// Two raw paths that differ only by case, separator style, redundant
/// separators, or trailing separators collapse to the same key. The rules are
/// a pure string transformation; no filesystem access happens here.
pub fn normalize_path(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace('\\', "/");

    let mut out = String::with_capacity(lowered.len());
    let mut prev_was_separator = false;
    for ch in lowered.chars() {
        if ch == '/' {
            if !prev_was_separator {
                out.push('/');
            }
            prev_was_separator = true;
        } else {
            out.push(ch);
            prev_was_separator = false;
        }
    }

    // Keep a bare "/" so a root path does not normalize to the empty string.
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }

    out
}

/// Normalized filesystem path key used as the identity of a file lock.
///
/// Thin wrapper around `String` so call sites can't accidentally pass a raw,
/// un-normalized path without opting in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NormalizedPathKey(String);

impl NormalizedPathKey {
    /// Normalize a raw path into its canonical key form.
    pub fn normalize(raw: &str) -> Result<Self, ModelError> {
        let normalized = normalize_path(raw);
        if normalized.is_empty() {
            return Err(ModelError::EmptyPath);
        }
        Ok(Self(normalized))
    }

    /// Wrap a value that is already in canonical form (e.g. read back from
    /// the store, which only ever persists normalized keys).
    pub fn from_canonical(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ModelError::EmptyPath);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
