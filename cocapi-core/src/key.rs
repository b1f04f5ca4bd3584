//! Cache key types and construction.
//!
//! This module provides types for building and representing cache keys:
//!
//! - [`CacheKey`] - The complete cache key with prefix, version, and parts
//! - [`KeyPart`] - A single key-value component of a cache key
//! - [`KeyParts`] - Builder for accumulating key parts from a request
//!
//! ## Format
//!
//! The canonical string form of a key is:
//! `{prefix}:v{version}:key1=value1&key2=value2`
//!
//! - Prefix is omitted if empty
//! - Version is omitted if zero
//!
//! Keys compare by prefix, version and the ordered list of parts. No
//! digest is taken, so two distinct requests never share a key.
//!
//! ```
//! use cocapi_core::{CacheKey, KeyPart};
//!
//! let key = CacheKey::new("api", 1, vec![KeyPart::new("id", Some("42"))]);
//! assert_eq!(key.to_string(), "api:v1:id=42");
//!
//! let key = CacheKey::new("", 0, vec![KeyPart::new("flag", None::<&str>)]);
//! assert_eq!(key.to_string(), "flag");
//! ```
//!
//! ## Performance
//!
//! [`CacheKey`] uses `Arc` internally for cheap cloning. [`KeyPart`] uses
//! [`SmolStr`], so short strings are stored inline.

use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKeyInner {
    parts: Vec<KeyPart>,
    version: u32,
    prefix: SmolStr,
}

/// A cache key identifying a cached response.
///
/// Cache keys are composed of:
/// - A **prefix** for namespacing
/// - A **version** number for invalidation
/// - A list of **parts** (key-value pairs) taken from the request
///
/// `clone()` only increments a reference count.
///
/// # Example
///
/// ```
/// use cocapi_core::{CacheKey, KeyPart};
///
/// let key = CacheKey::new(
///     "cocapi",
///     1,
///     vec![
///         KeyPart::new("method", Some("GET")),
///         KeyPart::new("url", Some("https://api.example.com/v1/clans")),
///     ],
/// );
///
/// assert_eq!(key.prefix(), "cocapi");
/// assert_eq!(
///     key.to_string(),
///     "cocapi:v1:method=GET&url=https://api.example.com/v1/clans"
/// );
/// ```
#[derive(Clone, Debug)]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.inner.prefix.is_empty() {
            write!(f, "{}:", self.inner.prefix)?;
        }
        if self.inner.version > 0 {
            write!(f, "v{}:", self.inner.version)?;
        }
        for (i, part) in self.inner.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// Creates a new cache key with the given components.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Namespace prefix for the key
    /// * `version` - Version number for cache invalidation
    /// * `parts` - List of key-value parts
    pub fn new(prefix: impl Into<SmolStr>, version: u32, parts: Vec<KeyPart>) -> Self {
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                parts,
                version,
                prefix: prefix.into(),
            }),
        }
    }

    /// Creates a cache key with a single key-value part.
    pub fn single(key: &str, value: &str) -> Self {
        Self::new("", 0, vec![KeyPart::new(key, Some(value))])
    }

    /// Returns an iterator over the key parts.
    pub fn parts(&self) -> impl Iterator<Item = &KeyPart> {
        self.inner.parts.iter()
    }

    /// Returns the cache key version number.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// Returns the cache key prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Returns the estimated memory usage of this cache key in bytes.
    ///
    /// Counts the `Arc` allocation, the parts vector and string content
    /// longer than the `SmolStr` inline threshold.
    pub fn memory_size(&self) -> usize {
        use std::mem::size_of;

        let heap_size = |len: usize| len.saturating_sub(23);
        let arc_overhead = 2 * size_of::<usize>() + size_of::<CacheKeyInner>();
        let vec_overhead = self.inner.parts.len() * size_of::<KeyPart>();
        let strings = heap_size(self.inner.prefix.len())
            + self
                .inner
                .parts
                .iter()
                .map(|p| heap_size(p.key().len()) + p.value().map_or(0, |v| heap_size(v.len())))
                .sum::<usize>();

        arc_overhead + vec_overhead + strings
    }
}

/// A single component of a cache key.
///
/// Displayed as `key=value`, or just `key` when the value is `None`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(ref value) = self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

impl KeyPart {
    /// Creates a new key part.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the optional value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Builder for accumulating cache key parts.
///
/// Parts are kept in push order, callers that need a canonical order
/// (query parameters) push them already sorted.
#[derive(Debug, Default)]
pub struct KeyParts {
    prefix: SmolStr,
    version: u32,
    parts: Vec<KeyPart>,
}

impl KeyParts {
    /// Creates an empty builder with the given prefix and version.
    pub fn new(prefix: impl Into<SmolStr>, version: u32) -> Self {
        KeyParts {
            prefix: prefix.into(),
            version,
            parts: Vec::new(),
        }
    }

    /// Adds a single key part.
    pub fn push(&mut self, part: KeyPart) {
        self.parts.push(part)
    }

    /// Appends multiple key parts.
    pub fn extend<I: IntoIterator<Item = KeyPart>>(&mut self, parts: I) {
        self.parts.extend(parts)
    }

    /// Consumes the builder and returns the finished key.
    pub fn into_cache_key(self) -> CacheKey {
        CacheKey::new(self.prefix, self.version, self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_empty_prefix_and_zero_version() {
        let key = CacheKey::new("", 0, vec![KeyPart::new("id", Some("42"))]);
        assert_eq!(key.to_string(), "id=42");
    }

    #[test]
    fn mixed_parts_are_joined_with_ampersand() {
        let key = CacheKey::new(
            "api",
            1,
            vec![
                KeyPart::new("method", Some("GET")),
                KeyPart::new("cached", None::<&str>),
            ],
        );
        assert_eq!(key.to_string(), "api:v1:method=GET&cached");
    }

    #[test]
    fn clones_share_storage_and_compare_equal() {
        let key = CacheKey::single("url", "/clans");
        let clone = key.clone();
        assert_eq!(key, clone);
        assert!(Arc::ptr_eq(&key.inner, &clone.inner));
    }

    #[test]
    fn memory_size_grows_with_long_values() {
        let short = CacheKey::single("url", "/a");
        let long = CacheKey::single("url", &"/segment".repeat(20));
        assert!(long.memory_size() > short.memory_size());
    }
}
