//! Namespaced cache keys of the form `domain:identifier[:identifier...]`.
//!
//! Keys sharing a domain can be dropped together with
//! [`crate::cache::ExpiringCache::invalidate_prefix`].

use std::fmt;

use crate::error::CacheKeyError;

/// Namespace for memoized per-route optimization results.
pub const ROUTE_OPTIMIZATION: &str = "route-optimization";
/// Namespace for memoized geocoder answers.
pub const GEOCODE: &str = "geocode";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Starts a key in `domain`.
    pub fn new(domain: &str) -> Result<Self, CacheKeyError> {
        validate_segment(domain)?;
        Ok(Self(domain.to_string()))
    }

    /// Appends one identifier segment.
    pub fn push(mut self, segment: impl AsRef<str>) -> Result<Self, CacheKeyError> {
        let segment = segment.as_ref();
        validate_segment(segment)?;
        self.0.push(':');
        self.0.push_str(segment);
        Ok(self)
    }

    /// Prefix matching every key in `domain`, including the separator.
    pub fn domain_prefix(domain: &str) -> String {
        format!("{domain}:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> Result<(), CacheKeyError> {
    if segment.is_empty() {
        return Err(CacheKeyError::EmptySegment);
    }
    if segment.contains(':') || segment.chars().any(char::is_whitespace) {
        return Err(CacheKeyError::ReservedCharacter(segment.to_string()));
    }
    Ok(())
}

/// Turns free text (addresses) into a single key segment: lowercased,
/// whitespace runs collapsed to `-`, colons replaced.
pub fn normalize_segment(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase().replace(':', "_"))
        .collect::<Vec<_>>()
        .join("-")
}
