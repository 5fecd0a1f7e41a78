//! Deterministic cache-key construction.
//!
//! Keys derived from caller-supplied strings (mail subjects, job arguments)
//! are hashed to a fixed length so key size stays bounded no matter what the
//! caller passes in. Prefix/suffix affixes are joined with `:` following the
//! usual Redis key layout.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sha2::{Digest, Sha256};

/// Builder for bounded, deterministic cache keys.
#[derive(Debug, Clone, Copy)]
pub struct KeyBuilder {
    /// Number of hash characters kept in the key body.
    hash_length: usize,
}

impl KeyBuilder {
    pub fn new(hash_length: usize) -> Self {
        Self { hash_length }
    }

    /// Build a key from a base string plus optional affixes.
    ///
    /// The base is hashed and truncated; identical inputs always produce the
    /// identical key.
    pub fn make_key(&self, base: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
        let hashed = self.make_hash(base);
        Self::with_affixes(&hashed, prefix, suffix)
    }

    /// SHA-256 of the input, URL-safe base64, truncated to the configured length.
    pub fn make_hash(&self, input: &str) -> String {
        let digest = Sha256::digest(input.as_bytes());
        let encoded = URL_SAFE.encode(digest);
        encoded.chars().take(self.hash_length).collect()
    }

    /// Join a key body with optional `prefix:` and `:suffix`, normalizing
    /// stray separators on the affix side.
    pub fn with_affixes(base: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
        let mut key = base.to_string();
        if let Some(prefix) = prefix {
            let prefix = prefix.strip_suffix(':').unwrap_or(prefix);
            key = format!("{prefix}:{key}");
        }
        if let Some(suffix) = suffix {
            let suffix = suffix.strip_prefix(':').unwrap_or(suffix);
            key = format!("{key}:{suffix}");
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key_is_deterministic() {
        let builder = KeyBuilder::new(10);
        let a = builder.make_key("Weekly digest", Some("periodic:digest:a@x.com:"), None);
        let b = builder.make_key("Weekly digest", Some("periodic:digest:a@x.com:"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_bases_produce_distinct_keys() {
        let builder = KeyBuilder::new(10);
        assert_ne!(
            builder.make_key("subject-a", None, None),
            builder.make_key("subject-b", None, None)
        );
    }

    #[test]
    fn test_hash_length_is_bounded() {
        let builder = KeyBuilder::new(8);
        let long_subject = "s".repeat(4096);
        assert_eq!(builder.make_hash(&long_subject).len(), 8);
    }

    #[test]
    fn test_affix_separators_are_normalized() {
        let key = KeyBuilder::with_affixes("abc", Some("pre:"), Some(":post"));
        assert_eq!(key, "pre:abc:post");
        let key = KeyBuilder::with_affixes("abc", Some("pre"), Some("post"));
        assert_eq!(key, "pre:abc:post");
    }
}
