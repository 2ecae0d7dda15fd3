//! Content fingerprints for change detection.
//!
//! Each session keeps the last fingerprint it observed per file. Sends and
//! writes whose fingerprint matches the recorded one are skipped, which is
//! what keeps a broadcast patch from echoing back to its author.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Lowercase hex SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to eyeball in logs
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Last observed fingerprint per wire filename.
#[derive(Debug, Default, Clone)]
pub struct FingerprintMap {
    entries: HashMap<String, Fingerprint>,
}

impl FingerprintMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content` as the last synchronized state of `wire_name`.
    pub fn record(&mut self, wire_name: &str, content: &str) -> Fingerprint {
        let fp = Fingerprint::of(content);
        self.entries.insert(wire_name.to_string(), fp.clone());
        fp
    }

    pub fn is_unchanged(&self, wire_name: &str, content: &str) -> bool {
        self.entries
            .get(wire_name)
            .is_some_and(|fp| *fp == Fingerprint::of(content))
    }

    /// Record `content` and report whether it differs from what was recorded.
    pub fn observe(&mut self, wire_name: &str, content: &str) -> bool {
        let fp = Fingerprint::of(content);
        match self.entries.get(wire_name) {
            Some(existing) if *existing == fp => false,
            _ => {
                self.entries.insert(wire_name.to_string(), fp);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            Fingerprint::of("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(Fingerprint::of("abc"), Fingerprint::of("abc"));
        assert_ne!(Fingerprint::of("abc"), Fingerprint::of("abd"));
    }

    #[test]
    fn test_observe_suppresses_repeats() {
        let mut map = FingerprintMap::new();
        assert!(map.observe("/App.tsx", "one"));
        assert!(!map.observe("/App.tsx", "one"));
        assert!(map.observe("/App.tsx", "two"));
        assert!(map.is_unchanged("/App.tsx", "two"));
        assert!(!map.is_unchanged("/App.tsx", "one"));
    }

    #[test]
    fn test_files_are_tracked_independently() {
        let mut map = FingerprintMap::new();
        map.record("/App.tsx", "same");
        assert!(!map.is_unchanged("/OpenGraphCard.tsx", "same"));
        assert!(map.observe("/OpenGraphCard.tsx", "same"));
        assert!(!map.observe("/App.tsx", "same"));
    }
}
