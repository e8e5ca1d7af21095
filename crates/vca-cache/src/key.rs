//! Cache key canonicalization (SS4.3).
//!
//! A cache key is `namespace:key_hash`, where `key_hash` is a stable
//! hash over the caller's raw key. The raw key is kept alongside the
//! hash in the `KeyRegistry` so `invalidate_pattern` can match against
//! it even though the stored key itself is opaque.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Computes the namespaced, hashed form of a cache key.
pub fn hashed_key(namespace: &str, raw_key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    raw_key.hash(&mut hasher);
    format!("{namespace}:{:016x}", hasher.finish())
}

/// Matches `candidate` (a `:`-separated raw key, namespace-qualified)
/// against `pattern`, where `*` matches exactly one segment unless it
/// is the final pattern segment, in which case it matches the rest of
/// the candidate (zero or more segments) - "segment granularity"
/// wildcarding per SS4.3.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pat: Vec<&str> = pattern.split(':').collect();
    let cand: Vec<&str> = candidate.split(':').collect();

    let mut pi = 0;
    let mut ci = 0;
    while pi < pat.len() {
        if pat[pi] == "*" {
            if pi == pat.len() - 1 {
                return true;
            }
            if ci >= cand.len() {
                return false;
            }
            pi += 1;
            ci += 1;
        } else {
            if ci >= cand.len() || pat[pi] != cand[ci] {
                return false;
            }
            pi += 1;
            ci += 1;
        }
    }
    ci == cand.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_key_is_stable_for_same_input() {
        assert_eq!(hashed_key("video", "v1:frames"), hashed_key("video", "v1:frames"));
    }

    #[test]
    fn hashed_key_differs_for_different_namespace() {
        assert_ne!(hashed_key("video", "v1"), hashed_key("tool", "v1"));
    }

    #[test]
    fn glob_match_trailing_wildcard_matches_rest() {
        assert!(glob_match("video:v1:*", "video:v1:frames:3"));
        assert!(glob_match("video:v1:*", "video:v1"));
    }

    #[test]
    fn glob_match_segment_wildcard_matches_exactly_one_segment() {
        assert!(glob_match("video:*:frames", "video:v1:frames"));
        assert!(!glob_match("video:*:frames", "video:v1:v2:frames"));
    }

    #[test]
    fn glob_match_requires_non_wildcard_segments_to_match() {
        assert!(!glob_match("video:v1:*", "video:v2:frames"));
    }
}
