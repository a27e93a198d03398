//! Cache key sanitization
//!
//! Maps arbitrary cache keys (usually request paths) onto tokens that are safe
//! to use as a single file name. The same token addresses both the payload file
//! and the expiry record, so every component must go through [`sanitize_key`].

/// Characters that are replaced with `_` in a sanitized key
pub const UNSAFE_KEY_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '&'];

/// Replaces filesystem-unsafe characters in `key` with underscores.
///
/// Pure, deterministic and idempotent. No length limit is applied and distinct
/// keys that differ only in substituted characters (`a/b` and `a?b`) map to the
/// same token; callers that need a stronger guarantee must choose keys that do
/// not collide after substitution.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if UNSAFE_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
