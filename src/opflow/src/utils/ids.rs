//! Parsing of relay-supplied identifiers.

use std::sync::OnceLock;

use alloy_primitives::B256;
use regex::Regex;

fn hash_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[a-fA-F0-9]{64}$").ok())
        .as_ref()
}

/// Parse a 0x-prefixed 32-byte hex identifier. Anything else is not a usable id.
pub fn parse_hash(raw: &str) -> Option<B256> {
    let raw = raw.trim();
    if !hash_pattern()?.is_match(raw) {
        return None;
    }
    raw.parse().ok()
}
