// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device identifier generation and validation.
//!
//! A device id is either a UUID-v4 or the legacy fallback form
//! `device-<epoch-ms>-<alnum>` minted by clients without a UUID source.
//! Both forms validate; this implementation always mints UUIDs.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

static UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .unwrap()
});

static FALLBACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^device-\d+-[a-z0-9]+$").unwrap());

const FALLBACK_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const FALLBACK_SUFFIX_LEN: usize = 13;

/// Mint a fresh random device id.
pub fn generate() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Mint a fallback-form id: `device-<epoch-ms>-<13 base36 chars>`.
pub fn generate_fallback() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..FALLBACK_SUFFIX_LEN)
        .map(|_| FALLBACK_ALPHABET[rng.gen_range(0..FALLBACK_ALPHABET.len())] as char)
        .collect();
    format!("device-{millis}-{suffix}")
}

/// True iff `id` matches the UUID-v4 pattern or the fallback pattern.
pub fn is_valid(id: &str) -> bool {
    UUID_V4.is_match(id) || FALLBACK.is_match(id)
}
