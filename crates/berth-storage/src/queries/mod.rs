// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod pool;
pub mod records;
pub mod sessions;

/// Parse a TEXT column into a strum-backed enum, mapping failures onto the
/// rusqlite conversion error so they surface through the normal error path.
pub(crate) fn parse_text_column<T>(idx: usize, value: &str) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
