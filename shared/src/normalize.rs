//! Query and field normalization.
//!
//! Matching in the catalog is done on normalized tokens: lowercase ASCII
//! letters and digits only. `"SONY CDP-25"` and `"sony cdp25"` both reduce to
//! `"sonycdp25"`.

/// Reduces `input` to its lowercase alphanumeric token.
///
/// Every character outside `[a-z0-9]` after lowercasing is dropped, so the
/// result is always ASCII and `normalize(&normalize(s)) == normalize(s)`.
#[must_use]
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}
