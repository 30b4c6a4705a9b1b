//! Constant-time comparisons.
//!
//! Public keys are not secret, but trust-set membership and key-ring lookups
//! run on attacker-supplied values, so they go through `subtle` rather than
//! short-circuiting slice equality.

use subtle::ConstantTimeEq;

/// Constant-time comparison of byte slices.
///
/// Returns `true` if slices are equal, `false` otherwise.
/// Execution time depends only on slice length, not content.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time membership test of `needle` in `haystack`.
///
/// Every element is compared; the scan does not stop at the first match.
#[must_use]
pub fn ct_contains(haystack: &[[u8; 32]], needle: &[u8; 32]) -> bool {
    haystack
        .iter()
        .fold(subtle::Choice::from(0u8), |found, candidate| {
            found | candidate.ct_eq(needle)
        })
        .into()
}
