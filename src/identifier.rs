// 🔢 Company Identifier - 9-digit registry number with checksum
// The 9th digit is a weighted check digit over the first 8.
//
// Weighting: digit at index i gets weight (i % 2) + 1; products above 9
// are folded by summing their own two digits. Valid iff
// (10 - sum % 10) % 10 == digit[8].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// VALIDATION FAILURE REASONS
// ============================================================================

/// Why an input string is not a valid company identifier.
///
/// Validation is total: any input maps to `Ok` or one of these reasons,
/// never a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidIdentifier {
    /// Input is not exactly 9 decimal digits (after separator stripping)
    #[error("identifier must be exactly 9 digits, got {0:?}")]
    NotNineDigits(String),

    /// The 9th digit does not match the computed check digit
    #[error("identifier {given:?} fails checksum (expected check digit {expected})")]
    Checksum { given: String, expected: u8 },
}

// ============================================================================
// COMPANY IDENTIFIER
// ============================================================================

/// A validated 9-digit company identifier.
///
/// Immutable once parsed; the only way to construct one is through
/// [`CompanyIdentifier::parse`], so holding a value guarantees the checksum
/// held at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyIdentifier(String);

impl CompanyIdentifier {
    /// Parse and validate an identifier.
    ///
    /// Spaces and hyphens are stripped first (users paste identifiers in
    /// forms like "51-578223-1"); the cleaned string must then be exactly
    /// 9 decimal digits satisfying the checksum.
    pub fn parse(input: &str) -> Result<Self, InvalidIdentifier> {
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if cleaned.len() != 9 || !cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidIdentifier::NotNineDigits(input.to_string()));
        }

        let digits: Vec<u8> = cleaned.bytes().map(|b| b - b'0').collect();
        let expected = check_digit(&digits[..8]);

        if digits[8] != expected {
            return Err(InvalidIdentifier::Checksum {
                given: cleaned,
                expected,
            });
        }

        Ok(CompanyIdentifier(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First one or two digits, used for company-type derivation when the
    /// registry does not supply an explicit type.
    pub fn prefix2(&self) -> &str {
        &self.0[..2]
    }

    pub fn prefix1(&self) -> &str {
        &self.0[..1]
    }
}

impl fmt::Display for CompanyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the check digit for the first 8 digits.
fn check_digit(first8: &[u8]) -> u8 {
    let mut sum: u32 = 0;

    for (i, &d) in first8.iter().enumerate() {
        let weight = (i as u32 % 2) + 1;
        let mut product = d as u32 * weight;
        if product > 9 {
            product = product / 10 + product % 10;
        }
        sum += product;
    }

    ((10 - sum % 10) % 10) as u8
}

/// Validate without constructing (convenience for form-style callers).
pub fn validate(input: &str) -> Result<(), InvalidIdentifier> {
    CompanyIdentifier::parse(input).map(|_| ())
}

// ============================================================================
// TESTS
// ============================================================================
