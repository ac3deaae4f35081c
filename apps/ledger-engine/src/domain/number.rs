//! Order number value object with checksum validation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The raw input failed order-number validation.
///
/// This is a validation outcome, not an infrastructure failure: the
/// caller submitted a number that is not a digit string or whose Luhn
/// checksum does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid order number format: {0:?}")]
pub struct InvalidOrderNumber(pub String);

/// A user-supplied order number that passed Luhn validation.
///
/// Order numbers are externally meaningful identifiers; the system
/// never generates them, it only accepts numbers whose modulus-10
/// checksum holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate a raw string and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOrderNumber`] when the input is empty, contains
    /// a non-digit character, or fails the Luhn checksum.
    pub fn parse(raw: &str) -> Result<Self, InvalidOrderNumber> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidOrderNumber(raw.to_string()));
        }
        if !luhn_valid(raw) {
            return Err(InvalidOrderNumber(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap a number already known to be valid (e.g. read back from storage).
    #[must_use]
    pub fn from_trusted(raw: String) -> Self {
        Self(raw)
    }

    /// The number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Luhn modulus-10 check over an ASCII digit string.
///
/// Every second digit from the right is doubled, digit sums above 9
/// collapse by subtracting 9, and the total must divide by 10.
fn luhn_valid(digits: &str) -> bool {
    let mut total = 0u32;
    let mut double = false;
    for b in digits.bytes().rev() {
        let mut digit = u32::from(b - b'0');
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        total += digit;
        double = !double;
    }
    total % 10 == 0
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    /// Independent fold-based Luhn formulation to check against.
    fn luhn_reference(digits: &str) -> bool {
        let sum: u32 = digits
            .bytes()
            .rev()
            .enumerate()
            .map(|(i, b)| {
                let d = u32::from(b - b'0');
                if i % 2 == 1 { d * 2 - if d > 4 { 9 } else { 0 } } else { d }
            })
            .sum();
        sum % 10 == 0
    }

    #[test_case("9278923470", true; "known valid")]
    #[test_case("12345678903", true; "second fixture valid")]
    #[test_case("9399142970086005", true; "sixteen digit valid")]
    #[test_case("333", false; "checksum fails")]
    #[test_case("12345678902", false; "off by one digit")]
    fn checksum_fixtures(raw: &str, valid: bool) {
        assert_eq!(OrderNumber::parse(raw).is_ok(), valid);
    }

    #[test_case(""; "empty")]
    #[test_case("  42"; "leading spaces")]
    #[test_case("42a7"; "embedded letter")]
    #[test_case("-100"; "sign")]
    fn non_digit_strings_rejected(raw: &str) {
        assert_eq!(
            OrderNumber::parse(raw),
            Err(InvalidOrderNumber(raw.to_string()))
        );
    }

    #[test]
    fn display_and_as_str_round_trip() {
        let number = OrderNumber::parse("9278923470").unwrap();
        assert_eq!(number.as_str(), "9278923470");
        assert_eq!(number.to_string(), "9278923470");
    }

    #[test]
    fn serde_is_transparent() {
        let number = OrderNumber::parse("9278923470").unwrap();
        assert_eq!(serde_json::to_string(&number).unwrap(), "\"9278923470\"");
    }

    proptest! {
        #[test]
        fn matches_reference_implementation(digits in "[0-9]{1,19}") {
            prop_assert_eq!(
                OrderNumber::parse(&digits).is_ok(),
                luhn_reference(&digits)
            );
        }

        #[test]
        fn appending_check_digit_validates(body in "[0-9]{1,18}") {
            // Exactly one of the ten candidate check digits must validate.
            let valid_count = (0..10)
                .filter(|d| OrderNumber::parse(&format!("{body}{d}")).is_ok())
                .count();
            prop_assert_eq!(valid_count, 1);
        }
    }
}
