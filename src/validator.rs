// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Enrolment form validator.
//!
//! Every rule runs on every submission and all violations are reported, so
//! the form can highlight each bad field at once:
//! - `consumerName`, `consumerAddress`: required, length-capped
//! - `consumerNumber`: exactly 16 digits
//! - `postalCode`: exactly 6 digits
//! - `phoneNumber`: exactly 10 digits

use crate::submission::Submission;
use tracing::debug;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_ADDRESS_CHARS: usize = 500;

const CONSUMER_NUMBER_DIGITS: usize = 16;
const POSTAL_CODE_DIGITS: usize = 6;
const PHONE_NUMBER_DIGITS: usize = 10;

/// Length caps for the free-text fields.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_name_chars: usize,
    pub max_address_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_name_chars: MAX_NAME_CHARS,
            max_address_chars: MAX_ADDRESS_CHARS,
        }
    }
}

/// Enrolment submission validator.
#[derive(Debug, Clone, Default)]
pub struct SubmissionValidator {
    limits: ValidationLimits,
}

impl SubmissionValidator {
    /// Create a new validator with the given limits.
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Check a submission, returning one message per violation.
    ///
    /// An empty list means the submission is acceptable.
    pub fn validate(&self, submission: &Submission) -> Vec<String> {
        let mut errors = Vec::new();

        check_text(
            &mut errors,
            "consumerName",
            &submission.consumer_name,
            self.limits.max_name_chars,
        );
        check_digits(
            &mut errors,
            "consumerNumber",
            &submission.consumer_number,
            CONSUMER_NUMBER_DIGITS,
        );
        check_text(
            &mut errors,
            "consumerAddress",
            &submission.consumer_address,
            self.limits.max_address_chars,
        );
        check_digits(
            &mut errors,
            "postalCode",
            &submission.postal_code,
            POSTAL_CODE_DIGITS,
        );
        check_digits(
            &mut errors,
            "phoneNumber",
            &submission.phone_number,
            PHONE_NUMBER_DIGITS,
        );

        if !errors.is_empty() {
            debug!(errors = ?errors, "Submission rejected");
        }
        errors
    }
}

/// Validate with the default limits.
pub fn validate(submission: &Submission) -> Vec<String> {
    SubmissionValidator::default().validate(submission)
}

fn check_text(errors: &mut Vec<String>, field: &str, value: &str, max_chars: usize) {
    if value.trim().is_empty() {
        errors.push(format!("{field} is required"));
    } else if value.chars().count() > max_chars {
        errors.push(format!("{field} must be at most {max_chars} characters"));
    }
}

fn check_digits(errors: &mut Vec<String>, field: &str, value: &str, digits: usize) {
    if value.trim().is_empty() {
        errors.push(format!("{field} is required"));
    } else if !is_exact_digits(value, digits) {
        errors.push(format!("{field} must be {digits} digits"));
    }
}

/// True when `value` is exactly `len` ASCII digits.
pub fn is_exact_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_submission() -> Submission {
        Submission {
            consumer_name: "Jane Doe".to_string(),
            consumer_number: "1234567890123456".to_string(),
            consumer_address: "1 Main St".to_string(),
            postal_code: "560001".to_string(),
            phone_number: "9876543210".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_submission() {
        assert!(validate(&valid_submission()).is_empty());
    }

    #[test]
    fn test_missing_fields_are_named() {
        let cases: [(&str, fn(&mut Submission)); 5] = [
            ("consumerName", |s| s.consumer_name.clear()),
            ("consumerNumber", |s| s.consumer_number.clear()),
            ("consumerAddress", |s| s.consumer_address = "   ".to_string()),
            ("postalCode", |s| s.postal_code.clear()),
            ("phoneNumber", |s| s.phone_number.clear()),
        ];

        for (field, blank) in cases {
            let mut submission = valid_submission();
            blank(&mut submission);

            let errors = validate(&submission);
            assert_eq!(errors, vec![format!("{field} is required")], "field {field}");
        }
    }

    #[test]
    fn test_all_violations_reported() {
        let errors = validate(&Submission::default());
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_consumer_number_must_be_sixteen_digits() {
        for bad in ["123456789012345", "12345678901234567", "12345678901234ab", "1234 5678 9012 3456"] {
            let submission = Submission {
                consumer_number: bad.to_string(),
                ..valid_submission()
            };
            assert_eq!(
                validate(&submission),
                vec!["consumerNumber must be 16 digits".to_string()],
                "value {bad:?}"
            );
        }
    }

    #[test]
    fn test_postal_code_and_phone_in_isolation() {
        let submission = Submission {
            postal_code: "5600".to_string(),
            phone_number: "98765432100".to_string(),
            ..valid_submission()
        };
        assert_eq!(
            validate(&submission),
            vec![
                "postalCode must be 6 digits".to_string(),
                "phoneNumber must be 10 digits".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        // Devanagari digits are numeric but not ASCII.
        assert!(!is_exact_digits("५६०००१", 6));
        assert!(is_exact_digits("560001", 6));
    }

    #[test]
    fn test_length_caps() {
        let submission = Submission {
            consumer_name: "a".repeat(MAX_NAME_CHARS + 1),
            consumer_address: "b".repeat(MAX_ADDRESS_CHARS + 1),
            ..valid_submission()
        };
        assert_eq!(
            validate(&submission),
            vec![
                "consumerName must be at most 100 characters".to_string(),
                "consumerAddress must be at most 500 characters".to_string(),
            ]
        );

        let at_limit = Submission {
            consumer_name: "é".repeat(MAX_NAME_CHARS),
            ..valid_submission()
        };
        assert!(validate(&at_limit).is_empty());
    }

    #[test]
    fn test_validation_does_not_touch_submission() {
        let submission = Submission {
            consumer_name: "  Jane Doe  ".to_string(),
            ..valid_submission()
        };
        let before = submission.clone();
        validate(&submission);
        assert_eq!(submission, before);
    }
}
