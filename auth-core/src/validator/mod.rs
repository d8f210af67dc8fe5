//! Field-keyed error accumulation shared by every input check in the crate.
//!
//! A [`Validator`] records at most one message per field: the first failing
//! check for a field wins and later ones are ignored, so callers can run a
//! whole batch of checks and report them to the client in one response.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AuthError;

/// Field name to the single message recorded for it.
pub type ValidationErrors = HashMap<String, String>;

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` under `key` unless `key` already has one.
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }

    /// `Ok(())` when nothing was recorded, otherwise the whole report.
    pub fn into_result(self) -> Result<(), AuthError> {
        if self.valid() {
            Ok(())
        } else {
            Err(AuthError::Validation(self.errors))
        }
    }
}

pub fn permitted_value<T: AsRef<str>>(value: &str, list: &[T]) -> bool {
    list.iter().any(|candidate| candidate.as_ref() == value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let seen: HashSet<&T> = values.iter().collect();
    seen.len() == values.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_validator_is_valid() {
        let v = Validator::new();
        assert!(v.valid());
        assert!(v.errors().is_empty());
        assert!(v.into_result().is_ok());
    }

    #[test]
    fn test_first_error_wins() {
        let mut v = Validator::new();
        v.check(false, "email", "must be provided");
        v.check(false, "email", "duplicate message");

        assert!(!v.valid());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["email"], "must be provided");
    }

    #[test]
    fn test_passing_check_records_nothing() {
        let mut v = Validator::new();
        v.check(true, "page", "must be greater than zero");
        assert!(v.valid());
    }

    #[test]
    fn test_into_result_carries_report() {
        let mut v = Validator::new();
        v.add_error("token", "must be 26 bytes long");
        v.add_error("password", "must be provided");

        match v.into_result() {
            Err(AuthError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors["token"], "must be 26 bytes long");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_permitted_value() {
        let list = ["year", "-year", "title"];
        assert!(permitted_value("-year", &list));
        assert!(!permitted_value("id", &list));
        assert!(!permitted_value("year", &Vec::<String>::new()));
    }

    #[test]
    fn test_unique() {
        assert!(unique(&["a", "b", "c"]));
        assert!(!unique(&["a", "b", "a"]));
        assert!(unique::<&str>(&[]));
    }

    #[test]
    fn test_email_pattern() {
        for ok in [
            "alice@example.com",
            "a.b+tag@sub.example.co.uk",
            "o'brien@example.org",
            "x@localhost",
            "weird!#$%&'*+/=?^_`{|}~-@example.com",
        ] {
            assert!(matches(ok, &EMAIL_RX), "{} should match", ok);
        }

        for bad in [
            "",
            "not-an-email",
            "@example.com",
            "alice@",
            "alice@-example.com",
            "alice@example-.com",
            "alice@exa mple.com",
            "alice@@example.com",
        ] {
            assert!(!matches(bad, &EMAIL_RX), "{} should not match", bad);
        }
    }

    #[test]
    fn test_email_label_length_limit() {
        let label_63 = "a".repeat(63);
        let label_64 = "a".repeat(64);
        assert!(matches(&format!("x@{}.com", label_63), &EMAIL_RX));
        assert!(!matches(&format!("x@{}.com", label_64), &EMAIL_RX));
    }

    proptest! {
        #[test]
        fn prop_recorded_message_never_overwritten(
            messages in proptest::collection::vec("[a-z ]{1,20}", 1..10)
        ) {
            let mut v = Validator::new();
            for message in &messages {
                v.check(false, "field", message);
            }
            prop_assert_eq!(v.errors().len(), 1);
            prop_assert_eq!(&v.errors()["field"], &messages[0]);
        }

        #[test]
        fn prop_one_entry_per_distinct_key(
            keys in proptest::collection::vec("[a-c]", 0..20)
        ) {
            let mut v = Validator::new();
            for key in &keys {
                v.add_error(key, "bad");
            }
            let distinct: HashSet<&String> = keys.iter().collect();
            prop_assert_eq!(v.errors().len(), distinct.len());
            prop_assert_eq!(v.valid(), keys.is_empty());
        }
    }
}
