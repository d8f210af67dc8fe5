//! User model - account identity and credential.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::error::AuthError;
use crate::utils::Password;
use crate::validator::{matches, Validator, EMAIL_RX};

pub const MAX_NAME_LEN: usize = 500;
pub const MIN_PASSWORD_LEN: usize = 8;
/// Bytes past this are ignored by common password hash formats, so longer
/// inputs are rejected rather than silently truncated.
pub const MAX_PASSWORD_LEN: usize = 72;

/// User entity.
#[derive(Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// Create a user that has not been persisted yet.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name: name.into(),
            email: email.into(),
            password: Password::default(),
            activated: false,
            version: 0,
        }
    }

    /// Refuse to persist a user whose password was never hashed.
    pub fn ensure_password_hash(&self) -> Result<(), AuthError> {
        if self.password.hash().is_none() {
            tracing::error!(user_id = self.id, "Missing password hash for user");
            return Err(AuthError::Invariant("missing password hash for user"));
        }
        Ok(())
    }
}

/// Row shape of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub activated: bool,
    pub version: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password: Password::from_hash(row.password_hash),
            activated: row.activated,
            version: row.version,
        }
    }
}

/// Values assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedUser {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub version: i32,
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be a valid email address");
    v.check(
        matches(email, &EMAIL_RX),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_LEN,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_LEN,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_LEN,
        "name",
        "must not be more than 500 bytes long",
    );
}

/// Check every user field, then the password-hash invariant.
///
/// Field problems are recorded in `v`. A missing hash is returned as an
/// error instead: it means the caller skipped [`Password::set`].
pub fn validate_user(v: &mut Validator, user: &User) -> Result<(), AuthError> {
    validate_name(v, &user.name);
    validate_email(v, &user.email);

    if let Some(plaintext) = user.password.plaintext() {
        validate_password_plaintext(v, plaintext);
    }

    user.ensure_password_hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::password::fast_config;

    fn user_with_password(name: &str, email: &str, password: &str) -> User {
        let mut user = User::new(name, email);
        user.password.set(password, &fast_config()).unwrap();
        user
    }

    #[test]
    fn test_valid_user() {
        let user = user_with_password("Alice", "alice@example.com", "pa55word1234");
        let mut v = Validator::new();
        validate_user(&mut v, &user).unwrap();
        assert!(v.valid());
    }

    #[test]
    fn test_password_length_is_measured_in_bytes() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"a".repeat(72));
        assert!(v.valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"a".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");

        // 4 characters, 8 bytes
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "éééé");
        assert!(v.valid());
    }

    #[test]
    fn test_empty_password_reports_first_message() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "");
        assert_eq!(v.errors()["password"], "must be provided");

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");
    }

    #[test]
    fn test_invalid_fields_are_collected() {
        let user = user_with_password("", "not-an-email", "short");
        let mut v = Validator::new();
        validate_user(&mut v, &user).unwrap();

        assert_eq!(v.errors().len(), 3);
        assert_eq!(v.errors()["name"], "must be provided");
        assert_eq!(v.errors()["email"], "must be a valid email address");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");
    }

    #[test]
    fn test_long_name_rejected() {
        let user = user_with_password(&"n".repeat(501), "alice@example.com", "pa55word1234");
        let mut v = Validator::new();
        validate_user(&mut v, &user).unwrap();
        assert_eq!(v.errors()["name"], "must not be more than 500 bytes long");
    }

    #[test]
    fn test_missing_hash_is_fatal_not_validation() {
        let user = User::new("Alice", "alice@example.com");
        let mut v = Validator::new();
        let result = validate_user(&mut v, &user);

        assert!(matches!(result, Err(AuthError::Invariant(_))));
        assert!(v.valid());
    }

    #[test]
    fn test_loaded_user_skips_plaintext_checks() {
        let row = UserRow {
            id: 9,
            created_at: Utc::now(),
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            password_hash: b"$argon2id$stored".to_vec(),
            activated: true,
            version: 3,
        };
        let user = User::from(row);
        let mut v = Validator::new();
        validate_user(&mut v, &user).unwrap();
        assert!(v.valid());
        assert_eq!(user.version, 3);
    }

    #[test]
    fn test_serialization_hides_credentials() {
        let user = user_with_password("Alice", "alice@example.com", "pa55word1234");
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["activated"], false);
    }
}
