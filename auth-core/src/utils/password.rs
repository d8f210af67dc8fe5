use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;

/// Argon2id cost parameters. Fixed per deployment, never per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| AuthError::Hashing(format!("invalid cost parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// A user's password credential.
///
/// The plaintext is only held between [`Password::set`] and the end of the
/// request so that it can be validated; only the hash is ever persisted.
#[derive(Default)]
pub struct Password {
    plaintext: Option<SecretString>,
    hash: Option<Vec<u8>>,
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "[REDACTED]"))
            .field("hash", &self.hash.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Password {
    /// Wrap a hash loaded from the store.
    pub fn from_hash(hash: Vec<u8>) -> Self {
        Self {
            plaintext: None,
            hash: Some(hash),
        }
    }

    /// Derive a salted Argon2id hash of `plaintext` and keep both forms.
    pub fn set(&mut self, plaintext: &str, config: &PasswordConfig) -> Result<(), AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = config
            .hasher()?
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        self.plaintext = Some(SecretString::new(plaintext.to_string()));
        self.hash = Some(hash.into_bytes());

        Ok(())
    }

    /// Verify `plaintext` against the stored hash in constant time.
    ///
    /// A mismatch is `Ok(false)`. A corrupt or missing hash is an error so
    /// callers can tell "wrong password" apart from a system fault.
    pub fn matches(&self, plaintext: &str) -> Result<bool, AuthError> {
        let stored = self
            .hash
            .as_deref()
            .ok_or(AuthError::Invariant("missing password hash for user"))?;

        let encoded = std::str::from_utf8(stored)
            .map_err(|_| AuthError::Hashing("stored hash is not valid UTF-8".to_string()))?;
        let parsed = PasswordHash::new(encoded)
            .map_err(|e| AuthError::Hashing(format!("invalid password hash format: {}", e)))?;

        // Cost parameters are read back from the encoded hash.
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_ref().map(|p| p.expose_secret().as_str())
    }

    pub fn hash(&self) -> Option<&[u8]> {
        self.hash.as_deref()
    }

    /// Drop the transient plaintext, keeping only the hash.
    pub fn forget_plaintext(&mut self) {
        self.plaintext = None;
    }
}

#[cfg(test)]
pub(crate) fn fast_config() -> PasswordConfig {
    PasswordConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_password() {
        let mut password = Password::default();
        password
            .set("mySecurePassword123", &fast_config())
            .expect("Failed to hash password");

        let hash = std::str::from_utf8(password.hash().unwrap()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(password.plaintext(), Some("mySecurePassword123"));
    }

    #[test]
    fn test_matches_correct_and_incorrect() {
        let mut password = Password::default();
        password.set("mySecurePassword123", &fast_config()).unwrap();

        assert!(password.matches("mySecurePassword123").unwrap());
        assert!(!password.matches("wrongPassword").unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let mut first = Password::default();
        let mut second = Password::default();
        first.set("mySecurePassword123", &fast_config()).unwrap();
        second.set("mySecurePassword123", &fast_config()).unwrap();

        // Random salt per hash
        assert_ne!(first.hash(), second.hash());
        assert!(first.matches("mySecurePassword123").unwrap());
        assert!(second.matches("mySecurePassword123").unwrap());
    }

    #[test]
    fn test_loaded_hash_verifies() {
        let mut original = Password::default();
        original.set("pa55word-pa55word", &fast_config()).unwrap();

        let loaded = Password::from_hash(original.hash().unwrap().to_vec());
        assert!(loaded.plaintext().is_none());
        assert!(loaded.matches("pa55word-pa55word").unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        let password = Password::from_hash(b"not-a-phc-string".to_vec());
        assert!(matches!(
            password.matches("whatever1"),
            Err(AuthError::Hashing(_))
        ));
    }

    #[test]
    fn test_missing_hash_is_an_invariant_violation() {
        let password = Password::default();
        assert!(matches!(
            password.matches("whatever1"),
            Err(AuthError::Invariant(_))
        ));
    }

    #[test]
    fn test_invalid_cost_parameters() {
        let config = PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        let mut password = Password::default();
        assert!(matches!(
            password.set("mySecurePassword123", &config),
            Err(AuthError::Hashing(_))
        ));
        assert!(password.hash().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut password = Password::default();
        password.set("mySecurePassword123", &fast_config()).unwrap();
        let rendered = format!("{:?}", password);
        assert!(!rendered.contains("mySecurePassword123"));
        assert!(!rendered.contains("argon2"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_set_then_matches(
            plaintext in "[ -~]{8,72}",
            other in "[ -~]{8,72}",
        ) {
            let mut password = Password::default();
            password.set(&plaintext, &fast_config()).unwrap();

            prop_assert!(password.matches(&plaintext).unwrap());
            if other != plaintext {
                prop_assert!(!password.matches(&other).unwrap());
            }
        }
    }
}
