//! Bearer token model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

use crate::error::AuthError;
use crate::utils::base32_unpadded;
use crate::validator::Validator;

/// Random bytes behind every token.
pub const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of the base-32 plaintext for [`TOKEN_ENTROPY_BYTES`].
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// Purpose a token was issued for. A token never authorizes another scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Scope::Activation),
            "authentication" => Ok(Scope::Authentication),
            "password-reset" => Ok(Scope::PasswordReset),
            _ => Err(format!("Invalid token scope: {}", s)),
        }
    }
}

/// A freshly issued token. The plaintext lives only in this value.
pub struct Token {
    plaintext: SecretString,
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Generate a token from the operating system CSPRNG.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Result<Self, AuthError> {
        Self::generate_with(&mut OsRng, user_id, ttl, scope)
    }

    /// Generate a token from `rng`. Fails rather than degrading when the
    /// source cannot deliver.
    pub fn generate_with<R: RngCore>(
        rng: &mut R,
        user_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Self, AuthError> {
        let mut random_bytes = [0u8; TOKEN_ENTROPY_BYTES];
        rng.try_fill_bytes(&mut random_bytes)
            .map_err(AuthError::RandomSource)?;

        let plaintext = base32_unpadded(&random_bytes);
        let hash = hash_token(&plaintext);
        let expiry = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(AuthError::Invariant("token expiry out of range"))?;

        Ok(Self {
            plaintext: SecretString::new(plaintext),
            hash,
            user_id,
            expiry,
            scope,
        })
    }

    /// The value handed to the token holder. Never log or store it.
    pub fn plaintext(&self) -> &str {
        self.plaintext.expose_secret()
    }

    /// The persisted form of this token.
    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            hash: self.hash.clone(),
            user_id: self.user_id,
            expiry: self.expiry,
            scope: self.scope.as_str().to_string(),
        }
    }
}

/// A token row as stored: hash only, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: String,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }
}

/// SHA-256 of the plaintext.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}
