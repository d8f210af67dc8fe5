use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::instrument;

use crate::error::AuthError;
use crate::models::{hash_token, validate_token_plaintext, Scope, Token};
use crate::store::{timed, TokenStore};
use crate::validator::Validator;

/// Issues, verifies and revokes scoped bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    timeout: StdDuration,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, timeout: StdDuration) -> Self {
        Self { store, timeout }
    }

    /// Generate and persist a token. The plaintext is only handed back once
    /// its hash is stored.
    pub async fn new_token(
        &self,
        user_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token, AuthError> {
        let token = Token::generate(user_id, ttl, scope)?;
        self.insert(&token).await?;

        tracing::info!(user_id, scope = %scope, expiry = %token.expiry, "Token issued");
        Ok(token)
    }

    pub async fn insert(&self, token: &Token) -> Result<(), AuthError> {
        let record = token.record();
        timed(self.timeout, "insert_token", self.store.insert_token(&record))
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    user_id = token.user_id,
                    scope = %token.scope,
                    error = %e,
                    "Token could not be persisted"
                )
            })
    }

    /// Revoke every token of `scope` held by `user_id`.
    #[instrument(skip(self))]
    pub async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<u64, AuthError> {
        let deleted = timed(
            self.timeout,
            "delete_tokens_for_user",
            self.store.delete_tokens_for_user(scope.as_str(), user_id),
        )
        .await?;

        tracing::debug!(user_id, scope = %scope, deleted, "Tokens revoked");
        Ok(deleted)
    }

    /// Resolve a presented plaintext to the owning user id.
    ///
    /// Malformed input fails validation before any lookup. Unknown,
    /// wrong-scope and expired tokens all fail the same way.
    pub async fn verify(&self, scope: Scope, plaintext: &str) -> Result<i64, AuthError> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        v.into_result()?;

        let hash = hash_token(plaintext);
        let record = match timed(
            self.timeout,
            "find_token",
            self.store.find_token(&hash, scope.as_str()),
        )
        .await
        {
            Ok(record) => record,
            Err(AuthError::NotFound) => return Err(AuthError::AuthenticationFailure),
            Err(e) => return Err(e),
        };

        if record.is_expired_at(Utc::now()) {
            tracing::debug!(user_id = record.user_id, scope = %scope, "Expired token presented");
            return Err(AuthError::AuthenticationFailure);
        }

        Ok(record.user_id)
    }
}
