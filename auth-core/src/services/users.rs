use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::error::AuthError;
use crate::models::{Scope, Token, User};
use crate::services::TokenService;
use crate::store::{timed, UserStore};

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    tokens: TokenService,
    timeout: Duration,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenService, timeout: Duration) -> Self {
        Self {
            store,
            tokens,
            timeout,
        }
    }

    /// Persist a new user and fill in the store-assigned fields.
    pub async fn insert(&self, user: &mut User) -> Result<(), AuthError> {
        user.ensure_password_hash()?;

        let inserted = timed(self.timeout, "insert_user", self.store.insert_user(user)).await?;
        user.id = inserted.id;
        user.created_at = inserted.created_at;
        user.version = inserted.version;

        tracing::info!(user_id = user.id, "User created");
        Ok(())
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, AuthError> {
        let row = timed(self.timeout, "user_by_email", self.store.user_by_email(email)).await?;
        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<User, AuthError> {
        let row = timed(self.timeout, "user_by_id", self.store.user_by_id(id)).await?;
        Ok(row.into())
    }

    /// Optimistic update; fails with [`AuthError::EditConflict`] when the
    /// stored version moved on.
    pub async fn update(&self, user: &mut User) -> Result<(), AuthError> {
        user.ensure_password_hash()?;

        let version = timed(self.timeout, "update_user", self.store.update_user(user)).await?;
        user.version = version;
        Ok(())
    }

    /// Insert `user` together with its permission grants and `token` in one
    /// store call. On success `token` is bound to the new user id.
    pub async fn create(
        &self,
        user: &mut User,
        permissions: &[String],
        token: &mut Token,
    ) -> Result<(), AuthError> {
        user.ensure_password_hash()?;

        let inserted = timed(
            self.timeout,
            "create_user",
            self.store.create_user(user, permissions, &token.record()),
        )
        .await?;
        user.id = inserted.id;
        user.created_at = inserted.created_at;
        user.version = inserted.version;
        token.user_id = inserted.id;

        tracing::info!(user_id = user.id, scope = %token.scope, "User created");
        Ok(())
    }

    /// Optimistic update that revokes the user's tokens in `scopes` in the
    /// same step.
    pub async fn update_revoking(&self, user: &mut User, scopes: &[Scope]) -> Result<(), AuthError> {
        user.ensure_password_hash()?;

        let scopes: Vec<&str> = scopes.iter().map(Scope::as_str).collect();
        let version = timed(
            self.timeout,
            "update_user_revoking",
            self.store.update_user_revoking(user, &scopes),
        )
        .await?;
        user.version = version;

        tracing::debug!(user_id = user.id, ?scopes, "User updated, tokens revoked");
        Ok(())
    }

    /// Owner of a valid token in `scope`.
    pub async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, AuthError> {
        let user_id = self.tokens.verify(scope, plaintext).await?;

        match self.get_by_id(user_id).await {
            Err(AuthError::NotFound) => Err(AuthError::AuthenticationFailure),
            other => other,
        }
    }
}
