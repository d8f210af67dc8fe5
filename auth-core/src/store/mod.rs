//! Store contract consumed by the services.
//!
//! Implementations map "no such row" to [`AuthError::NotFound`], a unique
//! email conflict to [`AuthError::DuplicateEmail`] and a stale version on
//! update to [`AuthError::EditConflict`]. Deadlines are applied by the
//! services around each call, not by the stores.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::{InsertedUser, TokenRecord, User, UserRow};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), AuthError>;

    async fn find_token(&self, hash: &[u8], scope: &str) -> Result<TokenRecord, AuthError>;

    /// Delete every token matching both `scope` and `user_id`.
    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AuthError>;

    /// Grant all of `codes` or none of them. Codes without a permission
    /// definition fail with [`AuthError::UnknownPermission`].
    async fn grant_permissions(&self, user_id: i64, codes: &[String]) -> Result<(), AuthError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<InsertedUser, AuthError>;

    async fn user_by_email(&self, email: &str) -> Result<UserRow, AuthError>;

    async fn user_by_id(&self, id: i64) -> Result<UserRow, AuthError>;

    /// Update guarded by `user.version`; returns the new version.
    async fn update_user(&self, user: &User) -> Result<i32, AuthError>;

    /// Insert `user`, grant `permissions` and store `token` as one unit.
    ///
    /// `token.user_id` is ignored and replaced by the new id. Any failure
    /// leaves no trace of the user.
    async fn create_user(
        &self,
        user: &User,
        permissions: &[String],
        token: &TokenRecord,
    ) -> Result<InsertedUser, AuthError>;

    /// Versioned update that also deletes the user's tokens in `scopes`.
    /// Either both happen or neither does.
    async fn update_user_revoking(&self, user: &User, scopes: &[&str]) -> Result<i32, AuthError>;
}

/// Bound a single store round trip by `limit`.
///
/// Dropping the returned future (for example when the request is cancelled)
/// drops the in-flight call with it.
pub async fn timed<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Store operation timed out"
            );
            Err(AuthError::StoreTimeout(limit))
        }
    }
}
