#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_core::config::AuthSettings;
use auth_core::models::{InsertedUser, TokenRecord, User, UserRow};
use auth_core::store::{MemoryStore, TokenStore, UserStore};
use auth_core::utils::PasswordConfig;
use auth_core::{AuthError, AuthService};
use service_core::config::LogFormat;

/// Settings with a cheap password hash so tests stay fast.
pub fn test_settings() -> AuthSettings {
    AuthSettings {
        password: PasswordConfig {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        ..AuthSettings::default()
    }
}

pub fn init_tracing() {
    service_core::observability::init_tracing("auth-core-test", "auth_core=debug", LogFormat::Pretty);
}

pub fn setup() -> (Arc<MemoryStore>, AuthService) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let service = AuthService::from_store(store.clone(), test_settings());
    (store, service)
}

/// Registers and activates a user, returning its id.
pub async fn activated_user(service: &AuthService, email: &str, password: &str) -> i64 {
    let registration = service
        .register("Test User", email, password)
        .await
        .expect("registration failed");
    service
        .activate(registration.activation_token.plaintext())
        .await
        .expect("activation failed");
    registration.user.id
}

/// Token store whose writes always fail.
pub struct FailingTokenStore;

#[async_trait]
impl TokenStore for FailingTokenStore {
    async fn insert_token(&self, _token: &TokenRecord) -> Result<(), AuthError> {
        Err(AuthError::Persistence(sqlx::Error::PoolClosed))
    }

    async fn find_token(&self, _hash: &[u8], _scope: &str) -> Result<TokenRecord, AuthError> {
        Err(AuthError::NotFound)
    }

    async fn delete_tokens_for_user(&self, _scope: &str, _user_id: i64) -> Result<u64, AuthError> {
        Err(AuthError::Persistence(sqlx::Error::PoolClosed))
    }
}

/// Token store that never answers within any reasonable deadline.
pub struct SlowTokenStore {
    pub delay: Duration,
}

#[async_trait]
impl TokenStore for SlowTokenStore {
    async fn insert_token(&self, _token: &TokenRecord) -> Result<(), AuthError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn find_token(&self, _hash: &[u8], _scope: &str) -> Result<TokenRecord, AuthError> {
        tokio::time::sleep(self.delay).await;
        Err(AuthError::NotFound)
    }

    async fn delete_tokens_for_user(&self, _scope: &str, _user_id: i64) -> Result<u64, AuthError> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }
}

/// User store backed by a [`MemoryStore`] whose combined update-and-revoke
/// always fails, leaving the backing store untouched.
pub struct RevokeFailingUserStore {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl UserStore for RevokeFailingUserStore {
    async fn insert_user(&self, user: &User) -> Result<InsertedUser, AuthError> {
        self.inner.insert_user(user).await
    }

    async fn user_by_email(&self, email: &str) -> Result<UserRow, AuthError> {
        self.inner.user_by_email(email).await
    }

    async fn user_by_id(&self, id: i64) -> Result<UserRow, AuthError> {
        self.inner.user_by_id(id).await
    }

    async fn update_user(&self, user: &User) -> Result<i32, AuthError> {
        self.inner.update_user(user).await
    }

    async fn create_user(
        &self,
        user: &User,
        permissions: &[String],
        token: &TokenRecord,
    ) -> Result<InsertedUser, AuthError> {
        self.inner.create_user(user, permissions, token).await
    }

    async fn update_user_revoking(&self, _user: &User, _scopes: &[&str]) -> Result<i32, AuthError> {
        Err(AuthError::Persistence(sqlx::Error::PoolClosed))
    }
}

/// Service whose user updates that revoke tokens fail, sharing `store` for
/// everything else.
pub fn setup_revoke_failing() -> (Arc<MemoryStore>, AuthService) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(RevokeFailingUserStore {
        inner: store.clone(),
    });
    let service = AuthService::new(users, store.clone(), store.clone(), test_settings());
    (store, service)
}
