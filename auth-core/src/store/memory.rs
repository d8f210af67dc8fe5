//! In-process store with the same semantics as the Postgres schema.
//!
//! Used by the test suites and by tools that need the services without a
//! database. The lock is held only for the body of a single call.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{PermissionStore, TokenStore, UserStore};
use crate::error::AuthError;
use crate::models::permission::{MOVIES_READ, MOVIES_WRITE};
use crate::models::{InsertedUser, TokenRecord, User, UserRow};

#[derive(Default)]
struct MemoryState {
    next_user_id: i64,
    users: Vec<UserRow>,
    tokens: Vec<TokenRecord>,
    /// (id, code) permission definitions.
    permissions: Vec<(i64, String)>,
    /// (user_id, permission_id) grants.
    grants: BTreeSet<(i64, i64)>,
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store seeded with the same permission definitions as the migration.
    pub fn new() -> Self {
        Self::with_permissions(&[MOVIES_READ, MOVIES_WRITE])
    }

    pub fn with_permissions(codes: &[&str]) -> Self {
        let state = MemoryState {
            next_user_id: 1,
            permissions: codes
                .iter()
                .zip(1..)
                .map(|(code, id)| (id, code.to_string()))
                .collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored tokens, for assertions.
    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    /// Stored token rows, for assertions.
    pub fn tokens(&self) -> Vec<TokenRecord> {
        self.lock().tokens.clone()
    }
}

impl MemoryState {
    /// Ids for `codes`, or every code that has no definition.
    fn permission_ids(&self, codes: &[String]) -> Result<Vec<i64>, AuthError> {
        let mut ids = Vec::with_capacity(codes.len());
        let mut unknown = Vec::new();
        for code in codes {
            match self.permissions.iter().find(|(_, c)| c == code) {
                Some((id, _)) => ids.push(*id),
                None => unknown.push(code.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(AuthError::UnknownPermission(unknown));
        }
        Ok(ids)
    }

    fn insert_user(&mut self, user: &User) -> Result<InsertedUser, AuthError> {
        let hash = user
            .password
            .hash()
            .ok_or(AuthError::Invariant("missing password hash for user"))?;
        if email_taken(&self.users, &user.email, 0) {
            return Err(AuthError::DuplicateEmail);
        }

        let inserted = InsertedUser {
            id: self.next_user_id,
            created_at: Utc::now(),
            version: 1,
        };
        self.next_user_id += 1;
        self.users.push(UserRow {
            id: inserted.id,
            created_at: inserted.created_at,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: hash.to_vec(),
            activated: user.activated,
            version: inserted.version,
        });
        Ok(inserted)
    }

    fn update_user(&mut self, user: &User) -> Result<i32, AuthError> {
        let hash = user
            .password
            .hash()
            .ok_or(AuthError::Invariant("missing password hash for user"))?;
        if email_taken(&self.users, &user.email, user.id) {
            return Err(AuthError::DuplicateEmail);
        }

        let row = self
            .users
            .iter_mut()
            .find(|u| u.id == user.id && u.version == user.version)
            .ok_or(AuthError::EditConflict)?;

        row.name = user.name.clone();
        row.email = user.email.clone();
        row.password_hash = hash.to_vec();
        row.activated = user.activated;
        row.version += 1;
        Ok(row.version)
    }
}

fn email_taken(users: &[UserRow], email: &str, except_id: i64) -> bool {
    users
        .iter()
        .any(|u| u.id != except_id && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), AuthError> {
        let mut state = self.lock();
        if state.tokens.iter().any(|t| t.hash == token.hash) {
            return Err(AuthError::Invariant("duplicate token hash"));
        }
        if !state.users.iter().any(|u| u.id == token.user_id) {
            return Err(AuthError::NotFound);
        }
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn find_token(&self, hash: &[u8], scope: &str) -> Result<TokenRecord, AuthError> {
        self.lock()
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> Result<u64, AuthError> {
        let mut state = self.lock();
        let before = state.tokens.len();
        state
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - state.tokens.len()) as u64)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AuthError> {
        let state = self.lock();
        Ok(state
            .permissions
            .iter()
            .filter(|(id, _)| state.grants.contains(&(user_id, *id)))
            .map(|(_, code)| code.clone())
            .collect())
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[String]) -> Result<(), AuthError> {
        let mut state = self.lock();
        let ids = state.permission_ids(codes)?;
        for id in ids {
            state.grants.insert((user_id, id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<InsertedUser, AuthError> {
        self.lock().insert_user(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<UserRow, AuthError> {
        self.lock()
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn user_by_id(&self, id: i64) -> Result<UserRow, AuthError> {
        self.lock()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn update_user(&self, user: &User) -> Result<i32, AuthError> {
        self.lock().update_user(user)
    }

    async fn create_user(
        &self,
        user: &User,
        permissions: &[String],
        token: &TokenRecord,
    ) -> Result<InsertedUser, AuthError> {
        let mut state = self.lock();

        // Every check runs before the first write.
        let permission_ids = state.permission_ids(permissions)?;
        if state.tokens.iter().any(|t| t.hash == token.hash) {
            return Err(AuthError::Invariant("duplicate token hash"));
        }

        let inserted = state.insert_user(user)?;
        for id in permission_ids {
            state.grants.insert((inserted.id, id));
        }
        state.tokens.push(TokenRecord {
            user_id: inserted.id,
            ..token.clone()
        });
        Ok(inserted)
    }

    async fn update_user_revoking(&self, user: &User, scopes: &[&str]) -> Result<i32, AuthError> {
        let mut state = self.lock();
        let version = state.update_user(user)?;
        state
            .tokens
            .retain(|t| !(t.user_id == user.id && scopes.contains(&t.scope.as_str())));
        Ok(version)
    }
}
