//! PostgreSQL store.
//!
//! Queries are built at runtime with sqlx so the crate compiles without a
//! live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgPool};

use super::{PermissionStore, TokenStore, UserStore};
use crate::error::AuthError;
use crate::models::{InsertedUser, TokenRecord, User, UserRow};

const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// PostgreSQL-backed store. The pool is owned by the caller.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn user_write_error(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) => {
            AuthError::DuplicateEmail
        }
        _ => AuthError::Persistence(err),
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.hash)
        .bind(token.user_id)
        .bind(token.expiry)
        .bind(&token.scope)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, hash: &[u8], scope: &str) -> Result<TokenRecord, AuthError> {
        sqlx::query_as::<_, TokenRecord>(
            "SELECT hash, user_id, expiry, scope FROM tokens WHERE hash = $1 AND scope = $2",
        )
        .bind(hash)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::NotFound)
    }

    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AuthError> {
        // Rows are streamed and the cursor is released when `rows` drops.
        let mut rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch(&self.pool);

        let mut codes = Vec::new();
        while let Some(code) = rows.try_next().await? {
            codes.push(code);
        }
        Ok(codes)
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[String]) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;
        grant_in(&mut tx, user_id, codes).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Grant `codes` on `conn`. Unknown codes fail before anything is written;
/// the caller's transaction rolls back when dropped.
async fn grant_in(
    conn: &mut PgConnection,
    user_id: i64,
    codes: &[String],
) -> Result<(), AuthError> {
    let known: Vec<String> = sqlx::query_scalar("SELECT code FROM permissions WHERE code = ANY($1)")
        .bind(codes)
        .fetch_all(&mut *conn)
        .await?;

    let unknown: Vec<String> = codes
        .iter()
        .filter(|code| !known.contains(*code))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(AuthError::UnknownPermission(unknown));
    }

    sqlx::query(
        r#"
        INSERT INTO users_permissions (user_id, permission_id)
        SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(codes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_user_in(conn: &mut PgConnection, user: &User) -> Result<InsertedUser, AuthError> {
    let hash = user
        .password
        .hash()
        .ok_or(AuthError::Invariant("missing password hash for user"))?;

    let (id, created_at, version) = sqlx::query_as::<_, (i64, DateTime<Utc>, i32)>(
        r#"
        INSERT INTO users (name, email, password_hash, activated)
        VALUES ($1, $2, $3, $4)
        RETURNING id, created_at, version
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(hash)
    .bind(user.activated)
    .fetch_one(&mut *conn)
    .await
    .map_err(user_write_error)?;

    Ok(InsertedUser {
        id,
        created_at,
        version,
    })
}

async fn update_user_in(conn: &mut PgConnection, user: &User) -> Result<i32, AuthError> {
    let hash = user
        .password
        .hash()
        .ok_or(AuthError::Invariant("missing password hash for user"))?;

    // No row back means the version moved underneath us.
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE users
        SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
        WHERE id = $5 AND version = $6
        RETURNING version
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(hash)
    .bind(user.activated)
    .bind(user.id)
    .bind(user.version)
    .fetch_optional(&mut *conn)
    .await
    .map_err(user_write_error)?
    .ok_or(AuthError::EditConflict)
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<InsertedUser, AuthError> {
        let mut conn = self.pool.acquire().await?;
        insert_user_in(&mut conn, user).await
    }

    async fn user_by_email(&self, email: &str) -> Result<UserRow, AuthError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::NotFound)
    }

    async fn user_by_id(&self, id: i64) -> Result<UserRow, AuthError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::NotFound)
    }

    async fn update_user(&self, user: &User) -> Result<i32, AuthError> {
        let mut conn = self.pool.acquire().await?;
        update_user_in(&mut conn, user).await
    }

    async fn create_user(
        &self,
        user: &User,
        permissions: &[String],
        token: &TokenRecord,
    ) -> Result<InsertedUser, AuthError> {
        let mut tx = self.pool.begin().await?;

        let inserted = insert_user_in(&mut tx, user).await?;
        if !permissions.is_empty() {
            grant_in(&mut tx, inserted.id, permissions).await?;
        }
        sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
            .bind(&token.hash)
            .bind(inserted.id)
            .bind(token.expiry)
            .bind(&token.scope)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_user_revoking(&self, user: &User, scopes: &[&str]) -> Result<i32, AuthError> {
        let mut tx = self.pool.begin().await?;

        let version = update_user_in(&mut tx, user).await?;
        sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = ANY($2)")
            .bind(user.id)
            .bind(scopes)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(version)
    }
}
