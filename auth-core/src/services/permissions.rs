use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::error::AuthError;
use crate::models::Permissions;
use crate::store::{timed, PermissionStore};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn PermissionStore>,
    timeout: Duration,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PermissionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Codes granted to `user_id`. No grants is an empty set, not an error.
    #[instrument(skip(self))]
    pub async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, AuthError> {
        let codes = timed(
            self.timeout,
            "permissions_for_user",
            self.store.permissions_for_user(user_id),
        )
        .await?;

        Ok(codes.into_iter().collect())
    }

    /// Grant `codes` in one atomic step. Unknown codes fail the whole call.
    #[instrument(skip(self))]
    pub async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), AuthError> {
        let mut unique: Vec<String> = Vec::with_capacity(codes.len());
        for code in codes {
            if !unique.iter().any(|c| c.as_str() == *code) {
                unique.push(code.to_string());
            }
        }
        if unique.is_empty() {
            return Ok(());
        }

        timed(
            self.timeout,
            "grant_permissions",
            self.store.grant_permissions(user_id, &unique),
        )
        .await
        .inspect_err(|e| {
            if let AuthError::UnknownPermission(unknown) = e {
                tracing::warn!(user_id, ?unknown, "Rejected grant of unknown permissions");
            }
        })?;

        tracing::info!(user_id, codes = ?unique, "Permissions granted");
        Ok(())
    }
}
