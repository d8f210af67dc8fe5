use std::time::Duration;

use service_core::error::AppError;
use thiserror::Error;

use crate::validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate email")]
    DuplicateEmail,

    #[error("Edit conflict")]
    EditConflict,

    /// Wrong password, unknown user, or an absent, expired or wrong-scope
    /// token. Deliberately carries no detail.
    #[error("Invalid authentication credentials")]
    AuthenticationFailure,

    #[error("Missing permission: {0}")]
    PermissionDenied(String),

    #[error("Account is not activated")]
    InactiveAccount,

    #[error("Unknown permission codes: {}", .0.join(", "))]
    UnknownPermission(Vec<String>),

    #[error("Store operation timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Store error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Secure random source unavailable: {0}")]
    RandomSource(#[source] rand::Error),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// A programming invariant was violated. Never reachable when upstream
    /// validation runs.
    #[error("Invariant violated: {0}")]
    Invariant(&'static str),
}

impl AuthError {
    /// Wrap a single field message as a validation failure.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AuthError::Validation(errors)
    }

    /// True for faults of the store or the platform rather than the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AuthError::StoreTimeout(_)
                | AuthError::Persistence(_)
                | AuthError::RandomSource(_)
                | AuthError::Hashing(_)
                | AuthError::Invariant(_)
        )
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(errors) => AppError::ValidationError(errors),
            AuthError::NotFound => AppError::NotFound(anyhow::anyhow!(
                "the requested resource could not be found"
            )),
            AuthError::DuplicateEmail => AppError::Conflict(anyhow::anyhow!(
                "a user with this email address already exists"
            )),
            AuthError::EditConflict => AppError::Conflict(anyhow::anyhow!(
                "unable to update the record due to an edit conflict, please try again"
            )),
            AuthError::AuthenticationFailure => AppError::Unauthorized(anyhow::anyhow!(
                "invalid or missing authentication credentials"
            )),
            AuthError::PermissionDenied(_) => AppError::Forbidden(anyhow::anyhow!(
                "your user account doesn't have the necessary permissions to access this resource"
            )),
            AuthError::InactiveAccount => AppError::Forbidden(anyhow::anyhow!(
                "your user account must be activated to access this resource"
            )),
            AuthError::UnknownPermission(codes) => AppError::BadRequest(anyhow::anyhow!(
                "unknown permission codes: {}",
                codes.join(", ")
            )),
            AuthError::StoreTimeout(limit) => {
                AppError::DatabaseError(anyhow::anyhow!("store timed out after {:?}", limit))
            }
            AuthError::Persistence(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            AuthError::RandomSource(e) => {
                AppError::InternalError(anyhow::anyhow!("random source unavailable: {}", e))
            }
            AuthError::Hashing(e) => {
                AppError::InternalError(anyhow::anyhow!("password hashing failed: {}", e))
            }
            AuthError::Invariant(what) => {
                tracing::error!(invariant = what, "Invariant violation");
                AppError::InternalError(anyhow::anyhow!("invariant violated: {}", what))
            }
        }
    }
}
