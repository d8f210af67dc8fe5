//! Account flows built on the user, token and permission services.
//!
//! Each method maps to one request the HTTP layer would serve: register,
//! activate, sign in, authenticate a bearer, authorize, log out, and the
//! two halves of a password reset.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::models::{
    validate_email, validate_name, validate_password_plaintext, validate_token_plaintext, Scope,
    Token, User,
};
use crate::services::{PermissionService, TokenService, UserService};
use crate::store::{PermissionStore, TokenStore, UserStore};
use crate::utils::Password;
use crate::validator::Validator;

/// Plaintext behind the hash verified when a sign-in names no known user.
const DUMMY_PASSWORD: &str = "unknown-account-placeholder";

/// A freshly registered, not yet activated user and the token that
/// activates it. The token is meant for the user's inbox only.
#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub activation_token: Token,
}

#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    tokens: TokenService,
    permissions: PermissionService,
    settings: Arc<AuthSettings>,
    dummy_password: Arc<OnceCell<Password>>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        permissions: Arc<dyn PermissionStore>,
        settings: AuthSettings,
    ) -> Self {
        let timeout = settings.store_timeout;
        let token_service = TokenService::new(tokens, timeout);

        Self {
            users: UserService::new(users, token_service.clone(), timeout),
            tokens: token_service,
            permissions: PermissionService::new(permissions, timeout),
            settings: Arc::new(settings),
            dummy_password: Arc::new(OnceCell::new()),
        }
    }

    /// Build every service on top of one store implementing all contracts.
    pub fn from_store<S>(store: Arc<S>, settings: AuthSettings) -> Self
    where
        S: UserStore + TokenStore + PermissionStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, settings)
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Registration, AuthError> {
        let mut v = Validator::new();
        validate_name(&mut v, name);
        validate_email(&mut v, email);
        validate_password_plaintext(&mut v, password);
        v.into_result()?;

        let mut user = User::new(name, email);
        user.password.set(password, &self.settings.password)?;

        let mut defaults: Vec<String> = Vec::new();
        for code in &self.settings.default_permissions {
            if !defaults.contains(code) {
                defaults.push(code.clone());
            }
        }

        // The user id is not known yet; create binds the token to it.
        let mut activation_token =
            Token::generate(0, self.settings.tokens.activation_ttl, Scope::Activation)?;
        self.users
            .create(&mut user, &defaults, &mut activation_token)
            .await?;
        user.password.forget_plaintext();

        tracing::info!(user_id = user.id, permissions = ?defaults, "User registered");

        Ok(Registration {
            user,
            activation_token,
        })
    }

    /// Mark the owner of an activation token as activated and revoke every
    /// activation token it holds.
    pub async fn activate(&self, token_plaintext: &str) -> Result<User, AuthError> {
        let mut user = match self
            .users
            .get_for_token(Scope::Activation, token_plaintext)
            .await
        {
            Ok(user) => user,
            Err(AuthError::AuthenticationFailure) => {
                return Err(AuthError::field(
                    "token",
                    "invalid or expired activation token",
                ))
            }
            Err(e) => return Err(e),
        };

        user.activated = true;
        self.users
            .update_revoking(&mut user, &[Scope::Activation])
            .await?;

        tracing::info!(user_id = user.id, "User activated");
        Ok(user)
    }

    /// Exchange an email and password for an authentication token.
    pub async fn create_authentication_token(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Token, AuthError> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        validate_password_plaintext(&mut v, password);
        v.into_result()?;

        let user = match self.users.get_by_email(email).await {
            Ok(user) => user,
            Err(AuthError::NotFound) => {
                // Spend the same hashing work as a real mismatch.
                self.dummy_password()?.matches(password)?;
                return Err(AuthError::AuthenticationFailure);
            }
            Err(e) => return Err(e),
        };

        if !user.password.matches(password)? {
            tracing::info!(user_id = user.id, "Failed sign-in attempt");
            return Err(AuthError::AuthenticationFailure);
        }

        self.tokens
            .new_token(
                user.id,
                self.settings.tokens.authentication_ttl,
                Scope::Authentication,
            )
            .await
    }

    /// Resolve a bearer token to its user. Any token problem is an
    /// authentication failure.
    pub async fn authenticate(&self, token_plaintext: &str) -> Result<User, AuthError> {
        match self
            .users
            .get_for_token(Scope::Authentication, token_plaintext)
            .await
        {
            Err(AuthError::Validation(_)) => Err(AuthError::AuthenticationFailure),
            other => other,
        }
    }

    /// Like [`authenticate`](Self::authenticate), starting from an
    /// `Authorization` header value.
    pub async fn authenticate_header(&self, header: &str) -> Result<User, AuthError> {
        let token = bearer_token(header).ok_or(AuthError::AuthenticationFailure)?;
        self.authenticate(token).await
    }

    /// The user must be activated and hold `code`.
    pub async fn require_permission(&self, user: &User, code: &str) -> Result<(), AuthError> {
        if !user.activated {
            return Err(AuthError::InactiveAccount);
        }

        let permissions = self.permissions.get_all_for_user(user.id).await?;
        permissions.require(code).inspect_err(|_| {
            tracing::info!(user_id = user.id, permission = code, "Permission denied");
        })
    }

    /// Revoke every authentication token of `user_id`.
    pub async fn logout(&self, user_id: i64) -> Result<(), AuthError> {
        self.tokens
            .delete_all_for_user(Scope::Authentication, user_id)
            .await?;
        tracing::info!(user_id, "User logged out");
        Ok(())
    }

    /// Issue a password-reset token for an activated account.
    ///
    /// Unknown and not yet activated accounts yield `Ok(None)`, so callers
    /// answer every well-formed request the same way.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<Token>, AuthError> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        v.into_result()?;

        let user = match self.users.get_by_email(email).await {
            Ok(user) => user,
            Err(AuthError::NotFound) => {
                tracing::debug!("Password reset requested for unknown email");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !user.activated {
            tracing::info!(user_id = user.id, "Password reset requested for inactive account");
            return Ok(None);
        }

        let token = self
            .tokens
            .new_token(
                user.id,
                self.settings.tokens.password_reset_ttl,
                Scope::PasswordReset,
            )
            .await?;
        Ok(Some(token))
    }

    /// Set a new password for the owner of a password-reset token. All of
    /// the user's password-reset and authentication tokens are revoked.
    pub async fn reset_password(
        &self,
        token_plaintext: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, new_password);
        validate_token_plaintext(&mut v, token_plaintext);
        v.into_result()?;

        let mut user = match self
            .users
            .get_for_token(Scope::PasswordReset, token_plaintext)
            .await
        {
            Ok(user) => user,
            Err(AuthError::AuthenticationFailure) => {
                return Err(AuthError::field(
                    "token",
                    "invalid or expired password reset token",
                ))
            }
            Err(e) => return Err(e),
        };

        user.password.set(new_password, &self.settings.password)?;
        self.users
            .update_revoking(&mut user, &[Scope::PasswordReset, Scope::Authentication])
            .await?;
        user.password.forget_plaintext();

        tracing::info!(user_id = user.id, "Password reset");
        Ok(user)
    }
}

impl AuthService {
    /// Hash checked against when the account does not exist. Built on first
    /// use with the configured cost.
    fn dummy_password(&self) -> Result<&Password, AuthError> {
        self.dummy_password.get_or_try_init(|| {
            let mut password = Password::default();
            password.set(DUMMY_PASSWORD, &self.settings.password)?;
            password.forget_plaintext();
            Ok(password)
        })
    }
}

/// Token part of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
