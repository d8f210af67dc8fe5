//! Services layer.
//!
//! Business logic on top of the store traits. Every store round trip is
//! bounded by the configured store timeout.

pub mod auth;
mod permissions;
mod tokens;
mod users;

pub use auth::{bearer_token, AuthService, Registration};
pub use permissions::PermissionService;
pub use tokens::TokenService;
pub use users::UserService;
