//! auth-core: credentials, bearer tokens, permission grants and request
//! validation.
//!
//! Every store-touching operation goes through the traits in [`store`], so a
//! Postgres pool and the in-memory store are interchangeable.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
pub mod validator;

pub use bootstrap::{bootstrap, Bootstrapped};
pub use error::AuthError;
pub use services::{AuthService, PermissionService, TokenService, UserService};
pub use validator::Validator;
