pub mod filters;
pub mod permission;
pub mod token;
pub mod user;

pub use filters::{calculate_metadata, validate_filters, Filters, Metadata, SortDirection};
pub use permission::Permissions;
pub use token::{hash_token, validate_token_plaintext, Scope, Token, TokenRecord};
pub use user::{
    validate_email, validate_name, validate_password_plaintext, validate_user, InsertedUser, User,
    UserRow,
};
