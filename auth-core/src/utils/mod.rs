pub mod encoding;
pub mod password;

pub use encoding::base32_unpadded;
pub use password::{Password, PasswordConfig};
