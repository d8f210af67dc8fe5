use std::collections::HashSet;

use crate::error::AuthError;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Permission codes held by one user, fetched once per authorization check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    /// `Ok(())` when `code` is held, otherwise [`AuthError::PermissionDenied`].
    pub fn require(&self, code: &str) -> Result<(), AuthError> {
        if self.includes(code) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(code.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_permissions_include_nothing() {
        let permissions = Permissions::default();
        assert!(permissions.is_empty());
        assert!(!permissions.includes(MOVIES_WRITE));
        assert!(matches!(
            permissions.require(MOVIES_WRITE),
            Err(AuthError::PermissionDenied(code)) if code == MOVIES_WRITE
        ));
    }

    #[test]
    fn test_includes_exact_codes_only() {
        let permissions: Permissions = vec![MOVIES_READ.to_string()].into_iter().collect();

        assert!(permissions.includes(MOVIES_READ));
        assert!(!permissions.includes(MOVIES_WRITE));
        assert!(!permissions.includes("movies"));
        assert!(permissions.require(MOVIES_READ).is_ok());
    }

    #[test]
    fn test_duplicates_collapse() {
        let permissions: Permissions = vec![
            MOVIES_READ.to_string(),
            MOVIES_READ.to_string(),
            MOVIES_WRITE.to_string(),
        ]
        .into_iter()
        .collect();

        assert_eq!(permissions.len(), 2);
        let mut codes: Vec<&str> = permissions.iter().collect();
        codes.sort_unstable();
        assert_eq!(codes, vec![MOVIES_READ, MOVIES_WRITE]);
    }
}
