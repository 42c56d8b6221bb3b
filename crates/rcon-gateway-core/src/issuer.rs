//! Issuer identity attached to commands
//!
//! The pool never inspects these; they exist so the surrounding application
//! can attribute command output to whoever requested it.

use serde::{Deserialize, Serialize};

/// User roles with hierarchical permissions
///
/// Lower values outrank higher ones: `Owner` may do anything `Admin` may,
/// and `Admin` anything `User` may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    User,
}

impl Role {
    /// Check whether this role has permission for an action gated on `required`
    pub fn check_permission(self, required: Role) -> bool {
        self <= required
    }
}

/// The user a command was issued on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub username: String,
    pub role: Role,
}

impl Issuer {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_hierarchical() {
        assert!(Role::Owner.check_permission(Role::Admin));
        assert!(Role::Admin.check_permission(Role::Admin));
        assert!(Role::Admin.check_permission(Role::User));
        assert!(!Role::User.check_permission(Role::Admin));
        assert!(!Role::Admin.check_permission(Role::Owner));
    }

    #[test]
    fn issuer_serializes_with_lowercase_role() {
        let issuer = Issuer::new("alex", Role::Admin);
        let json = serde_json::to_string(&issuer).unwrap();
        assert_eq!(json, r#"{"username":"alex","role":"admin"}"#);

        let parsed: Issuer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, issuer);
    }
}
