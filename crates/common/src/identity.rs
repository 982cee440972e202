//! Caller identity propagated to every downstream call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::UserId;

/// Metadata key carrying the caller's user id.
pub const USER_ID_KEY: &str = "x-user-id";
/// Metadata key carrying the caller's role.
pub const USER_ROLE_KEY: &str = "x-user-role";

/// Outgoing call metadata (lower-case keys).
pub type Metadata = BTreeMap<String, String>;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Bypasses ownership checks.
    Admin,
    /// Restricted to its own user id.
    #[default]
    User,
}

impl Role {
    /// Parses a role string; anything other than `"admin"` is a plain user.
    pub fn parse(role: &str) -> Self {
        if role == "admin" { Role::Admin } else { Role::User }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated `(user id, role)` pair of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id.into(), Role::User)
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id.into(), Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on anyone; everybody else only on themselves.
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }

    /// Fails with `Forbidden` unless [`Identity::can_access`] holds.
    pub fn ensure_access(&self, owner: UserId) -> Result<(), ServiceError> {
        if self.can_access(owner) {
            Ok(())
        } else {
            Err(ServiceError::forbidden("FORBIDDEN: Access denied"))
        }
    }

    /// Writes the identity into outgoing metadata.
    pub fn write_to(&self, metadata: &mut Metadata) {
        metadata.insert(USER_ID_KEY.to_string(), self.user_id.to_string());
        metadata.insert(USER_ROLE_KEY.to_string(), self.role.as_str().to_string());
    }

    /// Reads the identity from incoming metadata.
    ///
    /// A missing or malformed user id is an authentication failure, not bad input.
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, ServiceError> {
        let raw = metadata.get(USER_ID_KEY).ok_or_else(|| {
            ServiceError::unauthenticated("UNAUTHORIZED: x-user-id header is missing")
        })?;
        let id: i64 = raw.trim().parse().map_err(|e| {
            ServiceError::unauthenticated(format!("UNAUTHORIZED: invalid x-user-id header: {e}"))
        })?;
        let role = metadata
            .get(USER_ROLE_KEY)
            .map(|r| Role::parse(r))
            .unwrap_or_default();
        Ok(Self::new(UserId::new(id), role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn metadata_roundtrip() {
        let mut md = Metadata::new();
        Identity::admin(7).write_to(&mut md);
        assert_eq!(md.get(USER_ID_KEY).map(String::as_str), Some("7"));
        assert_eq!(md.get(USER_ROLE_KEY).map(String::as_str), Some("admin"));
        assert_eq!(Identity::from_metadata(&md).unwrap(), Identity::admin(7));
    }

    #[test]
    fn missing_user_id_is_unauthenticated() {
        let err = Identity::from_metadata(&Metadata::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn malformed_user_id_is_unauthenticated() {
        let mut md = Metadata::new();
        md.insert(USER_ID_KEY.to_string(), "abc".to_string());
        let err = Identity::from_metadata(&md).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn missing_or_unknown_role_is_user() {
        let mut md = Metadata::new();
        md.insert(USER_ID_KEY.to_string(), "3".to_string());
        assert_eq!(Identity::from_metadata(&md).unwrap().role, Role::User);
        md.insert(USER_ROLE_KEY.to_string(), "superuser".to_string());
        assert_eq!(Identity::from_metadata(&md).unwrap().role, Role::User);
    }

    #[test]
    fn ownership_rule() {
        let alice = Identity::user(1);
        assert!(alice.can_access(UserId::new(1)));
        assert!(!alice.can_access(UserId::new(2)));
        assert!(Identity::admin(9).can_access(UserId::new(2)));
        assert_eq!(
            alice.ensure_access(UserId::new(2)).unwrap_err().kind(),
            ErrorKind::Forbidden
        );
    }
}
