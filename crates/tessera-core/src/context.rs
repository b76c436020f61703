use crate::error::TesseraError;
use serde::{Deserialize, Serialize};

/// Permissions this layer cares about. The identity subsystem resolves them;
/// we only check membership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageFinances,
    ManageEvents,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageFinances => "manage_finances",
            Self::ManageEvents => "manage_events",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "manage_finances" => Some(Self::ManageFinances),
            "manage_events" => Some(Self::ManageEvents),
            _ => None,
        }
    }
}

/// Resolved caller identity passed explicitly into every operation.
///
/// Ambient session state is deliberately absent so operations stay
/// deterministic under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerContext {
    pub caller_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<Permission>,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), TesseraError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(TesseraError::PermissionDenied(format!(
                "caller '{}' lacks '{}'",
                self.caller_id,
                permission.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_checks_membership() {
        let ctx = CallerContext::new("admin-1")
            .with_permissions(vec![Permission::ManageFinances]);

        assert!(ctx.require(Permission::ManageFinances).is_ok());
        assert!(matches!(
            ctx.require(Permission::ManageEvents),
            Err(TesseraError::PermissionDenied(_))
        ));
    }

    #[test]
    fn permission_string_roundtrip() {
        for permission in [Permission::ManageFinances, Permission::ManageEvents] {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::parse("manage_everything"), None);
    }
}
