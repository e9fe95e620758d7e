use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use retailops_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: no access to location {0}")]
    LocationForbidden(String),
}

/// Permissions a command needs before it may be dispatched.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active tenant.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Audit view of one authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    TenantMismatch,
    MissingPermission,
}

/// Explain why `required` would be granted or denied.
///
/// Effective permissions are the union of what `role_permissions` yields for
/// each role and the membership's explicit permissions.
pub fn explain_authorization<F>(
    principal: &Principal,
    required: &Permission,
    role_permissions: F,
) -> AuthorizationExplanation
where
    F: Fn(&str) -> Vec<String>,
{
    let required_str = required.as_str().to_string();
    let roles: Vec<String> = principal
        .membership
        .roles
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();

    let mut effective: HashSet<String> = roles.iter().flat_map(|r| role_permissions(r.as_str())).collect();
    effective.extend(principal.membership.permissions.iter().map(|p| p.as_str().to_string()));
    let mut effective_permissions: Vec<String> = effective.into_iter().collect();
    effective_permissions.sort();

    if principal.active_tenant_id != principal.membership.tenant_id {
        return AuthorizationExplanation {
            reason: format!(
                "principal is active in tenant {} but member of tenant {}",
                principal.active_tenant_id, principal.membership.tenant_id
            ),
            required_permission: required_str,
            granted: false,
            roles,
            effective_permissions,
            denial: Some(DenialKind::TenantMismatch),
        };
    }

    let wildcard = effective_permissions.iter().any(|p| p == Permission::WILDCARD);
    let exact = effective_permissions.iter().any(|p| *p == required_str);

    let (granted, reason, denial) = if wildcard {
        (true, "granted by wildcard permission '*'".to_string(), None)
    } else if exact {
        (true, format!("granted by permission '{required_str}'"), None)
    } else {
        (
            false,
            format!("missing permission '{required_str}'"),
            Some(DenialKind::MissingPermission),
        )
    };

    AuthorizationExplanation {
        required_permission: required_str,
        granted,
        reason,
        roles,
        effective_permissions,
        denial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, policy};

    fn principal(roles: &[&'static str]) -> Principal {
        let tenant_id = TenantId::new();
        let roles: Vec<Role> = roles.iter().map(|r| Role::new(*r)).collect();
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                permissions: policy::permissions_for_roles(&roles),
                roles,
            },
        }
    }

    #[test]
    fn exact_and_wildcard_grant() {
        assert!(authorize(&principal(&["shopkeeper"]), &Permission::new("sales.create")).is_ok());
        assert!(authorize(&principal(&["admin"]), &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let err = authorize(&principal(&["shopkeeper"]), &Permission::new("invoices.write")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("invoices.write".to_string()));
    }

    #[test]
    fn tenant_mismatch_wins_over_wildcard() {
        let mut p = principal(&["admin"]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&p, &Permission::new("sales.read")),
            Err(AuthzError::TenantMismatch)
        );
    }

    #[test]
    fn explanation_lists_effective_permissions() {
        let p = principal(&["warehouse"]);
        let denied = explain_authorization(&p, &Permission::new("sales.create"), policy::role_permissions);
        assert!(!denied.granted);
        assert_eq!(denied.denial, Some(DenialKind::MissingPermission));
        assert!(denied.effective_permissions.contains(&"invoices.write".to_string()));

        let granted = explain_authorization(&p, &Permission::new("invoices.write"), policy::role_permissions);
        assert!(granted.granted);
        assert!(granted.denial.is_none());
    }
}
