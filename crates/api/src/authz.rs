//! Role gating at the handler boundary, before anything is dispatched.

use retailops_auth::{AuthzError, Permission, Principal, TenantMembership, authorize, can_access_location};
use retailops_core::AggregateId;

use crate::context::{PrincipalContext, TenantContext};

/// Require `permission` in the request's tenant.
pub fn require(tenant: &TenantContext, principal: &PrincipalContext, permission: &'static str) -> Result<(), AuthzError> {
    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership: TenantMembership {
            tenant_id: tenant.tenant_id(),
            roles: principal.roles().to_vec(),
            permissions: principal.permissions().to_vec(),
        },
    };
    authorize(&principal, &Permission::new(permission))
}

/// Require `permission` and access to `location`.
pub fn require_at(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &'static str,
    location: AggregateId,
) -> Result<(), AuthzError> {
    require(tenant, principal, permission)?;
    require_location(principal, location)
}

pub fn require_location(principal: &PrincipalContext, location: AggregateId) -> Result<(), AuthzError> {
    if can_access_location(principal.permissions(), principal.locations(), location) {
        Ok(())
    } else {
        Err(AuthzError::LocationForbidden(location.to_string()))
    }
}

/// Whether the principal may see every location of the tenant.
pub fn sees_all_locations(principal: &PrincipalContext) -> bool {
    principal.has_permission(retailops_auth::policy::perms::LOCATIONS_ALL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retailops_auth::{PrincipalId, Role};
    use retailops_core::TenantId;

    fn principal(role: &'static str, locations: Vec<AggregateId>) -> PrincipalContext {
        PrincipalContext::new(PrincipalId::new(), vec![Role::new(role)], locations)
    }

    #[test]
    fn shopkeeper_sells_only_at_assigned_shops() {
        let tenant = TenantContext::new(TenantId::new());
        let (mine, other) = (AggregateId::new(), AggregateId::new());
        let p = principal("shopkeeper", vec![mine]);

        assert!(require_at(&tenant, &p, "sales.create", mine).is_ok());
        assert!(matches!(
            require_at(&tenant, &p, "sales.create", other),
            Err(AuthzError::LocationForbidden(_))
        ));
        assert!(matches!(require(&tenant, &p, "invoices.write"), Err(AuthzError::Forbidden(_))));
    }

    #[test]
    fn manager_reaches_every_location() {
        let tenant = TenantContext::new(TenantId::new());
        let p = principal("manager", vec![]);
        assert!(sees_all_locations(&p));
        assert!(require_at(&tenant, &p, "invoices.write", AggregateId::new()).is_ok());
    }
}
