use retailops_auth::{Permission, PrincipalId, Role};
use retailops_core::{AggregateId, TenantId};

/// Tenant of the request, taken from the verified token.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated identity: roles, the permissions they resolve to and the
/// locations the principal is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    locations: Vec<AggregateId>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>, locations: Vec<AggregateId>) -> Self {
        let permissions = retailops_auth::permissions_for_roles(&roles);
        Self {
            principal_id,
            roles,
            permissions,
            locations,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn locations(&self) -> &[AggregateId] {
        &self.locations
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.is_wildcard() || p.as_str() == name)
    }
}
