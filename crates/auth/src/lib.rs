//! `retailops-auth` — authentication and role-gated authorization.
//!
//! Decoupled from HTTP and storage: the API layer decodes tokens through
//! [`JwtValidator`] and asks [`authorize`] / [`can_access_location`] before
//! dispatching anything.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{
    AuthorizationExplanation, AuthzError, CommandAuthorization, DenialKind, Principal,
    authorize, explain_authorization,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use policy::{can_access_location, permissions_for_roles, role_permissions};
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
