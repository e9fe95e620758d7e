//! Built-in role policy for the retail tenant.
//!
//! - `admin`: everything (`*`)
//! - `manager`: every module, every location, tenant-wide dashboard
//! - `shopkeeper`: till operations at assigned shops
//! - `warehouse`: stock-in, transfers and stock levels at assigned warehouses

use retailops_core::AggregateId;

use crate::{Permission, Role};

/// Permission names used by the API handlers.
pub mod perms {
    pub const LOCATIONS_READ: &str = "locations.read";
    pub const LOCATIONS_WRITE: &str = "locations.write";
    /// Access to every shop and warehouse regardless of assignment.
    pub const LOCATIONS_ALL: &str = "locations.all";

    pub const PRODUCTS_READ: &str = "products.read";
    pub const PRODUCTS_WRITE: &str = "products.write";

    pub const INVENTORY_READ: &str = "inventory.read";
    pub const INVENTORY_WRITE: &str = "inventory.write";

    pub const SALES_READ: &str = "sales.read";
    pub const SALES_CREATE: &str = "sales.create";
    pub const SALES_VOID: &str = "sales.void";

    pub const INVOICES_READ: &str = "invoices.read";
    pub const INVOICES_WRITE: &str = "invoices.write";

    pub const TRANSFERS_READ: &str = "transfers.read";
    pub const TRANSFERS_WRITE: &str = "transfers.write";

    pub const DASHBOARD_GLOBAL: &str = "dashboard.global";
    pub const DASHBOARD_SHOP: &str = "dashboard.shop";
    pub const DASHBOARD_WAREHOUSE: &str = "dashboard.warehouse";

    pub const INSIGHTS_READ: &str = "insights.read";
}

use perms::*;

const MANAGER: &[&str] = &[
    LOCATIONS_READ,
    LOCATIONS_WRITE,
    LOCATIONS_ALL,
    PRODUCTS_READ,
    PRODUCTS_WRITE,
    INVENTORY_READ,
    INVENTORY_WRITE,
    SALES_READ,
    SALES_CREATE,
    SALES_VOID,
    INVOICES_READ,
    INVOICES_WRITE,
    TRANSFERS_READ,
    TRANSFERS_WRITE,
    DASHBOARD_GLOBAL,
    INSIGHTS_READ,
];

const SHOPKEEPER: &[&str] = &[
    SALES_READ,
    SALES_CREATE,
    PRODUCTS_READ,
    INVENTORY_READ,
    LOCATIONS_READ,
    DASHBOARD_SHOP,
    INSIGHTS_READ,
];

const WAREHOUSE: &[&str] = &[
    INVENTORY_READ,
    INVENTORY_WRITE,
    PRODUCTS_READ,
    INVOICES_READ,
    INVOICES_WRITE,
    TRANSFERS_READ,
    TRANSFERS_WRITE,
    LOCATIONS_READ,
    DASHBOARD_WAREHOUSE,
];

/// Permissions granted by one role. Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> Vec<String> {
    let granted: &[&str] = match role {
        Role::ADMIN => &[Permission::WILDCARD],
        Role::MANAGER => MANAGER,
        Role::SHOPKEEPER => SHOPKEEPER,
        Role::WAREHOUSE => WAREHOUSE,
        _ => &[],
    };
    granted.iter().map(|p| p.to_string()).collect()
}

/// Sorted, de-duplicated union of the permissions of `roles`.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut names: Vec<String> = roles
        .iter()
        .flat_map(|r| role_permissions(r.as_str()))
        .collect();
    names.sort();
    names.dedup();
    names.into_iter().map(Permission::new).collect()
}

/// Whether a principal holding `permissions` and assigned to `assigned` may
/// act on `location`.
pub fn can_access_location(
    permissions: &[Permission],
    assigned: &[AggregateId],
    location: AggregateId,
) -> bool {
    if permissions
        .iter()
        .any(|p| p.is_wildcard() || p.as_str() == LOCATIONS_ALL)
    {
        return true;
    }
    assigned.contains(&location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(perms: &[Permission], name: &str) -> bool {
        perms.iter().any(|p| p.as_str() == name)
    }

    #[test]
    fn admin_is_wildcard() {
        assert_eq!(role_permissions("admin"), vec!["*".to_string()]);
    }

    #[test]
    fn shopkeeper_sells_but_cannot_void_or_receive() {
        let perms = permissions_for_roles(&[Role::new("shopkeeper")]);
        assert!(has(&perms, SALES_CREATE));
        assert!(!has(&perms, SALES_VOID));
        assert!(!has(&perms, INVOICES_WRITE));
        assert!(has(&perms, DASHBOARD_SHOP));
    }

    #[test]
    fn warehouse_receives_but_cannot_sell() {
        let perms = permissions_for_roles(&[Role::new("warehouse")]);
        assert!(has(&perms, INVOICES_WRITE));
        assert!(has(&perms, TRANSFERS_WRITE));
        assert!(!has(&perms, SALES_CREATE));
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let perms = permissions_for_roles(&[Role::new("shopkeeper"), Role::new("warehouse")]);
        let names: Vec<&str> = perms.iter().map(|p| p.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert_eq!(names.iter().filter(|n| **n == PRODUCTS_READ).count(), 1);
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(permissions_for_roles(&[Role::new("intern")]).is_empty());
    }

    #[test]
    fn location_access_follows_assignment() {
        let shop = AggregateId::new();
        let other = AggregateId::new();
        let shopkeeper = permissions_for_roles(&[Role::new("shopkeeper")]);
        let manager = permissions_for_roles(&[Role::new("manager")]);

        assert!(can_access_location(&shopkeeper, &[shop], shop));
        assert!(!can_access_location(&shopkeeper, &[shop], other));
        assert!(can_access_location(&manager, &[], other));
        assert!(can_access_location(&[Permission::new("*")], &[], other));
    }
}
