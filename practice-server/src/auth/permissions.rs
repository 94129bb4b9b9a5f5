//! Permission Definitions
//!
//! Role based: each staff role maps to a fixed permission set that is
//! embedded in the access token at login.

use shared::models::Role;

pub const PATIENTS_READ: &str = "patients:read";
pub const PATIENTS_WRITE: &str = "patients:write";
pub const CLINICAL_READ: &str = "clinical:read";
pub const CLINICAL_WRITE: &str = "clinical:write";
pub const ORDERS_WRITE: &str = "orders:write";
pub const BILLING_READ: &str = "billing:read";
pub const BILLING_WRITE: &str = "billing:write";
pub const CATALOG_WRITE: &str = "catalog:write";
pub const SCHEDULING_WRITE: &str = "scheduling:write";
pub const TASKS_WRITE: &str = "tasks:write";
pub const TICKETS_WRITE: &str = "tickets:write";
pub const FORMS_WRITE: &str = "forms:write";
pub const USERS_MANAGE: &str = "users:manage";
pub const AUDIT_READ: &str = "audit:read";

/// Every assignable permission
pub const ALL_PERMISSIONS: &[&str] = &[
    PATIENTS_READ,
    PATIENTS_WRITE,
    CLINICAL_READ,
    CLINICAL_WRITE,
    ORDERS_WRITE,
    BILLING_READ,
    BILLING_WRITE,
    CATALOG_WRITE,
    SCHEDULING_WRITE,
    TASKS_WRITE,
    TICKETS_WRITE,
    FORMS_WRITE,
    USERS_MANAGE,
    AUDIT_READ,
];

pub const ADMIN_PERMISSIONS: &[&str] = &["all"];

pub const CLINICIAN_PERMISSIONS: &[&str] = &[
    PATIENTS_READ,
    PATIENTS_WRITE,
    CLINICAL_READ,
    CLINICAL_WRITE,
    ORDERS_WRITE,
    SCHEDULING_WRITE,
    TASKS_WRITE,
    TICKETS_WRITE,
    FORMS_WRITE,
    BILLING_READ,
];

pub const FRONT_DESK_PERMISSIONS: &[&str] = &[
    PATIENTS_READ,
    PATIENTS_WRITE,
    SCHEDULING_WRITE,
    TASKS_WRITE,
    TICKETS_WRITE,
    BILLING_READ,
];

pub const BILLING_PERMISSIONS: &[&str] = &[
    PATIENTS_READ,
    BILLING_READ,
    BILLING_WRITE,
    CATALOG_WRITE,
    TASKS_WRITE,
    TICKETS_WRITE,
];

/// Permissions granted to a role
pub fn permissions_for(role: Role) -> Vec<String> {
    let set = match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Clinician => CLINICIAN_PERMISSIONS,
        Role::FrontDesk => FRONT_DESK_PERMISSIONS,
        Role::Billing => BILLING_PERMISSIONS,
    };
    set.iter().map(|s| s.to_string()).collect()
}

/// Known permission, `all`, or a `module:*` wildcard
pub fn is_valid_permission(permission: &str) -> bool {
    permission == "all"
        || ALL_PERMISSIONS.contains(&permission)
        || permission.strip_suffix(":*").is_some_and(|module| {
            ALL_PERMISSIONS
                .iter()
                .any(|p| p.split(':').next() == Some(module))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_sets_only_hold_known_permissions() {
        for role in [Role::Admin, Role::Clinician, Role::FrontDesk, Role::Billing] {
            for p in permissions_for(role) {
                assert!(is_valid_permission(&p), "{role}: {p}");
            }
        }
    }

    #[test]
    fn front_desk_cannot_touch_billing_or_clinical() {
        let perms = permissions_for(Role::FrontDesk);
        assert!(!perms.iter().any(|p| p == BILLING_WRITE));
        assert!(!perms.iter().any(|p| p == CLINICAL_READ));
    }

    #[test]
    fn wildcards() {
        assert!(is_valid_permission("patients:*"));
        assert!(!is_valid_permission("inventory:*"));
        assert!(!is_valid_permission("patients:delete"));
    }
}
