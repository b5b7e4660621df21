//--------------------------------------------------------------------------------------------------
// Static role lookup
//--------------------------------------------------------------------------------------------------

// Role ids are assigned by the auth service. Anything this table doesn't know about resolves to
// UNKNOWN_ROLE_NAME and carries no permissions.
//
// These lookups only decide what the UI offers. The server re-checks every request.

pub const UNKNOWN_ROLE_NAME: &str = "Unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Doctor,
    FrontDesk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    RegisterPatients,
    CreateTickets,
    ManageQueue,
    AuthorMedicalRecords,
    ViewBilling,
    ManageStaff,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::RegisterPatients,
    Permission::CreateTickets,
    Permission::ManageQueue,
    Permission::AuthorMedicalRecords,
    Permission::ViewBilling,
    Permission::ManageStaff,
];

const DOCTOR_PERMISSIONS: &[Permission] = &[
    Permission::ManageQueue,
    Permission::AuthorMedicalRecords,
];

const FRONT_DESK_PERMISSIONS: &[Permission] = &[
    Permission::RegisterPatients,
    Permission::CreateTickets,
    Permission::ManageQueue,
    Permission::ViewBilling,
];

impl Role {
    pub fn from_id(role_id: i64) -> Option<Self> {
        match role_id {
            1 => Some(Role::Admin),
            2 => Some(Role::Doctor),
            3 => Some(Role::FrontDesk),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Role::Admin => 1,
            Role::Doctor => 2,
            Role::FrontDesk => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Doctor => "Doctor",
            Role::FrontDesk => "Front Desk",
        }
    }

    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Doctor => DOCTOR_PERMISSIONS,
            Role::FrontDesk => FRONT_DESK_PERMISSIONS,
        }
    }
}

pub fn role_name(role_id: i64) -> &'static str {
    Role::from_id(role_id).map_or(UNKNOWN_ROLE_NAME, Role::name)
}

pub fn has_permission(role_id: i64, permission: Permission) -> bool {
    Role::from_id(role_id).is_some_and(|role| role.permissions().contains(&permission))
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_have_a_placeholder_name_and_no_permissions() {
        assert_eq!(role_name(99), UNKNOWN_ROLE_NAME);
        assert!(!has_permission(99, Permission::ManageQueue));
    }

    #[test]
    fn doctors_author_records_but_do_not_register_patients() {
        let doctor = Role::Doctor.id();
        assert_eq!(role_name(doctor), "Doctor");
        assert!(has_permission(doctor, Permission::AuthorMedicalRecords));
        assert!(!has_permission(doctor, Permission::RegisterPatients));
    }
}
