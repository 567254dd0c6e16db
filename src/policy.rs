use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Branch id reserved for the "all branches" aggregate view. Not a real
/// sales location: superadmins carry it as their home branch and the
/// notification fan-out mirrors every event into its group.
pub const ALL_BRANCHES: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Karyawan,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Karyawan => "karyawan",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "karyawan" => Some(Role::Karyawan),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }
}

/// Fail with `Forbidden` unless the caller's role is in `roles`.
pub fn require_role(user: &AuthUser, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_admin(user: &AuthUser) -> Result<(), AppError> {
    require_role(user, &[Role::Admin, Role::Superadmin])
}

pub fn require_superadmin(user: &AuthUser) -> Result<(), AppError> {
    require_role(user, &[Role::Superadmin])
}

/// Branch filter for list queries. `None` means no branch restriction
/// (superadmin viewing the branch-0 aggregate); otherwise only rows of the
/// returned branch may be visible to the caller.
pub fn read_scope(user: &AuthUser, requested: Option<i64>) -> Option<i64> {
    match user.role {
        Role::Superadmin => requested.filter(|b| *b != ALL_BRANCHES),
        // Whatever the query says, admins and karyawan only ever see
        // their own branch.
        Role::Admin | Role::Karyawan => Some(user.branch_id),
    }
}

/// Resolve the branch a write lands in. A write can never silently cross
/// branches: a non-superadmin declaring a foreign branch is rejected, and an
/// omitted branch is forced to the caller's own.
pub fn write_branch(user: &AuthUser, requested: Option<i64>) -> Result<i64, AppError> {
    match user.role {
        Role::Superadmin => Ok(requested.unwrap_or(user.branch_id)),
        Role::Admin | Role::Karyawan => match requested {
            Some(branch) if branch != user.branch_id => Err(AppError::Forbidden),
            _ => Ok(user.branch_id),
        },
    }
}

/// Whether the caller may read a single row owned by `target_branch`.
pub fn can_read_branch(user: &AuthUser, target_branch: i64) -> bool {
    match user.role {
        Role::Superadmin => true,
        Role::Admin | Role::Karyawan => target_branch == user.branch_id,
    }
}

/// Whether the caller may join the given notification group.
pub fn can_subscribe(user: &AuthUser, branch_id: i64) -> bool {
    match user.role {
        Role::Superadmin => true,
        Role::Admin | Role::Karyawan => branch_id == user.branch_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, branch_id: i64) -> AuthUser {
        AuthUser {
            user_id: 1,
            role,
            branch_id,
        }
    }

    #[test]
    fn role_gate() {
        let kasir = user(Role::Karyawan, 2);
        assert!(require_admin(&kasir).is_err());
        assert!(require_role(&kasir, &[Role::Karyawan, Role::Admin]).is_ok());
        assert!(require_superadmin(&user(Role::Admin, 2)).is_err());
        assert!(require_superadmin(&user(Role::Superadmin, 0)).is_ok());
    }

    #[test]
    fn reads_are_forced_to_own_branch() {
        let admin = user(Role::Admin, 2);
        assert_eq!(read_scope(&admin, None), Some(2));
        assert_eq!(read_scope(&admin, Some(3)), Some(2));
        assert_eq!(read_scope(&admin, Some(ALL_BRANCHES)), Some(2));
    }

    #[test]
    fn superadmin_reads_any_branch() {
        let root = user(Role::Superadmin, ALL_BRANCHES);
        assert_eq!(read_scope(&root, None), None);
        assert_eq!(read_scope(&root, Some(ALL_BRANCHES)), None);
        assert_eq!(read_scope(&root, Some(3)), Some(3));
    }

    #[test]
    fn writes_never_cross_branches() {
        let admin = user(Role::Admin, 2);
        assert_eq!(write_branch(&admin, None).unwrap(), 2);
        assert_eq!(write_branch(&admin, Some(2)).unwrap(), 2);
        assert!(matches!(
            write_branch(&admin, Some(3)),
            Err(AppError::Forbidden)
        ));

        let root = user(Role::Superadmin, ALL_BRANCHES);
        assert_eq!(write_branch(&root, Some(5)).unwrap(), 5);
    }

    #[test]
    fn subscription_scope() {
        let kasir = user(Role::Karyawan, 4);
        assert!(can_subscribe(&kasir, 4));
        assert!(!can_subscribe(&kasir, ALL_BRANCHES));
        assert!(can_subscribe(&user(Role::Superadmin, 0), ALL_BRANCHES));
    }
}
