use chrono::Utc;
use sqlx::{Postgres, QueryBuilder, Row};

use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};

use crate::{
    dto::users::{CreateUserRequest, PasswordRequirements, UpdateUserRequest, UserList},
    entity::{
        transactions::{Column as TxnCol, Entity as Transactions},
        users::{ActiveModel, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::User,
    policy::{self, Role},
    response::{ApiResponse, Meta},
    routes::params::UserListQuery,
    services::auth_service::hash_password,
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    policy::require_admin(user)?;

    let (page, per_page, offset) = query.pagination.normalize();

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT u.id, u.name, u.username, u.role, u.branch_id, \
         b.name AS branch_name, u.created_at, u.updated_at, \
         COUNT(*) OVER() AS total_count \
         FROM users u \
         LEFT JOIN branches b ON u.branch_id = b.id \
         WHERE 1=1",
    );

    if let Some(branch) = policy::read_scope(user, query.branch_id) {
        qb.push(" AND u.branch_id = ").push_bind(branch);
    }
    if let Some(role) = query.role {
        qb.push(" AND u.role = ").push_bind(role.as_str().to_string());
    }
    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.username ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    qb.push(" ORDER BY u.created_at DESC");
    qb.push(" LIMIT ").push_bind(per_page);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(&state.pool).await?;

    let mut total = 0i64;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        total = row.try_get("total_count")?;
        items.push(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            username: row.try_get("username")?,
            role: row.try_get("role")?,
            branch_id: row.try_get("branch_id")?,
            branch_name: row.try_get("branch_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        });
    }

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn get_user(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<User>> {
    policy::require_admin(user)?;
    let found = Users::find_by_id(id).one(&state.orm).await?;
    let found = match found {
        Some(u) if policy::can_read_branch(user, u.branch_id) => u,
        _ => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success("User", user_from_entity(found), None))
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    policy::require_admin(user)?;

    if payload.name.is_empty() || payload.username.is_empty() {
        return Err(AppError::BadRequest("Name and username are required".into()));
    }

    let requirements = check_password(&payload.password);
    if !password_acceptable(&requirements) {
        return Err(AppError::WeakPassword(requirements));
    }

    let branch_id = policy::write_branch(user, payload.branch_id)?;
    ensure_can_assign(user, payload.role)?;

    let hash = hash_password(&payload.password)?;

    let created = ActiveModel {
        id: NotSet,
        name: Set(payload.name),
        username: Set(payload.username),
        password_hash: Set(hash),
        role: Set(payload.role.as_str().to_string()),
        branch_id: Set(branch_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::DuplicateKey("Username".into())
        } else {
            err.into()
        }
    })?;

    Ok(ApiResponse::success(
        "User created",
        user_from_entity(created),
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    policy::require_admin(user)?;
    let existing = Users::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(u) if policy::can_read_branch(user, u.branch_id) => u,
        _ => return Err(AppError::NotFound),
    };

    // An admin may only manage cashier accounts; touching another admin or a
    // superadmin requires the superadmin role.
    if user.role != Role::Superadmin && existing.role != Role::Karyawan.as_str() {
        return Err(AppError::Forbidden);
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name.filter(|n| !n.is_empty()) {
        active.name = Set(name);
    }
    if let Some(password) = payload.password.filter(|p| !p.is_empty()) {
        let requirements = check_password(&password);
        if !password_acceptable(&requirements) {
            return Err(AppError::WeakPassword(requirements));
        }
        active.password_hash = Set(hash_password(&password)?);
    }
    if let Some(role) = payload.role {
        ensure_can_assign(user, role)?;
        active.role = Set(role.as_str().to_string());
    }
    if let Some(branch_id) = payload.branch_id {
        active.branch_id = Set(policy::write_branch(user, Some(branch_id))?);
    }
    active.updated_at = Set(Utc::now().into());

    let updated = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "User updated",
        user_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    policy::require_superadmin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("Cannot delete your own account".into()));
    }

    if Users::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let sales = Transactions::find()
        .filter(TxnCol::UserId.eq(id))
        .count(&state.orm)
        .await?;
    if sales > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete user with recorded transactions".into(),
        ));
    }

    Users::delete_by_id(id).exec(&state.orm).await?;

    Ok(ApiResponse::message_only("User deleted successfully"))
}

// Admins may only hand out the cashier role; any elevation is reserved for
// superadmins.
fn ensure_can_assign(actor: &AuthUser, target: Role) -> AppResult<()> {
    if actor.role == Role::Superadmin || target == Role::Karyawan {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn check_password(password: &str) -> PasswordRequirements {
    PasswordRequirements {
        min_length: password.chars().count() >= 8,
        has_upper_case: password.chars().any(|c| c.is_ascii_uppercase()),
        has_lower_case: password.chars().any(|c| c.is_ascii_lowercase()),
        has_numbers: password.chars().any(|c| c.is_ascii_digit()),
        has_special_char: password.chars().any(|c| !c.is_ascii_alphanumeric()),
    }
}

// Minimum length is mandatory; of the four character classes at least three
// must be present.
fn password_acceptable(req: &PasswordRequirements) -> bool {
    let classes = [
        req.has_upper_case,
        req.has_lower_case,
        req.has_numbers,
        req.has_special_char,
    ]
    .iter()
    .filter(|met| **met)
    .count();
    req.min_length && classes >= 3
}

fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        name: model.name,
        username: model.username,
        role: model.role,
        branch_id: model.branch_id,
        branch_name: None,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        assert!(password_acceptable(&check_password("Str0ng!pass")));
    }

    #[test]
    fn three_classes_suffice() {
        assert!(password_acceptable(&check_password("Abcdefg1")));
    }

    #[test]
    fn short_password_fails_even_when_complex() {
        assert!(!password_acceptable(&check_password("Ab1!")));
    }

    #[test]
    fn two_classes_fail() {
        let req = check_password("abcdefgh1234");
        assert!(req.min_length);
        assert!(!password_acceptable(&req));
    }

    #[test]
    fn requirements_report_each_criterion() {
        let req = check_password("lowercase");
        assert!(req.min_length);
        assert!(req.has_lower_case);
        assert!(!req.has_upper_case);
        assert!(!req.has_numbers);
        assert!(!req.has_special_char);
    }
}
