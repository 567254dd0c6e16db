use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::{
    dto::branches::{BranchList, CreateBranchRequest, UpdateBranchRequest},
    entity::{
        branches::{ActiveModel, Column, Entity as Branches, Model as BranchModel},
        products::{Column as ProductCol, Entity as Products},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Branch,
    policy::{self, ALL_BRANCHES},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// The list excludes the id-0 placeholder row; it is a scoping marker, not a
/// physical location.
pub async fn list_branches(state: &AppState) -> AppResult<ApiResponse<BranchList>> {
    let items = Branches::find()
        .filter(Column::Id.ne(ALL_BRANCHES))
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(branch_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Branches",
        BranchList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_branch(state: &AppState, id: i64) -> AppResult<ApiResponse<Branch>> {
    if id == ALL_BRANCHES {
        return Err(AppError::NotFound);
    }
    let branch = Branches::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success("Branch", branch_from_entity(branch), None))
}

pub async fn create_branch(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBranchRequest,
) -> AppResult<ApiResponse<Branch>> {
    policy::require_superadmin(user)?;
    if payload.name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let branch = ActiveModel {
        id: NotSet,
        name: Set(payload.name),
        address: Set(payload.address),
        phone: Set(payload.phone),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Branch created",
        branch_from_entity(branch),
        Some(Meta::empty()),
    ))
}

pub async fn update_branch(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateBranchRequest,
) -> AppResult<ApiResponse<Branch>> {
    policy::require_superadmin(user)?;
    if id == ALL_BRANCHES {
        return Err(AppError::NotFound);
    }
    let existing = Branches::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name.filter(|n| !n.is_empty()) {
        active.name = Set(name);
    }
    if let Some(address) = payload.address {
        active.address = Set(Some(address));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    active.updated_at = Set(Utc::now().into());

    let branch = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Branch updated",
        branch_from_entity(branch),
        Some(Meta::empty()),
    ))
}

pub async fn delete_branch(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    policy::require_superadmin(user)?;
    if id == ALL_BRANCHES {
        return Err(AppError::BadRequest("This branch cannot be deleted".into()));
    }

    if Branches::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let products = Products::find()
        .filter(ProductCol::BranchId.eq(id))
        .count(&state.orm)
        .await?;
    if products > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete branch that still has products".into(),
        ));
    }

    let users = Users::find()
        .filter(UserCol::BranchId.eq(id))
        .count(&state.orm)
        .await?;
    if users > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete branch that still has users".into(),
        ));
    }

    Branches::delete_by_id(id).exec(&state.orm).await?;

    Ok(ApiResponse::message_only("Branch deleted successfully"))
}

fn branch_from_entity(model: BranchModel) -> Branch {
    Branch {
        id: model.id,
        name: model.name,
        address: model.address,
        phone: model.phone,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
