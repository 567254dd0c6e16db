use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::branches::{BranchList, CreateBranchRequest, UpdateBranchRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Branch,
    response::ApiResponse,
    services::branch_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_branches).post(create_branch))
        .route(
            "/{id}",
            get(get_branch).put(update_branch).delete(delete_branch),
        )
}

#[utoipa::path(
    get,
    path = "/api/branches",
    responses(
        (status = 200, description = "List branches", body = ApiResponse<BranchList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn list_branches(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<BranchList>>> {
    let resp = branch_service::list_branches(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/branches/{id}",
    params(
        ("id" = i64, Path, description = "Branch ID")
    ),
    responses(
        (status = 200, description = "Get branch", body = ApiResponse<Branch>),
        (status = 404, description = "Branch not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn get_branch(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Branch>>> {
    let resp = branch_service::get_branch(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 200, description = "Create branch", body = ApiResponse<Branch>),
        (status = 403, description = "Superadmin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn create_branch(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBranchRequest>,
) -> AppResult<Json<ApiResponse<Branch>>> {
    let resp = branch_service::create_branch(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/branches/{id}",
    params(
        ("id" = i64, Path, description = "Branch ID")
    ),
    request_body = UpdateBranchRequest,
    responses(
        (status = 200, description = "Updated branch", body = ApiResponse<Branch>),
        (status = 404, description = "Branch not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn update_branch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBranchRequest>,
) -> AppResult<Json<ApiResponse<Branch>>> {
    let resp = branch_service::update_branch(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/branches/{id}",
    params(
        ("id" = i64, Path, description = "Branch ID")
    ),
    responses(
        (status = 200, description = "Deleted branch"),
        (status = 400, description = "Branch still referenced"),
        (status = 403, description = "Superadmin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Branches"
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = branch_service::delete_branch(&state, &user, id).await?;
    Ok(Json(resp))
}
