use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use crate::{
    dto::transactions::{CreateTransactionRequest, TransactionList, TransactionWithItems},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::TransactionListQuery,
    services::transaction_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/{id}", get(get_transaction))
}

#[utoipa::path(
    get,
    path = "/api/transactions",
    params(
        ("branch_id" = Option<i64>, Query, description = "Branch filter, superadmin only"),
        ("user_id" = Option<i64>, Query, description = "Cashier filter"),
        ("payment_status" = Option<String>, Query, description = "Payment status filter"),
        ("start_date" = Option<String>, Query, description = "Inclusive start date, YYYY-MM-DD"),
        ("end_date" = Option<String>, Query, description = "Inclusive end date, YYYY-MM-DD"),
    ),
    responses(
        (status = 200, description = "List transactions", body = ApiResponse<TransactionList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TransactionListQuery>,
) -> AppResult<Json<ApiResponse<TransactionList>>> {
    let resp = transaction_service::list_transactions(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    params(
        ("id" = i64, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Transaction with items and payments", body = ApiResponse<TransactionWithItems>),
        (status = 404, description = "Transaction not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<TransactionWithItems>>> {
    let resp = transaction_service::get_transaction(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 200, description = "Sale committed", body = ApiResponse<TransactionWithItems>),
        (status = 400, description = "Empty items or unknown product"),
        (status = 409, description = "Insufficient stock"),
        (status = 500, description = "Commit failed, nothing was recorded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTransactionRequest>,
) -> AppResult<Json<ApiResponse<TransactionWithItems>>> {
    let resp = transaction_service::create_transaction(&state, &user, payload).await?;
    Ok(Json(resp))
}
