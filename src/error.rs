use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{dto::users::PasswordRequirements, response::ApiResponse};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} already exists")]
    DuplicateKey(String),

    #[error("Invalid credentials")]
    InvalidCredentials { remaining_attempts: u32 },

    #[error("Too many failed attempts")]
    RateLimited { locked_until: DateTime<Utc> },

    #[error("Password does not meet requirements")]
    WeakPassword(PasswordRequirements),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(i64),

    #[error("Transaction failed")]
    TransactionFailed,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password_requirements: Option<PasswordRequirements>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated(_) | AppError::InvalidCredentials { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::DuplicateKey(_)
            | AppError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::TransactionFailed
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Variant messages only; sqlx/sea-orm detail stays in server logs.
        let message = match &self {
            AppError::RateLimited { locked_until } => {
                let minutes = (*locked_until - Utc::now()).num_minutes().max(1);
                format!("Too many failed attempts. Try again in {minutes} minutes.")
            }
            other => other.to_string(),
        };

        let mut data = ErrorData {
            error: message.clone(),
            remaining_attempts: None,
            locked_until: None,
            password_requirements: None,
        };
        match &self {
            AppError::InvalidCredentials { remaining_attempts } => {
                data.remaining_attempts = Some(*remaining_attempts);
            }
            AppError::RateLimited { locked_until } => {
                data.locked_until = Some(*locked_until);
            }
            AppError::WeakPassword(requirements) => {
                data.password_requirements = Some(requirements.clone());
            }
            _ => {}
        }

        let body = ApiResponse {
            message,
            data: Some(data),
            meta: None,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// True when a SeaORM write failed on a unique constraint (barcode, username).
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;
    let sqlx_err = match err {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(e))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(e)) => e,
        _ => return false,
    };
    matches!(sqlx_err, sqlx::Error::Database(db) if db.is_unique_violation())
}
