use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::{
    dto::auth::{Claims, LoginRequest, LoginResponse},
    entity::users::{Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    lockout::{LockState, MAX_ATTEMPTS},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn hash_password(plain: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(plain: &str, digest: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(digest)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub async fn login(
    state: &AppState,
    client_ip: &str,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { username, password } = payload;
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required".into(),
        ));
    }

    let identifier = format!("{username}_{client_ip}");
    let now = Utc::now();

    if let LockState::Locked { until } = state.login_attempts.check(&identifier, now) {
        tracing::warn!(%username, "login blocked by lockout");
        return Err(AppError::RateLimited { locked_until: until });
    }

    let user = Users::find()
        .filter(UserCol::Username.eq(username.as_str()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(failed_attempt(state, &identifier)),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(failed_attempt(state, &identifier));
    }

    state.login_attempts.clear(&identifier);

    let token = issue_token(&state.config.jwt_secret, &user)?;
    tracing::info!(user_id = user.id, %username, "login successful");

    Ok(ApiResponse::success(
        "Login successful",
        LoginResponse {
            user: user_from_entity(user),
            token,
        },
        Some(Meta::empty()),
    ))
}

// The failing attempt itself still reports remaining attempts; the lockout
// only answers from the next request on.
fn failed_attempt(state: &AppState, identifier: &str) -> AppError {
    let remaining = state.login_attempts.record_failure(identifier, Utc::now());
    AppError::InvalidCredentials {
        remaining_attempts: remaining.min(MAX_ATTEMPTS),
    }
}

fn issue_token(secret: &str, user: &UserModel) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        branch_id: user.branch_id,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let found = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::Unauthenticated("User not found".into())),
    };
    Ok(ApiResponse::success(
        "OK",
        user_from_entity(found),
        Some(Meta::empty()),
    ))
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
