use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod branches;
pub mod categories;
pub mod doc;
pub mod events;
pub mod health;
pub mod params;
pub mod products;
pub mod transactions;
pub mod users;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router())
        .nest("/categories", categories::router())
        .nest("/branches", branches::router())
        .nest("/users", users::router())
        .nest("/transactions", transactions::router())
        .nest("/events", events::router())
}
