use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User as exposed over the API. The password hash never leaves the service
/// layer.
#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub role: String,
    pub branch_id: i64,
    #[sqlx(default)]
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub barcode: String,
    pub category_id: Option<i64>,
    pub branch_id: i64,
    pub sell_price: i64,
    pub stock: i32,
    pub image: Option<String>,
    #[sqlx(default)]
    pub category_name: Option<String>,
    #[sqlx(default)]
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub branch_id: i64,
    pub total_amount: i64,
    pub discount: i64,
    pub final_amount: i64,
    pub payment_status: String,
    #[sqlx(default)]
    pub user_name: Option<String>,
    #[sqlx(default)]
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TransactionItem {
    pub id: i64,
    pub transaction_id: i64,
    pub product_id: i64,
    pub qty: i32,
    pub price: i64,
    pub subtotal: i64,
    #[sqlx(default)]
    pub product_name: Option<String>,
    #[sqlx(default)]
    pub barcode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub transaction_id: i64,
    pub method: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub branch_id: i64,
    pub transaction_id: Option<i64>,
    pub movement_type: String,
    pub qty: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
