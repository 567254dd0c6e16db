use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, StockMovement};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    /// Generated when absent; uniqueness is enforced by the storage layer.
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub sell_price: i64,
    pub stock: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub sell_price: Option<i64>,
    pub stock: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    /// Positive restocks, negative removes stock.
    pub delta: i32,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockMovementList {
    pub items: Vec<StockMovement>,
}
