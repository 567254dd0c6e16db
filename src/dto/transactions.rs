use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Payment, Transaction, TransactionItem};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaleItem {
    pub product_id: i64,
    pub qty: i32,
    /// Unit price as rung up at the till. Recorded as-is when the server is
    /// configured to trust client prices, otherwise replaced by the
    /// product's own price.
    pub price: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    pub items: Vec<SaleItem>,
    #[serde(default)]
    pub discount: i64,
    pub payment_method: Option<String>,
    pub payment_amount: Option<i64>,
    /// Only meaningful for superadmins; everyone else sells on their own
    /// branch.
    pub branch_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionWithItems {
    pub transaction: Transaction,
    pub items: Vec<TransactionItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionList {
    pub items: Vec<Transaction>,
}
