use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::policy::Role;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductQuery {
    /// Only honored for superadmins; other roles always see their own branch.
    pub branch_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Matches product name or barcode, case-insensitive.
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub branch_id: Option<i64>,
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionListQuery {
    pub branch_id: Option<i64>,
    pub user_id: Option<i64>,
    pub payment_status: Option<String>,
    /// Inclusive calendar-date bounds on the sale timestamp.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Query string of the live-events socket; browsers cannot set headers on a
/// WebSocket handshake, so the token travels here.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EventStreamQuery {
    pub branch_id: Option<i64>,
    pub token: Option<String>,
}
