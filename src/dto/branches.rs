use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Branch;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBranchRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBranchRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BranchList {
    pub items: Vec<Branch>,
}
