use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse},
        branches::{BranchList, CreateBranchRequest, UpdateBranchRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        products::{
            AdjustStockRequest, CreateProductRequest, ProductList, StockMovementList,
            UpdateProductRequest,
        },
        transactions::{
            CreateTransactionRequest, SaleItem, TransactionList, TransactionWithItems,
        },
        users::{CreateUserRequest, PasswordRequirements, UpdateUserRequest, UserList},
    },
    models::{
        Branch, Category, Payment, Product, StockMovement, Transaction, TransactionItem, User,
    },
    response::{ApiResponse, Meta},
    routes::{auth, branches, categories, events, health, params, products, transactions, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::logout,
        auth::me,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::adjust_stock,
        products::list_stock_movements,
        products::upload_product_image,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        categories::upload_category_image,
        branches::list_branches,
        branches::get_branch,
        branches::create_branch,
        branches::update_branch,
        branches::delete_branch,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        transactions::list_transactions,
        transactions::get_transaction,
        transactions::create_transaction,
        events::subscribe,
    ),
    components(
        schemas(
            User,
            Branch,
            Category,
            Product,
            Transaction,
            TransactionItem,
            Payment,
            StockMovement,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            AdjustStockRequest,
            ProductList,
            StockMovementList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateBranchRequest,
            UpdateBranchRequest,
            BranchList,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            PasswordRequirements,
            SaleItem,
            CreateTransactionRequest,
            TransactionWithItems,
            TransactionList,
            params::Pagination,
            params::ProductQuery,
            params::UserListQuery,
            params::TransactionListQuery,
            params::EventStreamQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<TransactionWithItems>,
            ApiResponse<TransactionList>,
            ApiResponse<UserList>,
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product and inventory endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Branches", description = "Branch endpoints"),
        (name = "Users", description = "User management endpoints"),
        (name = "Transactions", description = "Sale endpoints"),
        (name = "Events", description = "Live notification stream"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
