use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    dto::products::{
        AdjustStockRequest, CreateProductRequest, ProductList, StockMovementList,
        UpdateProductRequest,
    },
    entity::{
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        stock_movements::ActiveModel as MovementActive,
        transaction_items::{Column as ItemCol, Entity as TransactionItems},
    },
    error::{AppError, AppResult, is_unique_violation},
    events::EventKind,
    middleware::auth::AuthUser,
    models::{Product, StockMovement},
    policy,
    response::{ApiResponse, Meta},
    routes::params::ProductQuery,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    user: &AuthUser,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT p.*, c.name AS category_name, b.name AS branch_name \
         FROM products p \
         LEFT JOIN categories c ON p.category_id = c.id \
         LEFT JOIN branches b ON p.branch_id = b.id \
         WHERE 1=1",
    );

    if let Some(branch) = policy::read_scope(user, query.branch_id) {
        qb.push(" AND p.branch_id = ").push_bind(branch);
    }
    if let Some(category) = query.category_id {
        qb.push(" AND p.category_id = ").push_bind(category);
    }
    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.barcode ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    qb.push(" ORDER BY p.created_at DESC");

    let items = qb
        .build_query_as::<Product>()
        .fetch_all(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT p.*, c.name AS category_name, b.name AS branch_name \
         FROM products p \
         LEFT JOIN categories c ON p.category_id = c.id \
         LEFT JOIN branches b ON p.branch_id = b.id \
         WHERE p.id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let product = match product {
        Some(p) if policy::can_read_branch(user, p.branch_id) => p,
        _ => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    policy::require_admin(user)?;
    let branch_id = policy::write_branch(user, payload.branch_id)?;

    if payload.name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let barcode = match payload.barcode.filter(|b| !b.is_empty()) {
        Some(barcode) => barcode,
        None => generate_barcode(),
    };

    let active = ActiveModel {
        id: NotSet,
        name: Set(payload.name),
        barcode: Set(barcode),
        category_id: Set(payload.category_id),
        branch_id: Set(branch_id),
        sell_price: Set(payload.sell_price),
        stock: Set(payload.stock.unwrap_or(0)),
        image: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    };

    let product = active.insert(&state.orm).await.map_err(|err| {
        if is_unique_violation(&err) {
            AppError::DuplicateKey("Barcode".into())
        } else {
            err.into()
        }
    })?;

    let product = product_from_entity(product);
    publish_product(state, EventKind::ProductCreated, &product);

    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    policy::require_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) if policy::can_read_branch(user, p.branch_id) => p,
        _ => return Err(AppError::NotFound),
    };

    let branch_id = policy::write_branch(user, payload.branch_id.or(Some(existing.branch_id)))?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(barcode) = payload.barcode.filter(|b| !b.is_empty()) {
        active.barcode = Set(barcode);
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(Some(category_id));
    }
    if let Some(sell_price) = payload.sell_price {
        active.sell_price = Set(sell_price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    active.branch_id = Set(branch_id);
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await.map_err(|err| {
        if is_unique_violation(&err) {
            AppError::DuplicateKey("Barcode".into())
        } else {
            err.into()
        }
    })?;

    let product = product_from_entity(product);
    publish_product(state, EventKind::ProductUpdated, &product);

    Ok(ApiResponse::success(
        "Product updated",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    policy::require_superadmin(user)?;

    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let referencing = TransactionItems::find()
        .filter(ItemCol::ProductId.eq(id))
        .count(&state.orm)
        .await?;
    if referencing > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete product with existing transactions".into(),
        ));
    }

    Products::delete_by_id(id).exec(&state.orm).await?;

    let product = product_from_entity(existing);
    publish_product(state, EventKind::ProductDeleted, &product);

    Ok(ApiResponse::message_only("Product deleted successfully"))
}

/// Manual restock / removal outside a sale; produces its own audit row in
/// the same commit unit as the stock change.
pub async fn adjust_stock(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: AdjustStockRequest,
) -> AppResult<ApiResponse<Product>> {
    policy::require_admin(user)?;
    let qty = movement_qty(payload.delta)?;

    let txn = state.orm.begin().await?;

    let existing = Products::find_by_id(id).one(&txn).await?;
    let existing = match existing {
        Some(p) if policy::can_read_branch(user, p.branch_id) => p,
        _ => return Err(AppError::NotFound),
    };

    let mut update = Products::update_many()
        .col_expr(Column::Stock, Expr::col(Column::Stock).add(payload.delta))
        .filter(Column::Id.eq(id));
    if payload.delta < 0 && !state.config.allow_negative_stock {
        update = update.filter(Column::Stock.gte(qty));
    }
    let result = update.exec(&txn).await?;
    if result.rows_affected == 0 {
        txn.rollback().await.ok();
        return Err(AppError::InsufficientStock(id));
    }

    let movement_type = if payload.delta > 0 { "in" } else { "out" };
    MovementActive {
        id: NotSet,
        product_id: Set(id),
        branch_id: Set(existing.branch_id),
        transaction_id: Set(None),
        movement_type: Set(movement_type.into()),
        qty: Set(qty),
        note: Set(payload.note.or_else(|| Some("Manual adjustment".into()))),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let updated = Products::find_by_id(id).one(&txn).await?;
    txn.commit().await?;

    let updated = match updated {
        Some(p) => product_from_entity(p),
        None => return Err(AppError::NotFound),
    };
    publish_product(state, EventKind::ProductUpdated, &updated);

    Ok(ApiResponse::success(
        "Stock adjusted",
        updated,
        Some(Meta::empty()),
    ))
}

/// Movement history of one product, newest first. Scoped like the product
/// itself.
pub async fn list_stock_movements(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<StockMovementList>> {
    policy::require_admin(user)?;
    let product = Products::find_by_id(id).one(&state.orm).await?;
    match product {
        Some(p) if policy::can_read_branch(user, p.branch_id) => {}
        _ => return Err(AppError::NotFound),
    }

    let items = sqlx::query_as::<_, StockMovement>(
        "SELECT * FROM stock_movements WHERE product_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Stock movements",
        StockMovementList { items },
        Some(Meta::empty()),
    ))
}

/// Movement magnitude of an adjustment. Zero does nothing and `i32::MIN`
/// has no absolute value, so both are rejected up front.
fn movement_qty(delta: i32) -> AppResult<i32> {
    match delta.checked_abs() {
        Some(0) | None => Err(AppError::BadRequest(
            "delta must be a non-zero quantity".into(),
        )),
        Some(qty) => Ok(qty),
    }
}

/// Fallback barcode: prefix + millisecond timestamp + random suffix.
/// Collisions are possible; the unique constraint is the actual guarantee.
fn generate_barcode() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("P{}{}", Utc::now().timestamp_millis(), &suffix[..6])
}

fn publish_product(state: &AppState, kind: EventKind, product: &Product) {
    let payload = serde_json::to_value(product).unwrap_or_default();
    state.events.publish(kind, product.branch_id, payload);
}

fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        barcode: model.barcode,
        category_id: model.category_id,
        branch_id: model.branch_id,
        sell_price: model.sell_price,
        stock: model.stock,
        image: model.image,
        category_name: None,
        branch_name: None,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub async fn set_product_image(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    image_path: String,
) -> AppResult<ApiResponse<Product>> {
    policy::require_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) if policy::can_read_branch(user, p.branch_id) => p,
        _ => return Err(AppError::NotFound),
    };

    let mut active: ActiveModel = existing.into();
    active.image = Set(Some(image_path));
    active.updated_at = Set(Utc::now().into());
    let product = product_from_entity(active.update(&state.orm).await?);

    publish_product(state, EventKind::ProductUpdated, &product);

    Ok(ApiResponse::success(
        "Product image updated",
        product,
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_barcode_shape() {
        let barcode = generate_barcode();
        assert!(barcode.starts_with('P'));
        // 1 prefix + 13 timestamp digits + 6 random hex chars
        assert_eq!(barcode.len(), 20);
    }

    #[test]
    fn generated_barcodes_differ() {
        assert_ne!(generate_barcode(), generate_barcode());
    }

    #[test]
    fn movement_qty_rejects_zero_and_unrepresentable_deltas() {
        assert!(movement_qty(0).is_err());
        assert!(movement_qty(i32::MIN).is_err());
        assert_eq!(movement_qty(-5).unwrap(), 5);
        assert_eq!(movement_qty(7).unwrap(), 7);
    }
}
