use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    dto::transactions::{
        CreateTransactionRequest, SaleItem, TransactionList, TransactionWithItems,
    },
    entity::{
        payments::{ActiveModel as PaymentActive, Model as PaymentModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        stock_movements::ActiveModel as MovementActive,
        transaction_items::{ActiveModel as ItemActive, Model as ItemModel},
        transactions::{ActiveModel as TransactionActive, Model as TransactionModel},
    },
    error::{AppError, AppResult},
    events::EventKind,
    middleware::auth::AuthUser,
    models::{Payment, Product, Transaction, TransactionItem},
    policy::{self, ALL_BRANCHES},
    response::{ApiResponse, Meta},
    routes::params::TransactionListQuery,
    state::AppState,
};

pub async fn list_transactions(
    state: &AppState,
    user: &AuthUser,
    query: TransactionListQuery,
) -> AppResult<ApiResponse<TransactionList>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT t.*, u.name AS user_name, b.name AS branch_name \
         FROM transactions t \
         LEFT JOIN users u ON t.user_id = u.id \
         LEFT JOIN branches b ON t.branch_id = b.id \
         WHERE 1=1",
    );

    if let Some(branch) = policy::read_scope(user, query.branch_id) {
        qb.push(" AND t.branch_id = ").push_bind(branch);
    }
    if let Some(user_id) = query.user_id {
        qb.push(" AND t.user_id = ").push_bind(user_id);
    }
    if let Some(status) = query.payment_status.as_ref().filter(|s| !s.is_empty()) {
        qb.push(" AND t.payment_status = ").push_bind(status.clone());
    }
    if let Some(start) = query.start_date {
        qb.push(" AND t.created_at::date >= ").push_bind(start);
    }
    if let Some(end) = query.end_date {
        qb.push(" AND t.created_at::date <= ").push_bind(end);
    }

    qb.push(" ORDER BY t.created_at DESC");

    let items = qb
        .build_query_as::<Transaction>()
        .fetch_all(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "Transactions",
        TransactionList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_transaction(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<TransactionWithItems>> {
    let transaction = sqlx::query_as::<_, Transaction>(
        "SELECT t.*, u.name AS user_name, b.name AS branch_name \
         FROM transactions t \
         LEFT JOIN users u ON t.user_id = u.id \
         LEFT JOIN branches b ON t.branch_id = b.id \
         WHERE t.id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let transaction = match transaction {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };
    // Cross-branch rows are indistinguishable from absent ones.
    if !policy::can_read_branch(user, transaction.branch_id) {
        return Err(AppError::NotFound);
    }

    let items = sqlx::query_as::<_, TransactionItem>(
        "SELECT ti.*, p.name AS product_name, p.barcode \
         FROM transaction_items ti \
         LEFT JOIN products p ON ti.product_id = p.id \
         WHERE ti.transaction_id = $1 ORDER BY ti.id",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE transaction_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Transaction",
        TransactionWithItems {
            transaction,
            items,
            payments,
        },
        Some(Meta::empty()),
    ))
}

struct SaleOutcome {
    transaction: TransactionModel,
    items: Vec<ItemModel>,
    payment: Option<PaymentModel>,
    /// Post-decrement state of every distinct product touched, in first-seen
    /// order, for the product-updated fan-out.
    updated_products: Vec<ProductModel>,
}

/// Commit one sale as a single atomic unit: transaction row, line items,
/// stock decrements, stock movements and the payment all become visible
/// together or not at all.
pub async fn create_transaction(
    state: &AppState,
    user: &AuthUser,
    payload: CreateTransactionRequest,
) -> AppResult<ApiResponse<TransactionWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Transaction items are required".into(),
        ));
    }
    if payload.items.iter().any(|item| item.qty <= 0) {
        return Err(AppError::BadRequest(
            "Item quantity must be positive".into(),
        ));
    }

    let branch_id = policy::write_branch(user, payload.branch_id)?;
    if branch_id == ALL_BRANCHES {
        return Err(AppError::BadRequest(
            "A sale must belong to a real branch".into(),
        ));
    }

    let txn = state.orm.begin().await?;
    let outcome = match build_sale(&txn, state, user, branch_id, &payload).await {
        Ok(outcome) => outcome,
        Err(err) => {
            txn.rollback().await.ok();
            return Err(commit_failure(err));
        }
    };

    txn.commit().await.map_err(|err| {
        tracing::error!(error = %err, "sale commit failed");
        AppError::TransactionFailed
    })?;

    publish_sale_events(state, &payload, branch_id, &outcome);

    let transaction = transaction_from_entity(outcome.transaction);
    let items = outcome.items.into_iter().map(item_from_entity).collect();
    let payments = outcome
        .payment
        .into_iter()
        .map(payment_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Transaction created successfully",
        TransactionWithItems {
            transaction,
            items,
            payments,
        },
        Some(Meta::empty()),
    ))
}

async fn build_sale(
    txn: &DatabaseTransaction,
    state: &AppState,
    user: &AuthUser,
    branch_id: i64,
    payload: &CreateTransactionRequest,
) -> AppResult<SaleOutcome> {
    // Resolve every product up front so totals are computed before any write.
    let mut products: HashMap<i64, ProductModel> = HashMap::new();
    for item in &payload.items {
        if products.contains_key(&item.product_id) {
            continue;
        }
        let product = Products::find_by_id(item.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Product {} does not exist", item.product_id))
            })?;
        products.insert(item.product_id, product);
    }

    let line_price = |item: &SaleItem| -> i64 {
        if state.config.trust_client_price {
            item.price
        } else {
            products[&item.product_id].sell_price
        }
    };

    let total_amount: i64 = payload
        .items
        .iter()
        .map(|item| line_price(item) * i64::from(item.qty))
        .sum();
    let final_amount = total_amount - payload.discount;

    let transaction = TransactionActive {
        id: NotSet,
        user_id: Set(user.user_id),
        branch_id: Set(branch_id),
        total_amount: Set(total_amount),
        discount: Set(payload.discount),
        final_amount: Set(final_amount),
        payment_status: Set("paid".into()),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(payload.items.len());
    let mut touched: Vec<i64> = Vec::new();

    for item in &payload.items {
        let price = line_price(item);
        let inserted = ItemActive {
            id: NotSet,
            transaction_id: Set(transaction.id),
            product_id: Set(item.product_id),
            qty: Set(item.qty),
            price: Set(price),
            subtotal: Set(price * i64::from(item.qty)),
        }
        .insert(txn)
        .await?;
        items.push(inserted);

        deduct_stock(txn, state, item.product_id, item.qty).await?;

        MovementActive {
            id: NotSet,
            product_id: Set(item.product_id),
            branch_id: Set(branch_id),
            transaction_id: Set(Some(transaction.id)),
            movement_type: Set("out".into()),
            qty: Set(item.qty),
            note: Set(Some(format!("Sale - Transaction #{}", transaction.id))),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;

        if !touched.contains(&item.product_id) {
            touched.push(item.product_id);
        }
    }

    let payment = match (&payload.payment_method, payload.payment_amount) {
        (Some(method), Some(amount)) => Some(
            PaymentActive {
                id: NotSet,
                transaction_id: Set(transaction.id),
                method: Set(method.clone()),
                amount: Set(amount),
                created_at: NotSet,
            }
            .insert(txn)
            .await?,
        ),
        _ => None,
    };

    let mut updated_products = Vec::with_capacity(touched.len());
    for product_id in touched {
        if let Some(product) = Products::find_by_id(product_id).one(txn).await? {
            updated_products.push(product);
        }
    }

    Ok(SaleOutcome {
        transaction,
        items,
        payment,
        updated_products,
    })
}

/// Decrement stock inside the commit unit. Unless negative stock is allowed,
/// the update only matches rows with enough stock, so a zero-row result means
/// a concurrent sale got there first.
async fn deduct_stock(
    txn: &DatabaseTransaction,
    state: &AppState,
    product_id: i64,
    qty: i32,
) -> AppResult<()> {
    let mut update = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(qty))
        .filter(ProdCol::Id.eq(product_id));
    if !state.config.allow_negative_stock {
        update = update.filter(ProdCol::Stock.gte(qty));
    }

    let result = update.exec(txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::InsufficientStock(product_id));
    }
    Ok(())
}

/// Validation failures keep their own kind; anything the storage layer threw
/// mid-unit is logged and reported as a failed transaction.
fn commit_failure(err: AppError) -> AppError {
    match err {
        AppError::DbError(source) => {
            tracing::error!(error = %source, "sale aborted by storage error");
            AppError::TransactionFailed
        }
        AppError::OrmError(source) => {
            tracing::error!(error = %source, "sale aborted by storage error");
            AppError::TransactionFailed
        }
        other => other,
    }
}

// Fire-and-forget: a dead notification channel never un-commits a sale.
fn publish_sale_events(
    state: &AppState,
    payload: &CreateTransactionRequest,
    branch_id: i64,
    outcome: &SaleOutcome,
) {
    let transaction_json =
        serde_json::to_value(transaction_from_entity(outcome.transaction.clone()))
            .unwrap_or_default();
    state
        .events
        .publish(EventKind::TransactionCreated, branch_id, transaction_json);

    for product in &outcome.updated_products {
        let product_json = serde_json::to_value(product_from_entity(product.clone()))
            .unwrap_or_default();
        state
            .events
            .publish(EventKind::ProductUpdated, product.branch_id, product_json);
    }

    if outcome.payment.is_some() {
        state.events.publish(
            EventKind::PaymentCompleted,
            branch_id,
            serde_json::json!({
                "transactionId": outcome.transaction.id,
                "method": payload.payment_method,
                "amount": payload.payment_amount,
                "branchId": branch_id,
            }),
        );
    }
}

fn transaction_from_entity(model: TransactionModel) -> Transaction {
    Transaction {
        id: model.id,
        user_id: model.user_id,
        branch_id: model.branch_id,
        total_amount: model.total_amount,
        discount: model.discount,
        final_amount: model.final_amount,
        payment_status: model.payment_status,
        user_name: None,
        branch_name: None,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn item_from_entity(model: ItemModel) -> TransactionItem {
    TransactionItem {
        id: model.id,
        transaction_id: model.transaction_id,
        product_id: model.product_id,
        qty: model.qty,
        price: model.price,
        subtotal: model.subtotal,
        product_name: None,
        barcode: None,
    }
}

fn payment_from_entity(model: PaymentModel) -> Payment {
    Payment {
        id: model.id,
        transaction_id: model.transaction_id,
        method: model.method,
        amount: model.amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
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
