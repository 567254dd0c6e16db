use std::sync::Arc;

use pos_branch_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        auth::LoginRequest,
        categories::CreateCategoryRequest,
        products::CreateProductRequest,
        transactions::{CreateTransactionRequest, SaleItem},
    },
    entity::{
        branches::ActiveModel as BranchActive, products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    events::{EventBus, EventKind},
    lockout::MemoryAttemptStore,
    middleware::auth::AuthUser,
    policy::Role,
    routes::params::{ProductQuery, TransactionListQuery},
    services::{auth_service, category_service, product_service, transaction_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};

// End-to-end sale pipeline: commit with items, stock decrement, movements and
// payment, plus the notification fan-out, the rollback on insufficient stock,
// branch scoping and the category delete guard.
#[tokio::test]
async fn sale_commit_and_scoping_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let branch_a = create_branch(&state, "Branch A").await?;
    let branch_b = create_branch(&state, "Branch B").await?;

    let kasir_id = create_user(&state, "kasir", "karyawan", branch_a).await?;
    let kasir = AuthUser {
        user_id: kasir_id,
        role: Role::Karyawan,
        branch_id: branch_a,
    };
    let root_id = create_user(&state, "root", "superadmin", 0).await?;
    let root = AuthUser {
        user_id: root_id,
        role: Role::Superadmin,
        branch_id: 0,
    };

    let category_resp = category_service::create_category(
        &state,
        &root,
        CreateCategoryRequest {
            name: "Drinks".into(),
            description: None,
        },
    )
    .await?;
    let category_id = category_resp.data.unwrap().id;

    let water = create_product(&state, "Water", "100001", category_id, branch_a, 4000, 10).await?;
    let tea = create_product(&state, "Tea", "100002", category_id, branch_a, 6500, 5).await?;

    let mut branch_rx = state.events.subscribe(branch_a);
    let mut sentinel_rx = state.events.subscribe(0);

    // Commit a sale with two lines, a discount and a payment.
    let sale = transaction_service::create_transaction(
        &state,
        &kasir,
        CreateTransactionRequest {
            items: vec![
                SaleItem {
                    product_id: water,
                    qty: 2,
                    price: 4000,
                },
                SaleItem {
                    product_id: tea,
                    qty: 1,
                    price: 6500,
                },
            ],
            discount: 500,
            payment_method: Some("cash".into()),
            payment_amount: Some(14000),
            branch_id: None,
        },
    )
    .await?;
    let sale = sale.data.unwrap();
    assert_eq!(sale.transaction.total_amount, 14500);
    assert_eq!(sale.transaction.final_amount, 14000);
    assert_eq!(sale.transaction.branch_id, branch_a);
    assert_eq!(sale.items.len(), 2);
    assert_eq!(sale.payments.len(), 1);
    assert_eq!(sale.payments[0].amount, 14000);

    // Stock decremented in the same commit.
    assert_eq!(fetch_stock(&state, water).await?, 8);
    assert_eq!(fetch_stock(&state, tea).await?, 4);

    // One outbound movement per line, back-referencing the sale.
    let movements: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM stock_movements WHERE transaction_id = $1 AND movement_type = 'out'",
    )
    .bind(sale.transaction.id)
    .fetch_one(&state.pool)
    .await?;
    assert_eq!(movements.0, 2);

    // Fan-out: sale, both product updates and the payment, mirrored to the
    // branch-0 group.
    let branch_events = drain(&mut branch_rx);
    let kinds: Vec<EventKind> = branch_events.iter().map(|e| e.event).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::TransactionCreated,
            EventKind::ProductUpdated,
            EventKind::ProductUpdated,
            EventKind::PaymentCompleted,
        ]
    );
    let mirrored = drain(&mut sentinel_rx);
    assert_eq!(mirrored.len(), branch_events.len());
    assert!(mirrored.iter().all(|e| e.branch_id == branch_a));

    // A sale that would overdraw stock fails whole and leaves no trace.
    let before: (i64,) = sqlx::query_as("SELECT count(*) FROM transactions")
        .fetch_one(&state.pool)
        .await?;
    let err = transaction_service::create_transaction(
        &state,
        &kasir,
        CreateTransactionRequest {
            items: vec![SaleItem {
                product_id: tea,
                qty: 99,
                price: 6500,
            }],
            discount: 0,
            payment_method: None,
            payment_amount: None,
            branch_id: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(id) if id == tea));

    let after: (i64,) = sqlx::query_as("SELECT count(*) FROM transactions")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(after.0, before.0, "failed sale must not leave a row behind");
    assert_eq!(fetch_stock(&state, tea).await?, 4, "stock must be untouched");

    // Same whole-or-nothing guarantee when a later line names an unknown
    // product: the valid first line must not survive on its own.
    let rows_before = table_counts(&state).await?;
    let err = transaction_service::create_transaction(
        &state,
        &kasir,
        CreateTransactionRequest {
            items: vec![
                SaleItem {
                    product_id: water,
                    qty: 1,
                    price: 4000,
                },
                SaleItem {
                    product_id: 999_999,
                    qty: 1,
                    price: 1000,
                },
            ],
            discount: 0,
            payment_method: Some("cash".into()),
            payment_amount: Some(5000),
            branch_id: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(table_counts(&state).await?, rows_before);
    assert_eq!(fetch_stock(&state, water).await?, 8);

    // Reading a committed sale is idempotent: two reads, one payload.
    let first = transaction_service::get_transaction(&state, &kasir, sale.transaction.id).await?;
    let second = transaction_service::get_transaction(&state, &kasir, sale.transaction.id).await?;
    assert_eq!(
        serde_json::to_value(first.data.unwrap())?,
        serde_json::to_value(second.data.unwrap())?,
    );

    // Branch scoping: a foreign product is invisible and unsellable.
    let foreign =
        create_product(&state, "Juice", "100003", category_id, branch_b, 21000, 30).await?;

    let listed = product_service::list_products(
        &state,
        &kasir,
        ProductQuery {
            branch_id: Some(branch_b),
            category_id: None,
            search: None,
        },
    )
    .await?;
    let items = listed.data.unwrap().items;
    assert!(items.iter().all(|p| p.branch_id == branch_a));

    let err = product_service::get_product(&state, &kasir, foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let err = product_service::create_product(
        &state,
        &AuthUser {
            user_id: kasir_id,
            role: Role::Admin,
            branch_id: branch_a,
        },
        CreateProductRequest {
            name: "Smuggled".into(),
            barcode: None,
            category_id: Some(category_id),
            branch_id: Some(branch_b),
            sell_price: 1000,
            stock: Some(1),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Transactions list is scoped the same way.
    let sales = transaction_service::list_transactions(
        &state,
        &kasir,
        TransactionListQuery {
            branch_id: Some(branch_b),
            user_id: None,
            payment_status: None,
            start_date: None,
            end_date: None,
        },
    )
    .await?;
    assert!(
        sales
            .data
            .unwrap()
            .items
            .iter()
            .all(|t| t.branch_id == branch_a)
    );

    // A category with products refuses deletion.
    let err = category_service::delete_category(&state, &root, category_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Login throttling: five failures lock the username+ip pair, another
    // address is unaffected.
    let hash = auth_service::hash_password("Corr3ct!pw").map_err(|e| anyhow::anyhow!("{e}"))?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE username = 'kasir'")
        .bind(&hash)
        .execute(&state.pool)
        .await?;

    for expected in [4u32, 3, 2, 1, 0] {
        let err = auth_service::login(
            &state,
            "10.0.0.1",
            LoginRequest {
                username: "kasir".into(),
                password: "wrong".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, AppError::InvalidCredentials { remaining_attempts } if remaining_attempts == expected)
        );
    }

    let err = auth_service::login(
        &state,
        "10.0.0.1",
        LoginRequest {
            username: "kasir".into(),
            password: "Corr3ct!pw".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));

    let login = auth_service::login(
        &state,
        "10.0.0.2",
        LoginRequest {
            username: "kasir".into(),
            password: "Corr3ct!pw".into(),
        },
    )
    .await?;
    let login = login.data.unwrap();
    assert!(!login.token.is_empty());
    assert_eq!(login.user.username, "kasir");

    Ok(())
}

fn drain(
    rx: &mut tokio::sync::broadcast::Receiver<pos_branch_api::events::Event>,
) -> Vec<pos_branch_api::events::Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Row counts of every table the commit pipeline writes.
async fn table_counts(state: &AppState) -> anyhow::Result<(i64, i64, i64, i64)> {
    let row: (i64, i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT count(*) FROM transactions), \
                (SELECT count(*) FROM transaction_items), \
                (SELECT count(*) FROM stock_movements), \
                (SELECT count(*) FROM payments)",
    )
    .fetch_one(&state.pool)
    .await?;
    Ok(row)
}

async fn fetch_stock(state: &AppState, product_id: i64) -> anyhow::Result<i32> {
    let row: (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(row.0)
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs, then restore the branch-0 sentinel row.
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE payments, stock_movements, transaction_items, transactions, products, categories, users, branches RESTART IDENTITY CASCADE",
    ))
    .await?;
    orm.execute(Statement::from_string(
        backend,
        "INSERT INTO branches (id, name) VALUES (0, 'All Branches')",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "integration-test-secret".into(),
        cors_origin: None,
        trust_client_price: true,
        allow_negative_stock: false,
        upload_dir: "target/test-uploads".into(),
    };

    Ok(AppState {
        pool,
        orm,
        config,
        events: EventBus::default(),
        login_attempts: Arc::new(MemoryAttemptStore::new()),
    })
}

async fn create_branch(state: &AppState, name: &str) -> anyhow::Result<i64> {
    let branch = BranchActive {
        id: NotSet,
        name: Set(name.to_string()),
        address: Set(None),
        phone: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(branch.id)
}

async fn create_user(
    state: &AppState,
    username: &str,
    role: &str,
    branch_id: i64,
) -> anyhow::Result<i64> {
    let user = UserActive {
        id: NotSet,
        name: Set(username.to_string()),
        username: Set(username.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.to_string()),
        branch_id: Set(branch_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(user.id)
}

async fn create_product(
    state: &AppState,
    name: &str,
    barcode: &str,
    category_id: i64,
    branch_id: i64,
    sell_price: i64,
    stock: i32,
) -> anyhow::Result<i64> {
    let product = ProductActive {
        id: NotSet,
        name: Set(name.to_string()),
        barcode: Set(barcode.to_string()),
        category_id: Set(Some(category_id)),
        branch_id: Set(branch_id),
        sell_price: Set(sell_price),
        stock: Set(stock),
        image: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}
