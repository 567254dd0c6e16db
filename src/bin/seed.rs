use pos_branch_api::{config::AppConfig, db::create_pool, services::auth_service::hash_password};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let branch_id = ensure_branch(&pool, "Main Branch").await?;
    ensure_user(&pool, "Super Admin", "superadmin", "Super4dmin!", "superadmin", 0).await?;
    ensure_user(&pool, "Branch Admin", "admin", "Br4nchAdmin!", "admin", branch_id).await?;
    ensure_user(&pool, "Cashier One", "kasir1", "K4sirSatu!", "karyawan", branch_id).await?;
    seed_catalog(&pool, branch_id).await?;

    println!("Seed completed. Main branch ID: {branch_id}");
    Ok(())
}

async fn ensure_branch(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<i64> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM branches WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let row: (i64,) = sqlx::query_as(
        "INSERT INTO branches (name, address, phone) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind("Jl. Raya No. 1")
    .bind("021-555-0100")
    .fetch_one(pool)
    .await?;

    println!("Created branch {name}");
    Ok(row.0)
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    username: &str,
    password: &str,
    role: &str,
    branch_id: i64,
) -> anyhow::Result<()> {
    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO users (name, username, password_hash, role, branch_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (username) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(name)
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .bind(branch_id)
    .execute(pool)
    .await?;

    println!("Ensured user {username} (role={role})");
    Ok(())
}

async fn seed_catalog(pool: &sqlx::PgPool, branch_id: i64) -> anyhow::Result<()> {
    let category_id = {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM categories WHERE name = $1")
                .bind("Beverages")
                .fetch_optional(pool)
                .await?;
        match existing {
            Some((id,)) => id,
            None => {
                let row: (i64,) = sqlx::query_as(
                    "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id",
                )
                .bind("Beverages")
                .bind("Bottled and canned drinks")
                .fetch_one(pool)
                .await?;
                row.0
            }
        }
    };

    let products = vec![
        ("Mineral Water 600ml", "8991002100015", 4000, 120),
        ("Iced Tea Bottle", "8991002100022", 6500, 80),
        ("Drip Coffee Can", "8991002100039", 12000, 45),
        ("Orange Juice 1L", "8991002100046", 21000, 30),
    ];

    for (name, barcode, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (name, barcode, category_id, branch_id, sell_price, stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (barcode) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(barcode)
        .bind(category_id)
        .bind(branch_id)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
