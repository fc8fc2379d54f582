//! Seed script for development: populates a fresh database with sample data.
//!
//! Usage: `cargo run --bin seed`
//!
//! Requires `DATABASE_URL` and `JWT_SECRET` environment variables (reads .env).
//! Prints a bearer token for the seeded administrator.

use anyhow::Context;
use sqlx::PgPool;
use storefront_stats::middleware::auth::issue_token;
use storefront_stats::models::order::OrderStatus;
use storefront_stats::models::user::UserRole;
use uuid::Uuid;

const ADMIN_EMAIL: &str = "admin@storefront.local";
const TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// Name, email, matricule, administration. Several administrations are the
/// kind of free text the dashboard must never chart as a department.
const USERS: [(&str, &str, &str, Option<&str>); 10] = [
    ("Awa Diop", "awa@storefront.local", "M1001", Some("Direction Commerciale")),
    ("Moussa Fall", "moussa@storefront.local", "M1002", Some("Direction Financière")),
    ("Fatou Ndiaye", "fatou@storefront.local", "M1003", Some("Direction Technique")),
    ("Ibrahima Sarr", "ibrahima@storefront.local", "M1004", Some("Direction Commerciale")),
    ("Khady Ba", "khady@storefront.local", "M1005", Some("Service Informatique")),
    ("Ely", "ely@storefront.local", "2025", Some("Ely (2025)")),
    ("Binta Sow", "binta@storefront.local", "B1", Some("B1 12345")),
    ("Ousmane Kane", "ousmane@storefront.local", "M1008", Some("en attente")),
    ("Aminata Gueye", "aminata@storefront.local", "M1009", Some("utilisateur")),
    ("Cheikh Mbaye", "cheikh@storefront.local", "M1010", None),
];

const PRODUCTS: [&str; 12] = [
    "Ramette papier A4",
    "Stylo bille bleu",
    "Classeur à levier",
    "Agrafeuse",
    "Cartouche encre noire",
    "Clé USB 32 Go",
    "Bloc-notes",
    "Surligneur jaune",
    "Enveloppes kraft",
    "Calculatrice",
    "Souris sans fil",
    "Clavier USB",
];

const ORDER_COUNT: usize = 60;
const DAYS_BACK: i64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    println!("=== Storefront Seed Script ===");

    let admin_id = seed_admin(&pool).await?;
    let user_ids = seed_users(&pool).await?;
    let product_ids = seed_products(&pool).await?;
    seed_orders(&pool, &user_ids, &product_ids).await?;

    let token = issue_token(admin_id, "Administrateur", UserRole::Admin, &jwt_secret, TOKEN_TTL_SECS)?;

    println!("\n=== Seed complete! ===");
    println!("Admin bearer token (valid 7 days):\n{token}");

    Ok(())
}

async fn seed_admin(pool: &PgPool) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (name, email, role, is_approved)
        VALUES ('Administrateur', $1, 'admin', true)
        ON CONFLICT (email) DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(ADMIN_EMAIL)
    .fetch_one(pool)
    .await?;

    println!("[done] Admin user {id}");
    Ok(id)
}

async fn seed_users(pool: &PgPool) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(USERS.len());
    for (name, email, matricule, administration) in USERS {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (name, email, matricule, administration, role, is_approved)
            VALUES ($1, $2, $3, $4, 'user', true)
            ON CONFLICT (email) DO UPDATE SET administration = EXCLUDED.administration
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(matricule)
        .bind(administration)
        .fetch_one(pool)
        .await?;
        ids.push(id);
    }

    println!("[done] {} users", ids.len());
    Ok(ids)
}

async fn seed_products(pool: &PgPool) -> anyhow::Result<Vec<Uuid>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        println!("[skip] Products already present ({count})");
        let ids = sqlx::query_scalar("SELECT id FROM products ORDER BY created_at, name")
            .fetch_all(pool)
            .await?;
        return Ok(ids);
    }

    let mut ids = Vec::with_capacity(PRODUCTS.len());
    for name in PRODUCTS {
        let id: Uuid = sqlx::query_scalar("INSERT INTO products (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await?;
        ids.push(id);
    }

    println!("[done] {} products", ids.len());
    Ok(ids)
}

/// Deterministic spread of statuses, dates, and line items. Every fifth
/// approved order has its `delivered` flag set without the status, the way
/// legacy writes left it.
async fn seed_orders(pool: &PgPool, users: &[Uuid], products: &[Uuid]) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        println!("[skip] Orders already present ({count})");
        return Ok(());
    }
    if users.is_empty() || products.is_empty() {
        anyhow::bail!("no users or products to build orders from");
    }

    let mut tx = pool.begin().await?;
    for i in 0..ORDER_COUNT {
        let status = match i % 7 {
            0 | 1 => OrderStatus::Pending,
            2 | 3 => OrderStatus::Approved,
            4 => OrderStatus::Rejected,
            _ => OrderStatus::Delivered,
        };
        let delivered = status == OrderStatus::Delivered
            || (status == OrderStatus::Approved && i % 5 == 0);
        let days_ago = (i as i64 * 3) % DAYS_BACK;

        let order_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, status, delivered, created_at, updated_at)
            VALUES ($1, $2, $3, now() - make_interval(days => $4), now() - make_interval(days => $4))
            RETURNING id
            "#,
        )
        .bind(users[i % users.len()])
        .bind(status)
        .bind(delivered)
        .bind(days_ago as i32)
        .fetch_one(&mut *tx)
        .await?;

        for line in 0..(1 + i % 3) {
            let product = products[(i * 5 + line * 7) % products.len()];
            let quantity = (1 + (i + line) % 6) as i32;
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(order_id)
            .bind(product)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;

    println!("[done] {ORDER_COUNT} orders over the last {DAYS_BACK} days");
    Ok(())
}
