//! PostgreSQL implementation of [`OrderStore`].
//!
//! All aggregation happens in SQL; the grouped queries return one row per
//! group so their cost stays bounded regardless of table size.

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AdministrationCount, DayCount, DeliveredItem, DeliveredOrder, DeliverySplitRow, OrderStore,
    ProductQuantity, StatusCount, StoreError, SummaryRow, Table, TableSignal, UserDeliveryCount,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl OrderStore for PgStore {
    async fn table_signal(&self, table: Table) -> Result<TableSignal, StoreError> {
        // order_items carries no timestamps; its count is the only signal.
        let sql = match table {
            Table::Orders => {
                "SELECT COUNT(*) AS row_count, MAX(updated_at) AS last_modified FROM orders"
            }
            Table::Users => {
                "SELECT COUNT(*) AS row_count, MAX(updated_at) AS last_modified FROM users"
            }
            Table::Products => {
                "SELECT COUNT(*) AS row_count, MAX(updated_at) AS last_modified FROM products"
            }
            Table::OrderItems => {
                "SELECT COUNT(*) AS row_count, NULL::timestamptz AS last_modified FROM order_items"
            }
        };
        let signal = sqlx::query_as::<_, TableSignal>(sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(signal)
    }

    async fn status_counts(&self) -> Result<Vec<StatusCount>, StoreError> {
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delivery_split(&self) -> Result<DeliverySplitRow, StoreError> {
        let row = sqlx::query_as::<_, DeliverySplitRow>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN delivered OR status = 'delivered' THEN 1 ELSE 0 END), 0) AS delivered,
                COALESCE(SUM(CASE WHEN delivered OR status = 'delivered' THEN 0 ELSE 1 END), 0) AS not_delivered
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn summary_counts(&self) -> Result<SummaryRow, StoreError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN delivered OR status = 'delivered' THEN 1 ELSE 0 END), 0) AS delivered,
                COALESCE(SUM(CASE
                    WHEN NOT (delivered OR status = 'delivered') AND status <> 'rejected' THEN 1
                    ELSE 0
                END), 0) AS pending_delivery
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_delivered_orders(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE delivered OR status = 'delivered'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delivered_items(&self) -> Result<Vec<DeliveredItem>, StoreError> {
        let rows = sqlx::query_as::<_, DeliveredItem>(
            r#"
            SELECT
                p.id              AS product_id,
                p.name            AS product_name,
                oi.quantity::BIGINT AS quantity,
                o.created_at      AS order_created_at
            FROM order_items oi
            INNER JOIN orders o ON o.id = oi.order_id
            INNER JOIN products p ON p.id = oi.product_id
            WHERE o.delivered OR o.status = 'delivered'
            ORDER BY o.created_at, o.id, oi.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delivered_product_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT oi.product_id
            FROM order_items oi
            INNER JOIN orders o ON o.id = oi.order_id
            WHERE o.delivered OR o.status = 'delivered'
            ORDER BY oi.product_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn product_quantities(
        &self,
        product_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ProductQuantity>, StoreError> {
        let rows = sqlx::query_as::<_, ProductQuantity>(
            r#"
            SELECT
                p.id                       AS product_id,
                p.name                     AS product_name,
                SUM(oi.quantity)::BIGINT   AS quantity,
                MIN(o.created_at)          AS first_seen
            FROM order_items oi
            INNER JOIN orders o ON o.id = oi.order_id
            INNER JOIN products p ON p.id = oi.product_id
            WHERE (o.delivered OR o.status = 'delivered')
              AND ($1::uuid[] IS NULL OR p.id = ANY($1))
            GROUP BY p.id, p.name
            "#,
        )
        .bind(product_ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delivered_orders(&self) -> Result<Vec<DeliveredOrder>, StoreError> {
        let rows = sqlx::query_as::<_, DeliveredOrder>(
            r#"
            SELECT
                o.id              AS order_id,
                u.id              AS user_id,
                u.name            AS user_name,
                u.unite           AS unite,
                u.administration  AS administration,
                o.created_at      AS created_at
            FROM orders o
            INNER JOIN users u ON u.id = o.user_id
            WHERE o.delivered OR o.status = 'delivered'
            ORDER BY o.created_at, o.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn administration_counts(&self) -> Result<Vec<AdministrationCount>, StoreError> {
        let rows = sqlx::query_as::<_, AdministrationCount>(
            r#"
            SELECT
                TRIM(u.administration) AS administration,
                COUNT(o.id)            AS count,
                MIN(o.created_at)      AS first_seen
            FROM orders o
            INNER JOIN users u ON u.id = o.user_id
            WHERE (o.delivered OR o.status = 'delivered')
              AND u.administration IS NOT NULL
              AND TRIM(u.administration) <> ''
            GROUP BY TRIM(u.administration)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn user_delivery_counts(&self) -> Result<Vec<UserDeliveryCount>, StoreError> {
        let rows = sqlx::query_as::<_, UserDeliveryCount>(
            r#"
            SELECT
                u.id              AS user_id,
                u.name            AS user_name,
                u.unite           AS unite,
                COUNT(o.id)       AS count,
                MIN(o.created_at) AS first_seen
            FROM orders o
            INNER JOIN users u ON u.id = o.user_id
            WHERE o.delivered OR o.status = 'delivered'
            GROUP BY u.id, u.name, u.unite
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn orders_per_day(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayCount>, StoreError> {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to
            .succ_opt()
            .unwrap_or(to)
            .and_time(NaiveTime::MIN)
            .and_utc();
        let rows = sqlx::query_as::<_, DayCount>(
            r#"
            SELECT
                (created_at AT TIME ZONE 'UTC')::date AS day,
                COUNT(*)                              AS count
            FROM orders
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
