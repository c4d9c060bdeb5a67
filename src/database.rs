//! Database operations and connection management
//!
//! Provides the storage layer for the Gamestash marketplace, handling
//! PostgreSQL connections, migrations, and all queries for users, products,
//! the raw event tables, and the daily analytics rollups. Event inserts and
//! their paired counter bumps run inside a single transaction so the cached
//! counters and the event tables cannot drift on a partial write.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::models::*;

/// Outcome of a like insert attempt under the (user, product) unique constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeInsert {
    Inserted,
    /// A concurrent writer won the race; treated as "already liked"
    AlreadyLiked,
}

/// Main database service with connection pooling
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Creates a new database connection with optimized pool settings
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        info!("Connected to database with {} max connections", max_connections);

        Ok(Self { pool })
    }

    /// Runs pending database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Verifies database connectivity
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    // === User accounts ===

    /// Creates a new user account with a pre-hashed password
    pub async fn create_user(&self, email: &str, username: Option<&str>, password_hash: &str) -> Result<User> {
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, password_hash, is_admin, is_active,
                      total_views, created_at, updated_at, last_login
            "#
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create user")?;

        info!("Created user with ID: {}", user.id);
        Ok(user)
    }

    /// Retrieves user by their unique ID
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, is_active,
                   total_views, created_at, updated_at, last_login
            FROM users WHERE id = $1
            "#
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Finds an active user by email for login
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, is_active,
                   total_views, created_at, updated_at, last_login
            FROM users WHERE email = $1 AND is_active = true
            "#
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by email")?;

        Ok(user)
    }

    /// Updates the last login timestamp for a user
    pub async fn update_user_last_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update user last login")?;

        Ok(())
    }

    /// Lists all users with pagination support
    pub async fn list_users(&self, pagination: Pagination) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_admin, is_active,
                   total_views, created_at, updated_at, last_login
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        )
        .bind(pagination.limit.unwrap_or(100))
        .bind(pagination.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        Ok(users)
    }

    // === Product listings ===

    /// Creates a new draft listing owned by the given user
    pub async fn create_product(&self, user_id: Uuid, request: CreateProductRequest) -> Result<Product> {
        let now = Utc::now();

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (user_id, title, description, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, title, description, price, status, storage_key,
                      views, likes, sales, revenue, created_at, updated_at
            "#
        )
        .bind(user_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.price)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create product")?;

        info!("Created product: {} (ID: {})", product.title, product.id);
        Ok(product)
    }

    /// Retrieves a product by ID
    pub async fn get_product_by_id(&self, product_id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, user_id, title, description, price, status, storage_key,
                   views, likes, sales, revenue, created_at, updated_at
            FROM products WHERE id = $1
            "#
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get product by ID")?;

        Ok(product)
    }

    /// Updates mutable listing fields
    pub async fn update_product(&self, product_id: Uuid, request: UpdateProductRequest) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                storage_key = COALESCE($5, storage_key),
                updated_at = $6
            WHERE id = $1
            RETURNING id, user_id, title, description, price, status, storage_key,
                      views, likes, sales, revenue, created_at, updated_at
            "#
        )
        .bind(product_id)
        .bind(request.title)
        .bind(request.description)
        .bind(request.price)
        .bind(request.storage_key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update product")?;

        Ok(product)
    }

    /// Moves a draft listing to published
    pub async fn publish_product(&self, product_id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET status = 'published', updated_at = $2
            WHERE id = $1
            RETURNING id, user_id, title, description, price, status, storage_key,
                      views, likes, sales, revenue, created_at, updated_at
            "#
        )
        .bind(product_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to publish product")?;

        Ok(product)
    }

    /// Deletes a listing; event rows cascade at the storage layer
    pub async fn delete_product(&self, product_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete product")?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists published products for the public catalog
    pub async fn list_published_products(&self, pagination: Pagination) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, user_id, title, description, price, status, storage_key,
                   views, likes, sales, revenue, created_at, updated_at
            FROM products
            WHERE status = 'published'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        )
        .bind(pagination.limit.unwrap_or(50))
        .bind(pagination.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list published products")?;

        Ok(products)
    }

    /// Enumerates every product ID, drafts included, for the rollup run
    pub async fn list_product_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM products ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list product IDs")?;

        Ok(ids)
    }

    // === Event capture ===

    /// Records a view event and bumps the cached counters in one transaction
    ///
    /// Returns `None` when the product does not exist; nothing is written in
    /// that case.
    pub async fn insert_view_event(
        &self,
        product_id: Uuid,
        actor_id: Option<Uuid>,
        ctx: &ViewContext,
    ) -> Result<Option<ProductView>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let owner_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE products SET views = views + 1 WHERE id = $1 RETURNING user_id"
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to bump product view counter")?;

        let Some(owner_id) = owner_id else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        sqlx::query("UPDATE users SET total_views = total_views + 1 WHERE id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to bump owner view counter")?;

        let view = sqlx::query_as::<_, ProductView>(
            r#"
            INSERT INTO product_views (product_id, user_id, ip, user_agent, referrer, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, product_id, user_id, ip, user_agent, referrer, created_at
            "#
        )
        .bind(product_id)
        .bind(actor_id)
        .bind(&ctx.ip)
        .bind(&ctx.user_agent)
        .bind(&ctx.referrer)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert view event")?;

        tx.commit().await.context("Failed to commit view event")?;
        Ok(Some(view))
    }

    /// Looks up an existing like row for a (user, product) pair
    pub async fn get_like(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<ProductLike>> {
        let like = sqlx::query_as::<_, ProductLike>(
            r#"
            SELECT id, user_id, product_id, created_at
            FROM product_likes WHERE user_id = $1 AND product_id = $2
            "#
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up like")?;

        Ok(like)
    }

    /// Inserts a like and increments the cached counter in one transaction
    ///
    /// A unique-constraint rejection means a concurrent toggle already
    /// inserted the row; the caller must collapse that into "already liked".
    pub async fn insert_like_and_increment(&self, user_id: Uuid, product_id: Uuid) -> Result<LikeInsert> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            "INSERT INTO product_likes (user_id, product_id, created_at) VALUES ($1, $2, $3)"
        )
        .bind(user_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return Ok(LikeInsert::AlreadyLiked);
            }
            Err(err) => {
                tx.rollback().await.ok();
                return Err(err).context("Failed to insert like");
            }
        }

        sqlx::query("UPDATE products SET likes = likes + 1 WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .context("Failed to bump like counter")?;

        tx.commit().await.context("Failed to commit like insert")?;
        Ok(LikeInsert::Inserted)
    }

    /// Deletes a like and decrements the cached counter, floored at zero
    pub async fn delete_like_and_decrement(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            "DELETE FROM product_likes WHERE user_id = $1 AND product_id = $2"
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete like")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        // GREATEST floors the counter so prior drift can never push it negative.
        sqlx::query("UPDATE products SET likes = GREATEST(likes - 1, 0) WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement like counter")?;

        tx.commit().await.context("Failed to commit like delete")?;
        Ok(true)
    }

    /// Records a completed sale and bumps the cached counters in one transaction
    ///
    /// A duplicate payment reference is a webhook replay; the existing sale is
    /// returned unchanged.
    pub async fn insert_sale(
        &self,
        product_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        amount: Decimal,
        payment_ref: &str,
    ) -> Result<ProductSale> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query_as::<_, ProductSale>(
            r#"
            INSERT INTO product_sales (product_id, buyer_id, seller_id, amount, payment_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, product_id, buyer_id, seller_id, amount, status,
                      seller_consent, payment_ref, created_at
            "#
        )
        .bind(product_id)
        .bind(buyer_id)
        .bind(seller_id)
        .bind(amount)
        .bind(payment_ref)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await;

        let sale = match inserted {
            Ok(sale) => sale,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return self
                    .get_sale_by_payment_ref(payment_ref)
                    .await?
                    .context("Sale vanished after duplicate payment reference");
            }
            Err(err) => {
                tx.rollback().await.ok();
                return Err(err).context("Failed to insert sale");
            }
        };

        sqlx::query("UPDATE products SET sales = sales + 1, revenue = revenue + $2 WHERE id = $1")
            .bind(product_id)
            .bind(amount)
            .execute(&mut *tx)
            .await
            .context("Failed to bump sale counters")?;

        tx.commit().await.context("Failed to commit sale")?;
        info!("Recorded sale {} for product {}", sale.id, product_id);
        Ok(sale)
    }

    /// Retrieves a sale by its external payment reference
    pub async fn get_sale_by_payment_ref(&self, payment_ref: &str) -> Result<Option<ProductSale>> {
        let sale = sqlx::query_as::<_, ProductSale>(
            r#"
            SELECT id, product_id, buyer_id, seller_id, amount, status,
                   seller_consent, payment_ref, created_at
            FROM product_sales WHERE payment_ref = $1
            "#
        )
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get sale by payment reference")?;

        Ok(sale)
    }

    /// Retrieves a sale by ID
    pub async fn get_sale_by_id(&self, sale_id: Uuid) -> Result<Option<ProductSale>> {
        let sale = sqlx::query_as::<_, ProductSale>(
            r#"
            SELECT id, product_id, buyer_id, seller_id, amount, status,
                   seller_consent, payment_ref, created_at
            FROM product_sales WHERE id = $1
            "#
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get sale by ID")?;

        Ok(sale)
    }

    /// Checks whether a buyer holds a completed (non-refunded) purchase
    pub async fn has_completed_purchase(&self, buyer_id: Uuid, product_id: Uuid) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM product_sales
            WHERE buyer_id = $1 AND product_id = $2 AND status = 'completed'
            LIMIT 1
            "#
        )
        .bind(buyer_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check purchase")?;

        Ok(row.is_some())
    }

    /// Flips a completed sale to refunded and reverses the cached counters
    ///
    /// Returns `None` when the sale does not exist or is already refunded.
    pub async fn mark_sale_refunded(&self, sale_id: Uuid) -> Result<Option<ProductSale>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let sale = sqlx::query_as::<_, ProductSale>(
            r#"
            UPDATE product_sales SET status = 'refunded'
            WHERE id = $1 AND status = 'completed'
            RETURNING id, product_id, buyer_id, seller_id, amount, status,
                      seller_consent, payment_ref, created_at
            "#
        )
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to mark sale refunded")?;

        let Some(sale) = sale else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE products SET
                sales = GREATEST(sales - 1, 0),
                revenue = GREATEST(revenue - $2, 0)
            WHERE id = $1
            "#
        )
        .bind(sale.product_id)
        .bind(sale.amount)
        .execute(&mut *tx)
        .await
        .context("Failed to reverse sale counters")?;

        tx.commit().await.context("Failed to commit refund")?;
        info!("Refunded sale {} for product {}", sale.id, sale.product_id);
        Ok(Some(sale))
    }

    // === Daily rollups ===

    /// Counts view events for a product within a UTC day window
    pub async fn count_views_in_range(
        &self,
        product_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM product_views
            WHERE product_id = $1 AND created_at >= $2 AND created_at < $3
            "#
        )
        .bind(product_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count views in range")?;

        Ok(count)
    }

    /// Counts like events for a product within a UTC day window
    pub async fn count_likes_in_range(
        &self,
        product_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM product_likes
            WHERE product_id = $1 AND created_at >= $2 AND created_at < $3
            "#
        )
        .bind(product_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count likes in range")?;

        Ok(count)
    }

    /// Counts and sums completed sales for a product within a UTC day window
    ///
    /// Refunded rows are excluded from both measures.
    pub async fn sum_completed_sales_in_range(
        &self,
        product_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(i64, Decimal)> {
        let row: (i64, Decimal) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(amount), 0)
            FROM product_sales
            WHERE product_id = $1 AND status = 'completed'
              AND created_at >= $2 AND created_at < $3
            "#
        )
        .bind(product_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum sales in range")?;

        Ok(row)
    }

    /// Upserts the rollup row for one (date, product) pair
    ///
    /// Re-running for the same date overwrites the measures with the freshly
    /// computed values, keeping the operation idempotent.
    pub async fn upsert_daily_analytics(
        &self,
        date: NaiveDate,
        product_id: Uuid,
        measures: &DailyMeasures,
    ) -> Result<DailyAnalytics> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, DailyAnalytics>(
            r#"
            INSERT INTO daily_analytics (date, product_id, views, likes, sales, revenue, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date, product_id) DO UPDATE SET
                views = EXCLUDED.views,
                likes = EXCLUDED.likes,
                sales = EXCLUDED.sales,
                revenue = EXCLUDED.revenue,
                updated_at = EXCLUDED.updated_at
            RETURNING id, date, product_id, views, likes, sales, revenue, created_at, updated_at
            "#
        )
        .bind(date)
        .bind(product_id)
        .bind(measures.views)
        .bind(measures.likes)
        .bind(measures.sales)
        .bind(measures.revenue)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert daily analytics")?;

        Ok(row)
    }

    /// Fetches rollup rows for a product from a start date onward
    pub async fn get_daily_analytics_since(
        &self,
        product_id: Uuid,
        from_date: NaiveDate,
    ) -> Result<Vec<DailyAnalytics>> {
        let rows = sqlx::query_as::<_, DailyAnalytics>(
            r#"
            SELECT id, date, product_id, views, likes, sales, revenue, created_at, updated_at
            FROM daily_analytics
            WHERE product_id = $1 AND date >= $2
            ORDER BY date
            "#
        )
        .bind(product_id)
        .bind(from_date)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get daily analytics for product")?;

        Ok(rows)
    }

    /// Fetches per-date sums across all of a user's products
    pub async fn get_user_daily_totals_since(
        &self,
        user_id: Uuid,
        from_date: NaiveDate,
    ) -> Result<Vec<DailyTotalsRow>> {
        let rows = sqlx::query_as::<_, DailyTotalsRow>(
            r#"
            SELECT da.date,
                   COALESCE(SUM(da.views), 0)::BIGINT AS views,
                   COALESCE(SUM(da.likes), 0)::BIGINT AS likes,
                   COALESCE(SUM(da.sales), 0)::BIGINT AS sales,
                   COALESCE(SUM(da.revenue), 0) AS revenue
            FROM daily_analytics da
            INNER JOIN products p ON p.id = da.product_id
            WHERE p.user_id = $1 AND da.date >= $2
            GROUP BY da.date
            ORDER BY da.date
            "#
        )
        .bind(user_id)
        .bind(from_date)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get user daily totals")?;

        Ok(rows)
    }

    /// Top products for a user by lifetime views descending
    ///
    /// Ties break by insertion order, which is all the ranking display needs.
    pub async fn get_top_products(&self, user_id: Uuid, limit: i64) -> Result<Vec<ProductRanking>> {
        let rows = sqlx::query_as::<_, ProductRanking>(
            r#"
            SELECT id, title, status, views, likes, sales, revenue
            FROM products
            WHERE user_id = $1
            ORDER BY views DESC, id
            LIMIT $2
            "#
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get top products")?;

        Ok(rows)
    }

    // === Site content ===

    /// Retrieves an admin-edited content document
    pub async fn get_content(&self, key: &str) -> Result<Option<SiteContent>> {
        let content = sqlx::query_as::<_, SiteContent>(
            "SELECT key, value, updated_at, updated_by FROM site_content WHERE key = $1"
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get site content")?;

        Ok(content)
    }

    /// Replaces a content document, recording who changed it
    pub async fn upsert_content(&self, key: &str, value: &str, updated_by: Uuid) -> Result<SiteContent> {
        let content = sqlx::query_as::<_, SiteContent>(
            r#"
            INSERT INTO site_content (key, value, updated_at, updated_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at,
                updated_by = EXCLUDED.updated_by
            RETURNING key, value, updated_at, updated_by
            "#
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert site content")?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rust_decimal_macros::dec;

    async fn setup_test_db() -> Database {
        let config = Config::load().unwrap();
        let db = Database::new(&config.database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    async fn seed_user(db: &Database, email: &str) -> User {
        db.create_user(email, Some("tester"), "hash").await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_like_uniqueness_and_floor() {
        let db = setup_test_db().await;
        let seller = seed_user(&db, "seller-like@test.local").await;
        let buyer = seed_user(&db, "buyer-like@test.local").await;
        let product = db
            .create_product(
                seller.id,
                CreateProductRequest {
                    title: "Desk setup".to_string(),
                    description: None,
                    price: dec!(10.00),
                },
            )
            .await
            .unwrap();

        // First insert succeeds, second collapses into AlreadyLiked.
        assert_eq!(
            db.insert_like_and_increment(buyer.id, product.id).await.unwrap(),
            LikeInsert::Inserted
        );
        assert_eq!(
            db.insert_like_and_increment(buyer.id, product.id).await.unwrap(),
            LikeInsert::AlreadyLiked
        );

        let product = db.get_product_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(product.likes, 1);

        // Unlike, then unlike again: the second delete is a no-op and the
        // counter never goes negative.
        assert!(db.delete_like_and_decrement(buyer.id, product.id).await.unwrap());
        assert!(!db.delete_like_and_decrement(buyer.id, product.id).await.unwrap());

        let product = db.get_product_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(product.likes, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_sale_replay_returns_existing_row() {
        let db = setup_test_db().await;
        let seller = seed_user(&db, "seller-sale@test.local").await;
        let buyer = seed_user(&db, "buyer-sale@test.local").await;
        let product = db
            .create_product(
                seller.id,
                CreateProductRequest {
                    title: "Stream overlay pack".to_string(),
                    description: None,
                    price: dec!(15.50),
                },
            )
            .await
            .unwrap();

        let first = db
            .insert_sale(product.id, buyer.id, seller.id, dec!(15.50), "pay_replay_1")
            .await
            .unwrap();
        let second = db
            .insert_sale(product.id, buyer.id, seller.id, dec!(15.50), "pay_replay_1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);

        let product = db.get_product_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(product.sales, 1);
        assert_eq!(product.revenue, dec!(15.50));
    }
}
