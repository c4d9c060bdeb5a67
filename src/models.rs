//! Database models and schema definitions
//!
//! Complete data model for the Gamestash marketplace: user accounts, product
//! listings, the raw event tables (views, likes, sales), the derived daily
//! analytics rollups, and the request/response payloads used by the API.
//! All models are designed for PostgreSQL with proper serialization support.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

// User accounts

/// Core user entity with email/password authentication
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub total_views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Request payload for creating a new user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
}

/// Email/password login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login response with a JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Public-facing user profile, never carries credential material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub total_views: i64,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_admin: user.is_admin,
            total_views: user.total_views,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

// Product listings

/// Lifecycle status of a product listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "product_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Published,
}

/// Marketplace listing with cached lifetime counters
///
/// The `views`/`likes`/`sales`/`revenue` columns are eventually-consistent
/// mirrors of the event tables, bumped at event-capture time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub status: ProductStatus,
    pub storage_key: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for creating a new listing (starts as a draft)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
}

/// Request payload for updating an existing listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub storage_key: Option<String>,
}

// Event tables

/// Single recorded page view; append-only, never updated
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Context captured alongside a view event; all fields are free text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// A user's like on a product; at most one row per (user, product)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductLike {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a like toggle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
}

/// Status of a sale in the payment lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "sale_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Refunded,
}

/// Completed purchase of a product, recorded from the payment webhook
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductSale {
    pub id: Uuid,
    pub product_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub status: SaleStatus,
    pub seller_consent: bool,
    pub payment_ref: String,
    pub created_at: DateTime<Utc>,
}

// Daily rollups

/// One precomputed summary row per (date, product)
///
/// Derived entirely from the event tables; the aggregator overwrites the
/// measures on every run, so this row is a cache, not a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyAnalytics {
    pub id: Uuid,
    pub date: NaiveDate,
    pub product_id: Uuid,
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Freshly computed measures for one (date, product) pair, pre-upsert
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMeasures {
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
}

/// Per-date totals for one product or summed across a user's catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySeriesPoint {
    pub date: NaiveDate,
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
}

/// Per-date grouped sums as returned by the dashboard query
#[derive(Debug, Clone, FromRow)]
pub struct DailyTotalsRow {
    pub date: NaiveDate,
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
}

/// Zero-filled series plus lifetime totals for a single product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSeries {
    pub product_id: Uuid,
    pub window_days: u32,
    pub series: Vec<DailySeriesPoint>,
    pub lifetime: LifetimeTotals,
}

/// Lifetime counters read from the product row's cached columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimeTotals {
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
}

impl From<&Product> for LifetimeTotals {
    fn from(product: &Product) -> Self {
        Self {
            views: product.views,
            likes: product.likes,
            sales: product.sales,
            revenue: product.revenue,
        }
    }
}

/// Aggregated dashboard for all of a user's products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDashboard {
    pub user_id: Uuid,
    pub window_days: u32,
    pub series: Vec<DailySeriesPoint>,
    pub top_products: Vec<ProductRanking>,
}

/// Ranking entry ordered by lifetime views descending
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductRanking {
    pub id: Uuid,
    pub title: String,
    pub status: ProductStatus,
    pub views: i64,
    pub likes: i64,
    pub sales: i64,
    pub revenue: Decimal,
}

/// Summary of one aggregator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupRunSummary {
    pub date: NaiveDate,
    pub products_processed: u64,
    pub products_failed: u64,
}

// Payment webhook payloads

/// Webhook event relayed by the payment processor after verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

/// Charge details carried by a payment webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventData {
    pub payment_ref: String,
    pub product_id: Uuid,
    pub buyer_id: Uuid,
    pub amount: Decimal,
}

// Signed URL payloads

/// Request for a time-limited signed upload URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUploadRequest {
    pub file_name: String,
}

/// Signed URL response with its expiry timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub key: String,
    pub expires_at: i64,
}

// Site content

/// Admin-edited content document (terms of service)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SiteContent {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

/// Request payload for replacing a content document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContentRequest {
    pub value: String,
}

// Pagination

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for windowed analytics requests
#[derive(Debug, Clone, Deserialize)]
pub struct WindowQuery {
    pub days: Option<u32>,
}
