//! Gamestash marketplace backend
//!
//! HTTP API for a digital marketplace where sellers list products and track
//! how they perform. The backend records raw view/like/sale events, rolls
//! them up into per-product daily analytics rows, and serves dashboard-ready
//! series from those rollups. Also covers payment webhook intake, signed
//! storage URLs for product files, and a small admin back office.

use anyhow::Result;
use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod analytics;
mod auth;
mod config;
mod database;
mod error;
mod events;
mod metrics;
mod middleware_auth;
mod models;
mod payments;
mod rollup;
mod storage;

use analytics::{AnalyticsService, DEFAULT_WINDOW_DAYS};
use auth::{require_admin, AuthService};
use config::Config;
use database::Database;
use error::{AppError, AppResult};
use events::EventService;
use metrics::MetricsService;
use middleware_auth::Actor;
use models::*;
use payments::PaymentService;
use rollup::RollupService;
use storage::StorageService;

/// Shared application state containing all service instances
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
    pub auth: Arc<AuthService>,
    pub events: EventService,
    pub rollup: RollupService,
    pub analytics: AnalyticsService,
    pub payments: PaymentService,
    pub storage: StorageService,
    pub metrics: Arc<MetricsService>,
}

/// Standard API response wrapper for consistent JSON responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful API response with data
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Header carrying the payment webhook signature
const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Health check response with system status information
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    services: ServiceStatus,
}

/// Status of individual services for health monitoring
#[derive(Serialize)]
struct ServiceStatus {
    database: bool,
}

/// Request body for the admin rollup trigger; omitted date means today
#[derive(Deserialize)]
struct RollupRequest {
    date: Option<chrono::NaiveDate>,
}

/// Main entry point for the Gamestash backend
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Gamestash backend");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    // Initialize services
    let database = Arc::new(Database::new(&config.database_url, config.database_max_connections).await?);
    database.migrate().await?;
    info!("Database connection established");

    let auth = Arc::new(AuthService::new(&config)?);
    let metrics = Arc::new(MetricsService::new());
    let events = EventService::new(database.clone(), metrics.clone());
    let rollup = RollupService::new(database.clone(), metrics.clone());
    let analytics = AnalyticsService::new(database.clone());
    let payments = PaymentService::new(
        database.clone(),
        events.clone(),
        config.payments.webhook_secret.clone(),
        config.payments.signature_tolerance_secs,
    );
    let storage = StorageService::new(&config.storage);

    info!("All services initialized successfully");

    // Create application state
    let state = AppState {
        config: config.clone(),
        database,
        auth,
        events,
        rollup,
        analytics,
        payments,
        storage,
        metrics,
    };

    // Build router
    let app = Router::new()
        // Health and status endpoints
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))

        // Authentication endpoints
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/logout", post(logout_user))

        // User surface
        .route("/user/profile", get(get_user_profile))
        .route("/dashboard", get(get_user_dashboard))

        // Product listings
        .route("/products", get(list_products))
        .route("/products", post(create_product))
        .route("/products/:id", get(get_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id", delete(delete_product))
        .route("/products/:id/publish", post(publish_product))

        // Event capture and analytics
        .route("/products/:id/view", post(record_view))
        .route("/products/:id/like", post(toggle_like))
        .route("/products/:id/analytics", get(get_product_analytics))

        // File storage
        .route("/uploads/sign", post(sign_upload))
        .route("/downloads/:product_id/url", get(get_download_url))

        // Payment webhook (unauthenticated, signature-verified)
        .route("/webhooks/payments", post(payment_webhook))

        // Admin endpoints
        .route("/admin/users", get(admin_list_users))
        .route("/admin/sales/:id/refund", post(admin_refund_sale))
        .route("/admin/rollup", post(admin_run_rollup))
        .route("/admin/terms", get(admin_get_terms))
        .route("/admin/terms", put(admin_update_terms))

        // Add middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.server_address).await?;
    info!("Server listening on {}", config.server_address);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Returns the current health status of all system components
async fn health_check(State(state): State<AppState>) -> AppResult<Json<ApiResponse<HealthResponse>>> {
    let db_status = state.database.health_check().await.is_ok();

    let response = HealthResponse {
        status: if db_status { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        services: ServiceStatus { database: db_status },
    };

    Ok(Json(ApiResponse::success(response)))
}

/// Exposes system metrics in JSON format for monitoring
async fn get_metrics(State(state): State<AppState>) -> AppResult<String> {
    let metrics = state.metrics.get_metrics_snapshot().await;
    Ok(serde_json::to_string(&metrics)?)
}

/// Creates a new user account
async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let response = state.auth.register_user(&state.database, payload).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Authenticates user credentials and returns an access token
async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let response = state.auth.login_user(&state.database, payload).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Drops the caller's cached session so the token stops resolving early
async fn logout_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    actor.require()?;
    if let Some(token) = middleware_auth::bearer_token(&headers) {
        state.auth.invalidate_session(&token).await;
    }
    Ok(Json(ApiResponse::success(())))
}

/// Fetches profile information for the authenticated user
async fn get_user_profile(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let auth_user = actor.require()?;
    let user = state
        .database
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

/// Aggregated daily series and top products across the actor's catalog
async fn get_user_dashboard(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(window): Query<WindowQuery>,
) -> AppResult<Json<ApiResponse<UserDashboard>>> {
    let auth_user = actor.require()?;
    let days = window.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let dashboard = state.analytics.compose_user_dashboard(auth_user.id, days).await?;
    Ok(Json(ApiResponse::success(dashboard)))
}

/// Lists published products for the public storefront
async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let products = state.database.list_published_products(pagination).await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Creates a new draft listing owned by the authenticated user
async fn create_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let auth_user = actor.require()?;
    if payload.title.trim().is_empty() {
        return Err(validation_error!("Title cannot be empty"));
    }
    if payload.price < rust_decimal::Decimal::ZERO {
        return Err(validation_error!("Price cannot be negative"));
    }
    let product = state.database.create_product(auth_user.id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Retrieves a single product; drafts are visible only to their owner
async fn get_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = state
        .database
        .get_product_by_id(id)
        .await?
        .ok_or_else(|| not_found_error!("Product not found"))?;

    if product.status == ProductStatus::Draft && actor.user_id() != Some(product.user_id) {
        return Err(not_found_error!("Product not found"));
    }

    Ok(Json(ApiResponse::success(product)))
}

/// Updates a listing owned by the authenticated user
async fn update_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let auth_user = actor.require()?;
    let product = owned_product(&state, auth_user.id, id).await?;

    if let Some(price) = payload.price {
        if price < rust_decimal::Decimal::ZERO {
            return Err(validation_error!("Price cannot be negative"));
        }
    }

    let updated = state
        .database
        .update_product(product.id, payload)
        .await?
        .ok_or_else(|| not_found_error!("Product not found"))?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Deletes a listing owned by the authenticated user
async fn delete_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let auth_user = actor.require()?;
    let product = owned_product(&state, auth_user.id, id).await?;

    state.database.delete_product(product.id).await?;
    Ok(Json(ApiResponse::success(())))
}

/// Moves a draft listing to the published state
async fn publish_product(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let auth_user = actor.require()?;
    let product = owned_product(&state, auth_user.id, id).await?;

    let published = state
        .database
        .publish_product(product.id)
        .await?
        .ok_or_else(|| not_found_error!("Product not found"))?;
    Ok(Json(ApiResponse::success(published)))
}

/// Records a page view; anonymous visitors are allowed
async fn record_view(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    let ctx = view_context(&headers);
    state.events.record_view(id, actor.user_id(), ctx).await?;
    Ok(Json(ApiResponse::success(())))
}

/// Toggles the authenticated user's like on a product
async fn toggle_like(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<LikeToggle>>> {
    let toggle = state.events.toggle_like(id, actor.user_id()).await?;
    Ok(Json(ApiResponse::success(toggle)))
}

/// Daily series and lifetime totals for one owned product
async fn get_product_analytics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
    Query(window): Query<WindowQuery>,
) -> AppResult<Json<ApiResponse<ProductSeries>>> {
    let auth_user = actor.require()?;
    let days = window.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let series = state.analytics.compose_product_series(auth_user.id, id, days).await?;
    Ok(Json(ApiResponse::success(series)))
}

/// Mints a signed upload URL for a new product file
async fn sign_upload(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<SignUploadRequest>,
) -> AppResult<Json<ApiResponse<SignedUrlResponse>>> {
    let auth_user = actor.require()?;
    let signed = state.storage.sign_upload(auth_user.id, &payload.file_name)?;
    Ok(Json(ApiResponse::success(signed)))
}

/// Mints a signed download URL for a product file
///
/// Available to the product's owner and to buyers holding a completed
/// (non-refunded) purchase.
async fn get_download_url(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(product_id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<SignedUrlResponse>>> {
    let auth_user = actor.require()?;

    let product = state
        .database
        .get_product_by_id(product_id)
        .await?
        .ok_or_else(|| not_found_error!("Product not found"))?;

    let is_owner = product.user_id == auth_user.id;
    if !is_owner && !state.database.has_completed_purchase(auth_user.id, product_id).await? {
        return Err(auth_error!("Purchase required to download"));
    }

    let key = product
        .storage_key
        .as_deref()
        .ok_or_else(|| not_found_error!("Product has no stored file"))?;
    let signed = state.storage.sign_download(key)?;
    Ok(Json(ApiResponse::success(signed)))
}

/// Verifies and processes a payment processor webhook delivery
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<ApiResponse<payments::WebhookOutcome>>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Payment("Missing webhook signature header".to_string()))?;

    let outcome = state.payments.handle_webhook(signature, &body).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Admin endpoint to retrieve a paginated list of all users
async fn admin_list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<Vec<UserResponse>>>> {
    require_admin(actor.require()?)?;
    let users = state.database.list_users(pagination).await?;
    let users = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::success(users)))
}

/// Admin endpoint to refund a completed sale
async fn admin_refund_sale(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<ApiResponse<ProductSale>>> {
    require_admin(actor.require()?)?;

    let sale = state
        .database
        .get_sale_by_id(id)
        .await?
        .ok_or_else(|| not_found_error!("Sale not found"))?;

    match state.database.mark_sale_refunded(sale.id).await? {
        Some(refunded) => Ok(Json(ApiResponse::success(refunded))),
        None => Err(AppError::Conflict("Sale is already refunded".to_string())),
    }
}

/// Admin endpoint triggering a rollup run for today or a backfill date
///
/// This is the entry point an external scheduler hits once a day; re-running
/// for any date is safe.
async fn admin_run_rollup(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Option<Json<RollupRequest>>,
) -> AppResult<Json<ApiResponse<RollupRunSummary>>> {
    require_admin(actor.require()?)?;

    let summary = match payload.and_then(|Json(body)| body.date) {
        Some(date) => state.rollup.run_for_date(date).await?,
        None => state.rollup.run_for_today().await?,
    };
    Ok(Json(ApiResponse::success(summary)))
}

/// Admin endpoint returning the current terms-of-service document
async fn admin_get_terms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<Json<ApiResponse<SiteContent>>> {
    require_admin(actor.require()?)?;
    let content = state
        .database
        .get_content("terms")
        .await?
        .ok_or_else(|| not_found_error!("Terms not set"))?;
    Ok(Json(ApiResponse::success(content)))
}

/// Admin endpoint replacing the terms-of-service document
async fn admin_update_terms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<UpdateContentRequest>,
) -> AppResult<Json<ApiResponse<SiteContent>>> {
    let auth_user = actor.require()?;
    require_admin(auth_user)?;

    let content = state
        .database
        .upsert_content("terms", &payload.value, auth_user.id)
        .await?;
    Ok(Json(ApiResponse::success(content)))
}

/// Loads a product and checks the actor owns it
async fn owned_product(state: &AppState, actor_id: uuid::Uuid, product_id: uuid::Uuid) -> AppResult<Product> {
    let product = state
        .database
        .get_product_by_id(product_id)
        .await?
        .ok_or_else(|| not_found_error!("Product not found"))?;

    if product.user_id != actor_id {
        return Err(auth_error!("Not the owner of this product"));
    }
    Ok(product)
}

/// Captures the request context stored alongside a view event
fn view_context(headers: &HeaderMap) -> ViewContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    };

    ViewContext {
        ip: header("x-forwarded-for"),
        user_agent: header("user-agent"),
        referrer: header("referer"),
    }
}
