//! Event capture service
//!
//! Records individual marketplace facts as immutable rows: a page view, a
//! like toggle, a completed sale. Each capture also bumps the parent
//! product's cached counters; the storage layer wraps the event insert and
//! the counter bump in one transaction so the two cannot drift on a partial
//! write. Raw event rows are what the daily rollup aggregator reads later.

use crate::{
    database::{Database, LikeInsert},
    error::{AppError, AppResult},
    metrics::MetricsService,
    models::*,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Service recording view/like/sale events against the event tables
#[derive(Clone)]
pub struct EventService {
    database: Arc<Database>,
    metrics: Arc<MetricsService>,
}

impl EventService {
    pub fn new(database: Arc<Database>, metrics: Arc<MetricsService>) -> Self {
        Self { database, metrics }
    }

    /// Records a page view for a product
    ///
    /// Anonymous actors are allowed; ip/user-agent/referrer are stored as
    /// free text without validation. Fails with `NotFound` when the product
    /// id does not resolve at the storage layer.
    pub async fn record_view(
        &self,
        product_id: Uuid,
        actor_id: Option<Uuid>,
        ctx: ViewContext,
    ) -> AppResult<ProductView> {
        let view = self
            .database
            .insert_view_event(product_id, actor_id, &ctx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        self.metrics.record_event("view").await;
        debug!("Recorded view {} for product {}", view.id, product_id);
        Ok(view)
    }

    /// Toggles the actor's like on a product
    ///
    /// Requires an authenticated actor. When a like row already exists it is
    /// removed and the counter decremented (floored at zero); otherwise a row
    /// is inserted. A concurrent toggle losing the unique-constraint race is
    /// collapsed into `{liked: true}` rather than surfaced as an error.
    pub async fn toggle_like(&self, product_id: Uuid, actor_id: Option<Uuid>) -> AppResult<LikeToggle> {
        let actor_id =
            actor_id.ok_or_else(|| AppError::Auth("Authentication required to like".to_string()))?;

        self.database
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        if self.database.get_like(actor_id, product_id).await?.is_some() {
            // Another request may have removed the row since the lookup; a
            // no-op delete still reports unliked, which is the end state.
            self.database.delete_like_and_decrement(actor_id, product_id).await?;
            self.metrics.record_event("unlike").await;
            return Ok(LikeToggle { liked: false });
        }

        match self.database.insert_like_and_increment(actor_id, product_id).await? {
            LikeInsert::Inserted => {
                self.metrics.record_event("like").await;
            }
            LikeInsert::AlreadyLiked => {
                warn!(
                    "Concurrent like insert for user {} on product {}, treating as already liked",
                    actor_id, product_id
                );
            }
        }

        Ok(LikeToggle { liked: true })
    }

    /// Records a completed sale reported by the verified payment webhook
    ///
    /// This function does not verify payment authenticity; that is the
    /// payment collaborator's contract. Replayed payment references return
    /// the previously recorded sale.
    pub async fn record_sale(
        &self,
        product_id: Uuid,
        buyer_id: Uuid,
        amount: Decimal,
        payment_ref: &str,
    ) -> AppResult<ProductSale> {
        if amount < Decimal::ZERO {
            return Err(AppError::Validation("Sale amount cannot be negative".to_string()));
        }

        let product = self
            .database
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        let sale = self
            .database
            .insert_sale(product_id, buyer_id, product.user_id, amount, payment_ref)
            .await?;

        self.metrics.record_event("sale").await;
        Ok(sale)
    }
}
