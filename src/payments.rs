//! Payment webhook intake
//!
//! The payment processor notifies the backend of completed charges and
//! refunds through a signed callback. This module verifies the HMAC-SHA256
//! signature header (`t=<unix>,v1=<hex>` over `"{timestamp}.{body}"`),
//! rejects stale deliveries outside the replay tolerance window, and relays
//! verified events into the event-capture and refund paths. The backend's
//! only contract here is "insert a sale on verified completion" and "mark a
//! sale refunded on verified refund".

use crate::{
    database::Database,
    error::{AppError, AppResult},
    events::EventService,
    models::{PaymentWebhookEvent, ProductSale},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Event types the processor is expected to deliver
const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";
const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";

/// Reasons a webhook signature is rejected
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Malformed signature digest")]
    MalformedDigest,

    #[error("Signature timestamp out of tolerance")]
    StaleTimestamp,

    #[error("Signature mismatch")]
    Mismatch,
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::Payment(err.to_string())
    }
}

/// Outcome of one processed webhook delivery
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookOutcome {
    pub event_type: String,
    pub sale_id: Option<uuid::Uuid>,
}

/// Service verifying and dispatching payment webhook deliveries
#[derive(Clone)]
pub struct PaymentService {
    database: Arc<Database>,
    events: EventService,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl PaymentService {
    pub fn new(
        database: Arc<Database>,
        events: EventService,
        webhook_secret: String,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            database,
            events,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Verifies the signature header against the raw request body
    pub fn verify_signature(&self, signature_header: &str, body: &str) -> AppResult<()> {
        check_signature(
            &self.webhook_secret,
            self.tolerance_secs,
            Utc::now().timestamp(),
            signature_header,
            body,
        )?;
        Ok(())
    }

    /// Verifies and dispatches one webhook delivery
    pub async fn handle_webhook(&self, signature_header: &str, body: &str) -> AppResult<WebhookOutcome> {
        self.verify_signature(signature_header, body)?;

        let event: PaymentWebhookEvent = serde_json::from_str(body)
            .map_err(|e| AppError::Payment(format!("Malformed webhook payload: {}", e)))?;

        match event.event_type.as_str() {
            EVENT_CHECKOUT_COMPLETED => {
                let sale = self.record_completed_sale(&event).await?;
                Ok(WebhookOutcome {
                    event_type: event.event_type,
                    sale_id: Some(sale.id),
                })
            }
            EVENT_CHARGE_REFUNDED => {
                let sale = self.refund_sale(&event).await?;
                Ok(WebhookOutcome {
                    event_type: event.event_type,
                    sale_id: Some(sale.id),
                })
            }
            other => {
                // Unknown event types are acknowledged without action so the
                // processor does not retry them forever.
                warn!("Ignoring unhandled payment event type: {}", other);
                Ok(WebhookOutcome {
                    event_type: other.to_string(),
                    sale_id: None,
                })
            }
        }
    }

    async fn record_completed_sale(&self, event: &PaymentWebhookEvent) -> AppResult<ProductSale> {
        let data = &event.data;
        let sale = self
            .events
            .record_sale(data.product_id, data.buyer_id, data.amount, &data.payment_ref)
            .await?;

        info!(
            "Webhook recorded sale {} ({} for product {})",
            sale.id, sale.amount, sale.product_id
        );
        Ok(sale)
    }

    async fn refund_sale(&self, event: &PaymentWebhookEvent) -> AppResult<ProductSale> {
        let existing = self
            .database
            .get_sale_by_payment_ref(&event.data.payment_ref)
            .await?
            .ok_or_else(|| AppError::NotFound("No sale for payment reference".to_string()))?;

        match self.database.mark_sale_refunded(existing.id).await? {
            Some(sale) => Ok(sale),
            // Already refunded; replays settle on the same end state.
            None => Ok(existing),
        }
    }
}

/// Checks an HMAC-SHA256 signature header against a raw body
///
/// The header carries the signing timestamp and a digest of
/// `"{timestamp}.{body}"`. Deliveries whose timestamp falls outside the
/// tolerance window around `now` are rejected even with a valid digest.
fn check_signature(
    secret: &str,
    tolerance_secs: i64,
    now: i64,
    signature_header: &str,
    body: &str,
) -> Result<(), SignatureError> {
    let (timestamp, digest_hex) = parse_signature_header(signature_header)?;

    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::StaleTimestamp);
    }

    let digest = hex::decode(digest_hex).map_err(|_| SignatureError::MalformedDigest)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedDigest)?;
    mac.update(format!("{}.{}", timestamp, body).as_bytes());

    mac.verify_slice(&digest).map_err(|_| SignatureError::Mismatch)
}

/// Splits a `t=<unix>,v1=<hex>` signature header into its parts
fn parse_signature_header(header: &str) -> Result<(i64, &str), SignatureError> {
    let mut timestamp = None;
    let mut digest = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => {
                digest = Some(value);
            }
            _ => {}
        }
    }

    match (timestamp, digest) {
        (Some(t), Some(d)) => Ok((t, d)),
        _ => Err(SignatureError::MalformedHeader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_0123456789";

    /// Builds a valid signature header for a body at the given timestamp
    fn sign(body: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    /// Tests signature header parsing
    #[test]
    fn test_parse_signature_header() {
        let (t, d) = parse_signature_header("t=1700000000,v1=deadbeef").unwrap();
        assert_eq!(t, 1700000000);
        assert_eq!(d, "deadbeef");

        assert!(parse_signature_header("v1=deadbeef").is_err());
        assert!(parse_signature_header("t=notanumber,v1=deadbeef").is_err());
        assert!(parse_signature_header("").is_err());
    }

    /// Tests that a correctly signed body verifies
    #[test]
    fn test_valid_signature_accepted() {
        let body = r#"{"type":"checkout.completed"}"#;
        let now = 1_700_000_000;
        let header = sign(body, now);

        assert!(check_signature(SECRET, 300, now, &header, body).is_ok());
        // Small clock skew inside the tolerance window is fine.
        assert!(check_signature(SECRET, 300, now + 120, &header, body).is_ok());
    }

    /// Tests that a tampered body or wrong secret is rejected
    #[test]
    fn test_tampered_signature_rejected() {
        let body = r#"{"type":"checkout.completed"}"#;
        let now = 1_700_000_000;
        let header = sign(body, now);

        let tampered = r#"{"type":"charge.refunded"}"#;
        assert_eq!(
            check_signature(SECRET, 300, now, &header, tampered),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            check_signature("whsec_other_secret", 300, now, &header, body),
            Err(SignatureError::Mismatch)
        );
    }

    /// Tests that stale deliveries fail even with a valid digest
    #[test]
    fn test_stale_signature_rejected() {
        let body = r#"{"type":"checkout.completed"}"#;
        let signed_at = 1_700_000_000;
        let header = sign(body, signed_at);

        let err = check_signature(SECRET, 300, signed_at + 301, &header, body).unwrap_err();
        assert_eq!(err, SignatureError::StaleTimestamp);

        // Timestamps from the future are equally suspect.
        assert_eq!(
            check_signature(SECRET, 300, signed_at - 301, &header, body),
            Err(SignatureError::StaleTimestamp)
        );
    }
}
