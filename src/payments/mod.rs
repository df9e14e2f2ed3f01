//! Payment gateway boundary.
//!
//! Covers the two gateway concerns: creating a payment intent for a prepaid
//! order, and proving that an inbound payment confirmation was signed by the
//! gateway rather than forged by a client.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, instrument};

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com";

/// Gateway-side order record, distinct from our own order.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Boundary to the external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for `amount_minor` (minor currency units),
    /// tagged with our order id as the receipt reference.
    async fn create_intent(
        &self,
        receipt: &str,
        amount_minor: i64,
        currency: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Public API key id, handed to the client checkout widget.
    fn key_id(&self) -> &str;
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String) -> Self {
        Self::with_base_url(key_id, key_secret, RAZORPAY_API_BASE.to_string())
    }

    pub fn with_base_url(key_id: String, key_secret: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id,
            key_secret,
            base_url,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, notes), fields(receipt = %receipt, amount_minor))]
    async fn create_intent(
        &self,
        receipt: &str,
        amount_minor: i64,
        currency: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, ServiceError> {
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
            "notes": notes,
        });

        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway order creation request failed");
                ServiceError::Gateway(format!("order creation request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, detail, "gateway rejected order creation");
            return Err(ServiceError::Gateway(format!(
                "gateway rejected order creation with status {}",
                status
            )));
        }

        response.json::<GatewayOrder>().await.map_err(|e| {
            error!(error = %e, "failed to decode gateway order");
            ServiceError::Gateway(format!("failed to decode gateway order: {}", e))
        })
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Expected confirmation signature: lowercase hex HMAC-SHA256 over
/// `"{gateway_order_id}|{gateway_payment_id}"` keyed with the gateway secret.
pub fn expected_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a supplied confirmation signature in constant time.
pub fn verify_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    supplied: &str,
) -> bool {
    let expected = expected_signature(secret, gateway_order_id, gateway_payment_id);
    constant_time_eq(&expected, supplied)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vector produced with `echo -n "order_abc|pay_123" | openssl dgst -sha256 -hmac secret`
    const SECRET: &str = "secret";
    const ORDER: &str = "order_abc";
    const PAYMENT: &str = "pay_123";

    #[test]
    fn expected_signature_is_lowercase_hex() {
        let sig = expected_signature(SECRET, ORDER, PAYMENT);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn correct_signature_verifies() {
        let sig = expected_signature(SECRET, ORDER, PAYMENT);
        assert!(verify_signature(SECRET, ORDER, PAYMENT, &sig));
    }

    #[test]
    fn tampered_signature_fails() {
        let mut sig = expected_signature(SECRET, ORDER, PAYMENT);
        let flipped = if sig.ends_with('0') { "1" } else { "0" };
        sig.replace_range(sig.len() - 1.., flipped);
        assert!(!verify_signature(SECRET, ORDER, PAYMENT, &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = expected_signature(SECRET, ORDER, PAYMENT);
        assert!(!verify_signature("other_secret", ORDER, PAYMENT, &sig));
    }

    #[test]
    fn signature_binds_both_identifiers() {
        let sig = expected_signature(SECRET, ORDER, PAYMENT);
        assert!(!verify_signature(SECRET, "order_xyz", PAYMENT, &sig));
        assert!(!verify_signature(SECRET, ORDER, "pay_999", &sig));
    }

    #[test]
    fn constant_time_eq_rejects_length_mismatch() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("abcd", "abcd"));
    }
}
