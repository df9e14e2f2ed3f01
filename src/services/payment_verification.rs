use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::verify_signature,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Callback payload from the client after the gateway checkout completes.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub order_id: Option<String>,
}

/// Result of a verification attempt. A signature mismatch is a structured
/// outcome with `verified: false`, not an error.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationOutcome {
    pub verified: bool,
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,
}

/// Service that settles prepaid orders from gateway callbacks.
///
/// Both outcome paths are written as conditional updates filtered on the
/// current status, so a paid order can never be regressed by a stale or
/// forged callback.
#[derive(Clone)]
pub struct PaymentVerificationService {
    db: Arc<DatabaseConnection>,
    key_secret: String,
    event_sender: EventSender,
}

impl PaymentVerificationService {
    pub fn new(db: Arc<DatabaseConnection>, key_secret: String, event_sender: EventSender) -> Self {
        Self {
            db,
            key_secret,
            event_sender,
        }
    }

    /// Verifies a gateway callback and settles the order accordingly.
    ///
    /// Valid signature: the order moves to `paid` unless it already is, and
    /// the payment id and signature are recorded for audit. A valid callback
    /// may also promote a previously failed payment. Invalid signature: the
    /// order moves to `payment_failed` only from `pending_payment`.
    #[instrument(skip(self, request))]
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationOutcome, ServiceError> {
        let (gateway_order_id, payment_id, signature, order_id) = require_params(&request)?;

        let verified = verify_signature(&self.key_secret, &gateway_order_id, &payment_id, &signature);

        if verified {
            let affected = OrderEntity::update_many()
                .col_expr(order::Column::Status, OrderStatus::Paid.as_enum())
                .col_expr(
                    order::Column::RazorpayPaymentId,
                    Expr::value(Some(payment_id.clone())),
                )
                .col_expr(
                    order::Column::RazorpaySignature,
                    Expr::value(Some(signature.clone())),
                )
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                .filter(order::Column::Id.eq(order_id))
                .filter(
                    order::Column::Status
                        .is_in([OrderStatus::PendingPayment, OrderStatus::PaymentFailed]),
                )
                .exec(&*self.db)
                .await?;

            if affected.rows_affected == 0 {
                // Already paid or not settleable; the re-read below reports
                // the current state so retried callbacks stay idempotent.
                info!(%order_id, "verified callback matched no settleable order");
            } else {
                info!(%order_id, %payment_id, "payment verified, order marked paid");
                self.event_sender
                    .send_or_log(Event::PaymentVerified(order_id))
                    .await;
            }
        } else {
            let affected = OrderEntity::update_many()
                .col_expr(order::Column::Status, OrderStatus::PaymentFailed.as_enum())
                .col_expr(
                    order::Column::RazorpayPaymentId,
                    Expr::value(Some(payment_id.clone())),
                )
                .col_expr(
                    order::Column::RazorpaySignature,
                    Expr::value(Some(signature.clone())),
                )
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Status.eq(OrderStatus::PendingPayment))
                .exec(&*self.db)
                .await?;

            warn!(
                %order_id,
                rows_affected = affected.rows_affected,
                "signature mismatch on payment callback"
            );
            if affected.rows_affected > 0 {
                self.event_sender
                    .send_or_log(Event::PaymentFailed(order_id))
                    .await;
            }
        }

        let current = self.load_order(order_id).await?;
        Ok(VerificationOutcome {
            verified,
            order_id: current.id,
            status: current.status,
            total: current.total,
        })
    }

    async fn load_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}

fn require_params(
    request: &VerifyPaymentRequest,
) -> Result<(String, String, String, Uuid), ServiceError> {
    let missing = || ServiceError::ValidationError("Missing required parameters".into());

    let gateway_order_id = non_empty(&request.razorpay_order_id).ok_or_else(missing)?;
    let payment_id = non_empty(&request.razorpay_payment_id).ok_or_else(missing)?;
    let signature = non_empty(&request.razorpay_signature).ok_or_else(missing)?;
    let raw_order_id = non_empty(&request.order_id).ok_or_else(missing)?;

    let order_id = Uuid::parse_str(&raw_order_id)
        .map_err(|_| ServiceError::ValidationError("Invalid order id".into()))?;

    Ok((gateway_order_id, payment_id, signature, order_id))
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
