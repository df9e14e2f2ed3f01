use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Durable order record.
///
/// Created atomically with its line items or not at all; a failed line-item
/// insert triggers a compensating delete of the header.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owner reference; `None` for guest orders.
    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    /// Invariant: `total = sum(item.price * item.qty) + cod_fee`.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    /// Flat COD handling fee; zero for prepaid orders.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cod_fee: Decimal,
    pub currency: String,
    pub phone: String,
    #[sea_orm(nullable)]
    pub email: Option<String>,
    /// Shipping address, stored as a JSON blob.
    #[sea_orm(column_type = "Json")]
    pub address: Json,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    /// Gateway order id, set once the payment intent is created.
    #[sea_orm(nullable)]
    pub razorpay_order_id: Option<String>,
    /// Gateway payment id, recorded on verification for audit.
    #[sea_orm(nullable)]
    pub razorpay_payment_id: Option<String>,
    /// Supplied signature, recorded on verification for audit.
    #[sea_orm(nullable)]
    pub razorpay_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment method enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cod")]
    Cod,
    #[sea_orm(string_value = "prepaid")]
    Prepaid,
}

impl PaymentMethod {
    /// Initial order status for this payment method.
    pub fn initial_status(self) -> OrderStatus {
        match self {
            Self::Cod => OrderStatus::CodPending,
            Self::Prepaid => OrderStatus::PendingPayment,
        }
    }
}

/// Order status enumeration.
///
/// The payment edges (`pending_payment` to `paid`/`payment_failed`) are
/// enforced by the verification service; the fulfillment edges are accepted
/// as valid successors for externally driven updates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "cod_pending")]
    CodPending,
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "payment_failed")]
    PaymentFailed,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Validates whether a status transition is allowed.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, to) {
            // Payment verification outcomes
            (PendingPayment, Paid) | (PendingPayment, PaymentFailed) => true,

            // Externally driven fulfillment
            (CodPending, Shipped) | (CodPending, Delivered) | (CodPending, Cancelled) => true,
            (Paid, Shipped) | (Paid, Delivered) | (Paid, Cancelled) => true,
            (Shipped, Delivered) | (Shipped, Cancelled) => true,

            // Same-status transitions are no-ops
            _ if self == to => true,

            _ => false,
        }
    }

    /// Whether no further fulfillment transitions are expected from this
    /// status. The verification service may still settle a failed payment
    /// through its own conditional update.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PaymentFailed | Self::Delivered | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodPending => "cod_pending",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
