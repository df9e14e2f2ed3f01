use crate::{
    config::CURRENCY,
    entities::order::{
        ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
        PaymentMethod,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::PaymentGateway,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// One cart line in an order request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default = "default_qty")]
    pub qty: i32,
}

fn default_qty() -> i32 {
    1
}

/// Shipping address as submitted by the client. All fields are required;
/// presence is checked by validation rather than deserialization so the
/// caller gets a 400 instead of a deserialize rejection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressInput {
    pub name: Option<String>,
    pub line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

/// Validated shipping address, stored on the order as a JSON blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

/// Request body shared by the COD and prepaid order-creation endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    pub address: Option<AddressInput>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Outcome of a COD order placement.
#[derive(Debug, Serialize, ToSchema)]
pub struct CodOrderPlaced {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,
}

/// Outcome of a prepaid order placement: everything the client checkout
/// widget needs to collect the payment.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrepaidCheckout {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    #[serde(rename = "rzpOrderId")]
    pub razorpay_order_id: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// Amount in minor currency units (paise).
    pub amount: i64,
    pub currency: String,
    pub total: Decimal,
}

/// Order with its line items, for the confirmation page.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Service for creating and fulfilling orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    cod_fee: Decimal,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        cod_fee: Decimal,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            cod_fee,
        }
    }

    /// Creates a Cash-on-Delivery order: header plus line items, priced with
    /// the flat COD fee. No gateway interaction.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_cod_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CodOrderPlaced, ServiceError> {
        let (address, phone) = validate_order_input(&request)?;

        let subtotal = order_subtotal(&request.items);
        let fee = self.cod_fee;
        let total = subtotal + fee;

        let header = self
            .insert_header(&request, &address, &phone, PaymentMethod::Cod, total, fee)
            .await?;
        let undo = CompensatingDelete::for_order(header.id);

        if let Err(cause) = self.insert_line_items(header.id, &request.items).await {
            undo.run(&self.db).await;
            return Err(ServiceError::Fulfillment(cause));
        }

        info!(order_id = %header.id, %total, "COD order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(header.id))
            .await;

        Ok(CodOrderPlaced {
            order_id: header.id,
            status: header.status,
            total,
        })
    }

    /// Creates a prepaid order: header, gateway payment intent, line items.
    /// The returned checkout bundle carries the gateway order id and key the
    /// client widget needs.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_prepaid_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<PrepaidCheckout, ServiceError> {
        let (address, phone) = validate_order_input(&request)?;

        let subtotal = order_subtotal(&request.items);
        let total = subtotal; // no COD fee for prepaid

        let header = self
            .insert_header(
                &request,
                &address,
                &phone,
                PaymentMethod::Prepaid,
                total,
                Decimal::ZERO,
            )
            .await?;
        let undo = CompensatingDelete::for_order(header.id);

        match self.attach_intent_and_items(&header, &request, total).await {
            Ok(checkout) => {
                info!(
                    order_id = %header.id,
                    gateway_order_id = %checkout.razorpay_order_id,
                    %total,
                    "prepaid order created"
                );
                self.event_sender
                    .send_or_log(Event::OrderCreated(header.id))
                    .await;
                Ok(checkout)
            }
            Err(cause) => {
                undo.run(&self.db).await;
                Err(ServiceError::Fulfillment(cause))
            }
        }
    }

    /// Retrieves an order with its line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// Applies an externally driven fulfillment transition
    /// (shipped/delivered/cancelled), validated by the state machine.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_fulfillment_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, new_status
            )));
        }

        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(%order_id, %old_status, %new_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }

    async fn insert_header(
        &self,
        request: &CreateOrderRequest,
        address: &Address,
        phone: &str,
        payment_method: PaymentMethod,
        total: Decimal,
        cod_fee: Decimal,
    ) -> Result<OrderModel, ServiceError> {
        let address_json = serde_json::to_value(address)
            .map_err(|e| ServiceError::InternalError(format!("address encoding: {}", e)))?;

        let header = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(request.user_id),
            payment_method: Set(payment_method),
            status: Set(payment_method.initial_status()),
            total: Set(total),
            cod_fee: Set(cod_fee),
            currency: Set(CURRENCY.to_string()),
            phone: Set(phone.to_string()),
            email: Set(request.email.clone()),
            address: Set(address_json),
            notes: Set(request.notes.clone()),
            razorpay_order_id: Set(None),
            razorpay_payment_id: Set(None),
            razorpay_signature: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        header.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, "failed to create order header");
            ServiceError::Fulfillment(e.into())
        })
    }

    /// Creates the gateway intent, records its id on the header, and inserts
    /// the line items. Any error here triggers the caller's compensation.
    async fn attach_intent_and_items(
        &self,
        header: &OrderModel,
        request: &CreateOrderRequest,
        total: Decimal,
    ) -> Result<PrepaidCheckout, anyhow::Error> {
        let amount_minor = to_minor_units(total)?;
        let notes = serde_json::json!({
            "order_id": header.id,
            "customer_phone": header.phone,
            "customer_email": request.email.clone().unwrap_or_default(),
        });

        let gateway_order = self
            .gateway
            .create_intent(&header.id.to_string(), amount_minor, CURRENCY, notes)
            .await?;

        let mut active: OrderActiveModel = header.clone().into();
        active.razorpay_order_id = Set(Some(gateway_order.id.clone()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        self.insert_line_items(header.id, &request.items).await?;

        Ok(PrepaidCheckout {
            order_id: header.id,
            razorpay_order_id: gateway_order.id,
            key_id: self.gateway.key_id().to_string(),
            amount: amount_minor,
            currency: CURRENCY.to_string(),
            total,
        })
    }

    async fn insert_line_items(
        &self,
        order_id: Uuid,
        items: &[OrderItemInput],
    ) -> Result<(), anyhow::Error> {
        let models: Vec<OrderItemActiveModel> = items
            .iter()
            .map(|item| OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id.clone()),
                name: Set(item.name.clone()),
                price: Set(item.price),
                qty: Set(item.qty),
                currency: Set(CURRENCY.to_string()),
            })
            .collect();

        OrderItemEntity::insert_many(models).exec(&*self.db).await?;
        Ok(())
    }
}

/// Inverse of a header insert, recorded before the dependent writes so a
/// partial order can be rolled back without relying on incidental ordering.
struct CompensatingDelete {
    order_id: Uuid,
}

impl CompensatingDelete {
    fn for_order(order_id: Uuid) -> Self {
        Self { order_id }
    }

    /// Best-effort: a failed rollback leaves an orphaned header behind and is
    /// logged for manual cleanup.
    async fn run(self, db: &DatabaseConnection) {
        match OrderEntity::delete_by_id(self.order_id).exec(db).await {
            Ok(_) => warn!(order_id = %self.order_id, "rolled back order header after partial failure"),
            Err(e) => error!(
                order_id = %self.order_id,
                error = %e,
                "compensating delete failed; orphaned order header left behind"
            ),
        }
    }
}

/// Validates an order request before any persistence is attempted.
fn validate_order_input(request: &CreateOrderRequest) -> Result<(Address, String), ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError("No items provided".into()));
    }
    for item in &request.items {
        if item.qty < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Invalid quantity for item {}",
                item.product_id
            )));
        }
        if item.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Invalid price for item {}",
                item.product_id
            )));
        }
    }

    let address = request
        .address
        .as_ref()
        .and_then(|a| {
            Some(Address {
                name: required(&a.name)?,
                line1: required(&a.line1)?,
                city: required(&a.city)?,
                state: required(&a.state)?,
                pincode: required(&a.pincode)?,
            })
        })
        .ok_or_else(|| ServiceError::ValidationError("Incomplete address".into()))?;

    if !is_digits(&address.pincode, 6) {
        return Err(ServiceError::ValidationError(
            "Pincode must be 6 digits".into(),
        ));
    }

    let phone = request
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("Phone required".into()))?
        .to_string();
    if !is_digits(&phone, 10) {
        return Err(ServiceError::ValidationError(
            "Phone must be 10 digits".into(),
        ));
    }

    Ok((address, phone))
}

fn required(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

fn order_subtotal(items: &[OrderItemInput]) -> Decimal {
    items
        .iter()
        .map(|item| item.price * Decimal::from(item.qty))
        .sum()
}

/// Converts a currency amount to the gateway's minor units (paise).
/// Half a paise rounds away from zero.
fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::InternalError(format!("amount out of range: {}", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn item(product_id: &str, price: Decimal, qty: i32) -> OrderItemInput {
        OrderItemInput {
            product_id: product_id.to_string(),
            name: format!("Product {}", product_id),
            price,
            qty,
        }
    }

    fn full_address() -> AddressInput {
        AddressInput {
            name: Some("Asha Rao".into()),
            line1: Some("12 Temple Street".into()),
            city: Some("Mysuru".into()),
            state: Some("Karnataka".into()),
            pincode: Some("570001".into()),
        }
    }

    fn valid_request() -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![item("p1", dec!(450), 2)],
            address: Some(full_address()),
            phone: Some("9876543210".into()),
            email: None,
            notes: None,
            user_id: None,
        }
    }

    #[test]
    fn empty_items_are_rejected() {
        let mut req = valid_request();
        req.items.clear();
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "No items provided"
        );
    }

    #[test]
    fn missing_address_field_is_rejected() {
        let mut req = valid_request();
        req.address.as_mut().unwrap().city = None;
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Incomplete address"
        );

        let mut req = valid_request();
        req.address = None;
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Incomplete address"
        );
    }

    #[test]
    fn blank_address_field_counts_as_missing() {
        let mut req = valid_request();
        req.address.as_mut().unwrap().line1 = Some("   ".into());
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Incomplete address"
        );
    }

    #[test]
    fn missing_phone_is_rejected() {
        let mut req = valid_request();
        req.phone = None;
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Phone required"
        );
    }

    #[test]
    fn malformed_phone_and_pincode_are_rejected() {
        let mut req = valid_request();
        req.phone = Some("12345".into());
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Phone must be 10 digits"
        );

        let mut req = valid_request();
        req.address.as_mut().unwrap().pincode = Some("57000a".into());
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(msg)) if msg == "Pincode must be 6 digits"
        );
    }

    #[test]
    fn nonpositive_quantity_is_rejected() {
        let mut req = valid_request();
        req.items[0].qty = 0;
        assert_matches!(
            validate_order_input(&req),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn valid_request_passes_validation() {
        let (address, phone) = validate_order_input(&valid_request()).unwrap();
        assert_eq!(address.pincode, "570001");
        assert_eq!(phone, "9876543210");
    }

    #[test]
    fn subtotal_sums_price_times_qty() {
        let items = vec![item("p1", dec!(450), 2), item("p2", dec!(100), 1)];
        assert_eq!(order_subtotal(&items), dec!(1000));
    }

    #[test]
    fn minor_units_multiply_by_hundred() {
        assert_eq!(to_minor_units(dec!(1000)).unwrap(), 100_000);
        assert_eq!(to_minor_units(dec!(199.99)).unwrap(), 19_999);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn half_a_paise_rounds_away_from_zero() {
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1_001);
        assert_eq!(to_minor_units(dec!(10.015)).unwrap(), 1_002);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1_000);
    }

    #[test]
    fn qty_defaults_to_one_when_absent() {
        let parsed: OrderItemInput =
            serde_json::from_str(r#"{"product_id":"p1","name":"Ghee","price":"450"}"#).unwrap();
        assert_eq!(parsed.qty, 1);
    }
}
