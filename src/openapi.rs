//! OpenAPI document and Swagger UI wiring.

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    entities::{order, order_item},
    errors::ErrorResponse,
    handlers,
    services::{orders as order_dto, payment_verification as verify_dto},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_cod_order,
        handlers::orders::create_prepaid_order,
        handlers::orders::get_order,
        handlers::payments::verify_payment,
        handlers::health::health_check,
    ),
    components(schemas(
        order::Model,
        order::OrderStatus,
        order::PaymentMethod,
        order_item::Model,
        order_dto::CreateOrderRequest,
        order_dto::OrderItemInput,
        order_dto::AddressInput,
        order_dto::CodOrderPlaced,
        order_dto::PrepaidCheckout,
        order_dto::OrderWithItems,
        verify_dto::VerifyPaymentRequest,
        verify_dto::VerificationOutcome,
        handlers::health::HealthStatus,
        ErrorResponse,
    )),
    tags(
        (name = "Orders", description = "Order placement and retrieval"),
        (name = "Payments", description = "Payment verification callbacks"),
        (name = "Health", description = "Service health")
    ),
    info(
        title = "Vedic Origins API",
        description = "Order lifecycle and payment verification backend",
        version = env!("CARGO_PKG_VERSION")
    )
)]
pub struct ApiDoc;

/// Swagger UI served at `/docs`, backed by the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
