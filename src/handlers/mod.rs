pub mod health;
pub mod orders;
pub mod payments;

use crate::services::{orders::OrderService, payment_verification::PaymentVerificationService};
use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Bundle of the application services the handlers dispatch to.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub verification: Arc<PaymentVerificationService>,
}

/// All versioned API routes, mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", orders::routes())
        .nest("/payments", payments::routes())
}
