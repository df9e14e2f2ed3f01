use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};

use crate::{
    errors::ServiceError,
    services::payment_verification::{VerificationOutcome, VerifyPaymentRequest},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/verify", post(verify_payment))
}

/// Verify a gateway payment callback
///
/// A signature mismatch still returns 200 with `verified: false`; the client
/// reads the outcome and the order status from the body.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification outcome", body = VerificationOutcome),
        (status = 400, description = "Missing or malformed parameters", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.verification_service().verify_payment(request).await?;
    Ok(Json(outcome))
}
