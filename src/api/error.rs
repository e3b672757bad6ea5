//! HTTP rendering of [`EcommerceError`].

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::{json, Value};
use tracing::{error, warn};
use crate::domain::aggregates::PAYMENT_NOT_VERIFIED;
use crate::{CheckoutRejection, EcommerceError};

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, json!({ "error": "validation", "message": message })),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": "not_found", "message": self.to_string() })),
            Self::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": "conflict", "message": message })),
            Self::InsufficientStock { product_id, requested, available } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": "insufficient_stock", "message": self.to_string(),
                    "product_id": product_id, "requested": requested, "available": available,
                }),
            ),
            Self::CouponRejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "coupon_rejected", "message": reason.to_string(), "coupon": reason }),
            ),
            Self::CheckoutRejected(rejection) => (StatusCode::UNPROCESSABLE_ENTITY, rejection_body(rejection)),
            Self::GatewayUnavailable(detail) => {
                warn!(%detail, "payment verification unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "gateway_unavailable", "message": PAYMENT_NOT_VERIFIED, "retryable": true }),
                )
            }
            Self::IllegalStateTransition { from, to } => {
                error!(%from, %to, "illegal order transition reached the API");
                (
                    StatusCode::CONFLICT,
                    json!({ "error": "illegal_state_transition", "message": format!("order cannot move from {from} to {to}") }),
                )
            }
            Self::StorageError(detail) => {
                error!(%detail, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal", "message": "internal error" }))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Itemised body the storefront renders next to each offending line.
fn rejection_body(rejection: &CheckoutRejection) -> Value {
    let lines: Vec<Value> = rejection.invalid_lines.iter().map(|line| {
        json!({
            "line_id": line.line_id,
            "product_id": line.product_id,
            "variant_id": line.variant_id,
            "reason": line.reason,
            "message": line.to_error().to_string(),
        })
    }).collect();
    json!({
        "error": "checkout_rejected",
        "message": "some items in your cart need attention",
        "invalid_lines": lines,
        "order_level_errors": rejection.order_level_errors,
    })
}
