use axum::{extract::State, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::api::AppState;
use crate::domain::aggregates::GatewayStatus;
use crate::services::{ReconcileOutcome, VerificationEvent};
use crate::{EcommerceError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/payments/verify", post(verify))
        .route("/api/v1/payments/webhook", post(webhook))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub gateway_ref: String,
}

/// The fields we act on; the whole body is kept as the audit payload.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub gateway_ref: String,
    #[validate(length(min = 1, max = 40))]
    pub status: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

async fn verify(State(s): State<AppState>, Json(r): Json<VerifyRequest>) -> Result<Json<ReconcileOutcome>> {
    r.validate()?;
    Ok(Json(s.engine.reconciler.verify_now(r.order_id, &r.gateway_ref).await?))
}

async fn webhook(State(s): State<AppState>, Json(raw): Json<serde_json::Value>) -> Result<Json<ReconcileOutcome>> {
    let body: WebhookBody = serde_json::from_value(raw.clone()).map_err(|e| EcommerceError::Validation(e.to_string()))?;
    body.validate()?;
    let reported_status = GatewayStatus::parse_loose(&body.status)
        .ok_or_else(|| EcommerceError::Validation(format!("unknown payment status {}", body.status)))?;
    let outcome = s.engine.reconciler.reconcile(VerificationEvent {
        gateway_ref: body.gateway_ref,
        order_id: body.order_id,
        reported_status,
        reported_amount: body.amount,
        transaction_id: body.transaction_id,
        raw_payload: raw,
    }).await?;
    Ok(Json(outcome))
}
