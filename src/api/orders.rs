use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post}, Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::api::AppState;
use crate::domain::aggregates::{Order, Payment};
use crate::services::OrderDetails;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/payments", post(begin_payment))
        .route("/api/v1/orders/:id/cancel", post(cancel))
        .route("/api/v1/orders/:id/ship", post(ship))
        .route("/api/v1/orders/:id/deliver", post(deliver))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BeginPaymentRequest {
    #[validate(length(min = 1, max = 40))]
    pub method: String,
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetails>> {
    Ok(Json(s.engine.ledger.details(id).await?))
}

async fn begin_payment(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<BeginPaymentRequest>) -> Result<(StatusCode, Json<Payment>)> {
    r.validate()?;
    let payment = s.engine.ledger.begin_payment(id, &r.method).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn cancel(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.engine.ledger.cancel(id).await?))
}

async fn ship(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.engine.ledger.mark_shipped(id).await?))
}

async fn deliver(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.engine.ledger.mark_delivered(id).await?))
}
