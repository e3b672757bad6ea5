//! HTTP surface (axum).

mod cart;
mod checkout;
mod error;
mod orders;
mod payments;

use axum::{routing::get, Json, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use validator::Validate;
use crate::domain::aggregates::Address;
use crate::domain::value_objects::CartOwner;
use crate::services::Engine;
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self { Self { engine } }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-checkout"})) }))
        .merge(cart::routes())
        .merge(checkout::routes())
        .merge(orders::routes())
        .merge(payments::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

fn parse_owner(raw: &str) -> Result<CartOwner> {
    raw.parse::<CartOwner>().map_err(|e| EcommerceError::Validation(e.to_string()))
}

#[derive(Debug, serde::Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressBody {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub street1: String,
    #[validate(length(max = 200))]
    pub street2: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[validate(length(min = 1, max = 120))]
    pub region: String,
    #[validate(length(max = 20))]
    pub zip: Option<String>,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

impl From<AddressBody> for Address {
    fn from(b: AddressBody) -> Self {
        Address { name: b.name, street1: b.street1, street2: b.street2, city: b.city, region: b.region, zip: b.zip, country: b.country, phone: b.phone }
    }
}
