use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;
use crate::api::{parse_owner, AddressBody, AppState};
use crate::domain::aggregates::ShippingMethod;
use crate::domain::value_objects::CouponCode;
use crate::services::{CheckoutRequest, Destination, OrderDetails, OrderDraft};
use crate::{EcommerceError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/checkout/validate", post(quote))
        .route("/api/v1/checkout", post(place_order))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DestinationBody {
    #[validate(length(min = 1, max = 120))]
    pub region: String,
    #[validate(length(min = 1, max = 120))]
    pub locality: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    #[validate(length(min = 1, max = 160))]
    pub owner: String,
    pub destination: DestinationBody,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[validate(length(min = 1, max = 32))]
    pub coupon_code: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub shipping_address: Option<AddressBody>,
    pub billing_address: Option<AddressBody>,
}

impl CheckoutBody {
    fn into_request(self) -> Result<CheckoutRequest> {
        self.validate()?;
        self.destination.validate()?;
        for address in [&self.shipping_address, &self.billing_address].into_iter().flatten() {
            address.validate()?;
        }
        let coupon_code = self.coupon_code
            .map(CouponCode::new)
            .transpose()
            .map_err(|e| EcommerceError::Validation(e.to_string()))?;
        Ok(CheckoutRequest {
            owner: parse_owner(&self.owner)?,
            destination: Destination { region: self.destination.region, locality: self.destination.locality },
            shipping_method: self.shipping_method,
            coupon_code,
            contact_email: self.contact_email,
            shipping_address: self.shipping_address.map(Into::into),
            billing_address: self.billing_address.map(Into::into),
        })
    }
}

async fn quote(State(s): State<AppState>, Json(body): Json<CheckoutBody>) -> Result<Json<OrderDraft>> {
    let request = body.into_request()?;
    Ok(Json(s.engine.checkout.quote(&request).await?))
}

async fn place_order(State(s): State<AppState>, Json(body): Json<CheckoutBody>) -> Result<(StatusCode, Json<OrderDetails>)> {
    let request = body.into_request()?;
    let placed = s.engine.checkout.place_order(&request).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}
