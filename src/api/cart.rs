use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::api::{parse_owner, AppState};
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::{CartOwner, Quantity};
use crate::{EcommerceError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/cart/:owner", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:owner/lines", post(add_line))
        .route("/api/v1/cart/:owner/lines/:line_id", put(set_quantity).delete(remove_line))
        .route("/api/v1/cart/:owner/merge", post(merge))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    #[validate(length(min = 1, max = 64))]
    pub product_id: String,
    #[validate(length(min = 1, max = 64))]
    pub variant_id: Option<String>,
    #[validate(range(min = 1, max = 9999))]
    pub quantity: Option<u32>,
}

/// Zero removes the line.
#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    #[validate(range(max = 9999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub account_id: Uuid,
}

async fn get_cart(State(s): State<AppState>, Path(owner): Path<String>) -> Result<Json<Cart>> {
    Ok(Json(s.engine.carts.read(&parse_owner(&owner)?).await?))
}

async fn clear_cart(State(s): State<AppState>, Path(owner): Path<String>) -> Result<StatusCode> {
    s.engine.carts.clear(&parse_owner(&owner)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_line(State(s): State<AppState>, Path(owner): Path<String>, Json(r): Json<AddLineRequest>) -> Result<(StatusCode, Json<Cart>)> {
    r.validate()?;
    let owner = parse_owner(&owner)?;
    let quantity = r.quantity.and_then(Quantity::new).unwrap_or(Quantity::ONE);
    let cart = s.engine.carts.add_line(&owner, &r.product_id, r.variant_id.as_deref(), quantity).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

async fn set_quantity(State(s): State<AppState>, Path((owner, line_id)): Path<(String, Uuid)>, Json(r): Json<SetQuantityRequest>) -> Result<Json<Cart>> {
    r.validate()?;
    Ok(Json(s.engine.carts.set_line_quantity(&parse_owner(&owner)?, line_id, r.quantity).await?))
}

async fn remove_line(State(s): State<AppState>, Path((owner, line_id)): Path<(String, Uuid)>) -> Result<Json<Cart>> {
    Ok(Json(s.engine.carts.remove_line(&parse_owner(&owner)?, line_id).await?))
}

async fn merge(State(s): State<AppState>, Path(owner): Path<String>, Json(r): Json<MergeRequest>) -> Result<Json<Cart>> {
    let guest = parse_owner(&owner)?;
    if !guest.is_guest() {
        return Err(EcommerceError::Validation("only guest carts can be merged".into()));
    }
    Ok(Json(s.engine.carts.merge_guest(&guest, &CartOwner::account(r.account_id)).await?))
}
