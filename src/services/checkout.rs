//! Checkout: re-validates a cart against authoritative data and prices it.
//!
//! The validator never trusts anything the cart remembers except identifiers
//! and quantities. Prices, stock and enabled flags are re-read from the
//! catalog, shipping comes from the zone table (with a flat fallback for
//! unknown destinations), and the coupon is evaluated against the fresh
//! subtotal. Per-line problems are collected so the customer sees all of them
//! at once; structural and coupon problems reject the whole checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Address, CartLine, OrderTotals, ShippingMethod};
use crate::domain::value_objects::{CartOwner, CouponCode};
use crate::services::cart_store::{check_line_ids, CartStore};
use crate::services::ledger::{OrderDetails, OrderLedger};
use crate::services::ports::{CatalogLookup, ShippingRateTable};
use crate::services::reference::CouponEvaluator;
use crate::services::tax::TaxPolicy;
use crate::{CheckoutRejection, EcommerceError, InvalidLine, LineRejection, OrderLevelError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub region: String,
    pub locality: String,
}

#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub owner: CartOwner,
    pub destination: Destination,
    pub shipping_method: ShippingMethod,
    pub coupon_code: Option<CouponCode>,
    pub contact_email: Option<String>,
    pub shipping_address: Option<Address>,
    /// Defaults to the shipping address.
    pub billing_address: Option<Address>,
}

/// One cart line priced from the catalog at validation time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedLine {
    pub cart_line_id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// A fully priced, not yet persisted order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderDraft {
    pub customer: CartOwner,
    pub contact_email: Option<String>,
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
    pub shipping_method: ShippingMethod,
    pub fallback_shipping: bool,
    pub coupon_code: Option<CouponCode>,
    pub shipping_address: Address,
    pub billing_address: Address,
}

pub struct CheckoutValidator {
    catalog: Arc<dyn CatalogLookup>,
    shipping: Arc<dyn ShippingRateTable>,
    coupons: Arc<CouponEvaluator>,
    tax: Arc<dyn TaxPolicy>,
    fallback_shipping: Decimal,
    currency: String,
}

impl CheckoutValidator {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        shipping: Arc<dyn ShippingRateTable>,
        coupons: Arc<CouponEvaluator>,
        tax: Arc<dyn TaxPolicy>,
        fallback_shipping: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self { catalog, shipping, coupons, tax, fallback_shipping, currency: currency.into() }
    }

    /// Prices `lines` for `request`, or explains every reason it cannot.
    #[instrument(skip_all, fields(owner = %request.owner, lines = lines.len()))]
    pub async fn validate(&self, request: &CheckoutRequest, lines: &[CartLine], now: DateTime<Utc>) -> Result<OrderDraft> {
        let (shipping_address, billing_address) = check_request(request)?;
        for line in lines {
            check_line_ids(&line.product_id, line.variant_id.as_deref())?;
        }

        if lines.is_empty() {
            return Err(EcommerceError::CheckoutRejected(CheckoutRejection {
                invalid_lines: vec![],
                order_level_errors: vec![OrderLevelError::EmptyCart],
            }));
        }

        let mut rejection = CheckoutRejection::default();
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            match self.price_line(line).await? {
                Ok(p) => priced.push(p),
                Err(reason) => rejection.invalid_lines.push(InvalidLine {
                    line_id: line.id,
                    product_id: line.product_id.clone(),
                    variant_id: line.variant_id.clone(),
                    reason,
                }),
            }
        }
        if !rejection.is_empty() {
            debug!(invalid = rejection.invalid_lines.len(), "checkout rejected");
            return Err(EcommerceError::CheckoutRejected(rejection));
        }

        let sub_total: Decimal = priced.iter().map(|p| p.line_total).sum();
        let (shipping, fallback_shipping) = self.shipping_cost(&request.destination, request.shipping_method).await?;
        let discount = match &request.coupon_code {
            Some(code) => self.coupons.evaluate(code, sub_total, now).await?,
            None => Decimal::ZERO,
        };
        let tax = self.tax.tax(sub_total - discount);
        let total = sub_total + shipping + tax - discount;

        Ok(OrderDraft {
            customer: request.owner.clone(),
            contact_email: request.contact_email.clone(),
            lines: priced,
            totals: OrderTotals { sub_total, shipping, tax, discount, total, currency: self.currency.clone() },
            shipping_method: request.shipping_method,
            fallback_shipping,
            coupon_code: request.coupon_code.clone(),
            shipping_address,
            billing_address,
        })
    }

    /// Outer `Err` is a lookup failure; inner `Err` is a rejection of this line.
    async fn price_line(&self, line: &CartLine) -> Result<std::result::Result<PricedLine, LineRejection>> {
        let Some(entry) = self.catalog.resolve(&line.product_id, line.variant_id.as_deref()).await? else {
            return Ok(Err(LineRejection::NoLongerAvailable));
        };
        if !entry.is_sellable() {
            return Ok(Err(LineRejection::Disabled));
        }
        let requested = line.quantity.value();
        if entry.stock_on_hand < requested {
            return Ok(Err(LineRejection::InsufficientStock { requested, available: entry.stock_on_hand }));
        }
        Ok(Ok(PricedLine {
            cart_line_id: line.id,
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            quantity: requested,
            unit_price: entry.price,
            line_total: entry.price * Decimal::from(requested),
        }))
    }

    async fn shipping_cost(&self, destination: &Destination, method: ShippingMethod) -> Result<(Decimal, bool)> {
        match self.shipping.rate(&destination.region, &destination.locality).await? {
            Some(rate) => Ok((rate.price_for(method), false)),
            None => {
                info!(region = %destination.region, locality = %destination.locality, "no shipping zone match, using fallback");
                Ok((self.fallback_shipping, true))
            }
        }
    }
}

fn check_request(request: &CheckoutRequest) -> Result<(Address, Address)> {
    if request.destination.region.trim().is_empty() || request.destination.locality.trim().is_empty() {
        return Err(EcommerceError::Validation("destination region and locality are required".into()));
    }
    if request.owner.is_guest() && request.contact_email.as_deref().map_or(true, |e| e.trim().is_empty()) {
        return Err(EcommerceError::Validation("guest checkout requires a contact e-mail".into()));
    }
    let shipping = request.shipping_address.clone()
        .ok_or_else(|| EcommerceError::Validation("shipping address is required".into()))?;
    let billing = request.billing_address.clone().unwrap_or_else(|| shipping.clone());
    Ok((shipping, billing))
}

pub struct CheckoutService {
    carts: Arc<CartStore>,
    validator: CheckoutValidator,
    coupons: Arc<CouponEvaluator>,
    ledger: Arc<OrderLedger>,
}

impl CheckoutService {
    pub fn new(carts: Arc<CartStore>, validator: CheckoutValidator, coupons: Arc<CouponEvaluator>, ledger: Arc<OrderLedger>) -> Self {
        Self { carts, validator, coupons, ledger }
    }

    /// Prices the current cart without writing anything.
    pub async fn quote(&self, request: &CheckoutRequest) -> Result<OrderDraft> {
        let cart = self.carts.read(&request.owner).await?;
        self.validator.validate(request, cart.lines(), Utc::now()).await
    }

    /// Validates, persists the order, then empties the cart.
    #[instrument(skip_all, fields(owner = %request.owner))]
    pub async fn place_order(&self, request: &CheckoutRequest) -> Result<OrderDetails> {
        let _guard = self.carts.lock(&request.owner).await;
        let cart = self.carts.read(&request.owner).await?;
        let draft = self.validator.validate(request, cart.lines(), Utc::now()).await?;
        let placed = self.ledger.create_order(draft).await?;

        if let Some(code) = placed.order.coupon_code() {
            self.coupons.invalidate(code);
        }
        if let Err(e) = self.carts.clear_held(&request.owner).await {
            error!(error = %e, order = %placed.order.code(), "order placed but cart could not be cleared");
        }
        Ok(placed)
    }
}
