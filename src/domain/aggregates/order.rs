//! Order Aggregate
//!
//! Contents (lines, totals, addresses) are frozen when the order is placed.
//! The only mutation afterwards is a state transition along the graph below:
//!
//! ```text
//! CREATED -> PAYMENT_PENDING -> PAYMENT_AUTHORIZED -> PAYMENT_SETTLED -> SHIPPED -> DELIVERED
//!                 |  ^                 |                  (direct PENDING -> SETTLED allowed)
//!                 v  |                 v
//!            PAYMENT_FAILED <----------+
//! CANCELLED from any state before SHIPPED.
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;
use crate::domain::aggregates::shipping::ShippingMethod;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{CartOwner, CouponCode};
use crate::{EcommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Created,
    PaymentPending,
    PaymentAuthorized,
    PaymentSettled,
    PaymentFailed,
    Shipped,
    Delivered,
    Cancelled,
}

/// What the payment side reports to the order state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentSignal { Initiated, Authorized, Settled, Failed }

impl OrderState {
    pub const ALL: [OrderState; 8] = [
        Self::Created, Self::PaymentPending, Self::PaymentAuthorized, Self::PaymentSettled,
        Self::PaymentFailed, Self::Shipped, Self::Delivered, Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::PaymentAuthorized => "PAYMENT_AUTHORIZED",
            Self::PaymentSettled => "PAYMENT_SETTLED",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The single source of truth for legal edges.
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Created, PaymentPending)
                | (PaymentPending, PaymentAuthorized)
                | (PaymentPending, PaymentSettled)
                | (PaymentAuthorized, PaymentSettled)
                | (PaymentPending | PaymentAuthorized, PaymentFailed)
                | (PaymentFailed, PaymentPending)
                | (PaymentSettled, Shipped)
                | (Shipped, Delivered)
                | (Created | PaymentPending | PaymentAuthorized | PaymentSettled | PaymentFailed, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Only settled-or-later orders are revenue; everything before is pipeline.
    pub fn counts_as_revenue(&self) -> bool { matches!(self, Self::PaymentSettled | Self::Shipped | Self::Delivered) }

    /// Combined order/payment transition: the order state a payment signal leads to.
    pub fn on_payment(self, signal: PaymentSignal) -> Result<OrderState> {
        let next = match signal {
            PaymentSignal::Initiated => Self::PaymentPending,
            PaymentSignal::Authorized => Self::PaymentAuthorized,
            PaymentSignal::Settled => Self::PaymentSettled,
            PaymentSignal::Failed => Self::PaymentFailed,
        };
        self.checked(next)
    }

    pub fn checked(self, next: OrderState) -> Result<OrderState> {
        if self.can_transition_to(next) { Ok(next) } else { Err(EcommerceError::IllegalStateTransition { from: self, to: next }) }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderState {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| EcommerceError::StorageError(format!("unknown order state {s}")))
    }
}

/// A price-frozen line. `line_price_at_purchase` is the unit price captured at placement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub line_price_at_purchase: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub street1: String,
    pub street2: Option<String>,
    pub city: String,
    pub region: String,
    pub zip: Option<String>,
    pub country: String,
    pub phone: Option<String>,
}

/// Priced content an order is created from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderTotals {
    pub sub_total: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) code: String,
    pub(crate) customer_id: String,
    pub(crate) contact_email: Option<String>,
    pub(crate) state: OrderState,
    pub(crate) totals: OrderTotals,
    pub(crate) coupon_code: Option<CouponCode>,
    pub(crate) shipping_address_id: Uuid,
    pub(crate) billing_address_id: Uuid,
    pub(crate) shipping_method: ShippingMethod,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

pub struct NewOrder {
    pub code: String,
    pub customer: CartOwner,
    pub contact_email: Option<String>,
    pub totals: OrderTotals,
    pub coupon_code: Option<CouponCode>,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub shipping_method: ShippingMethod,
}

impl Order {
    /// New order in `CREATED`.
    pub fn place(new: NewOrder) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), code: new.code, customer_id: new.customer.key(), contact_email: new.contact_email,
            state: OrderState::Created, totals: new.totals, coupon_code: new.coupon_code,
            shipping_address_id: new.shipping_address_id, billing_address_id: new.billing_address_id,
            shipping_method: new.shipping_method, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: order.id, code: order.code.clone(), total: order.totals.total }));
        order
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn code(&self) -> &str { &self.code }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn contact_email(&self) -> Option<&str> { self.contact_email.as_deref() }
    pub fn state(&self) -> OrderState { self.state }
    pub fn totals(&self) -> &OrderTotals { &self.totals }
    pub fn total(&self) -> Decimal { self.totals.total }
    pub fn coupon_code(&self) -> Option<&CouponCode> { self.coupon_code.as_ref() }
    pub fn shipping_address_id(&self) -> Uuid { self.shipping_address_id }
    pub fn billing_address_id(&self) -> Uuid { self.billing_address_id }
    pub fn shipping_method(&self) -> ShippingMethod { self.shipping_method }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn transition_to(&mut self, next: OrderState) -> Result<()> {
        let from = self.state;
        self.state = from.checked(next)?;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StateChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn apply_payment(&mut self, signal: PaymentSignal) -> Result<OrderState> {
        let next = self.state.on_payment(signal)?;
        self.transition_to(next)?;
        Ok(next)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}
