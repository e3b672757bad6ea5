//! OpenSASE Checkout
//!
//! Turns mutable, possibly-guest shopping carts into immutable, priced orders.
//!
//! ## Features
//! - Per-owner cart store with dedup-by-product and guest-to-account merge
//! - Checkout re-validation against the live catalog, shipping table and coupons
//! - Order ledger with a centrally enforced state machine
//! - Idempotent payment reconciliation for gateway callbacks

use serde::Serialize;
use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::aggregates::{
    Address, Cart, CartLine, CatalogEntry, Coupon, CouponKind, CouponRejection, Order, OrderLine,
    OrderState, Payment, PaymentAudit, PaymentState, ShippingMethod, ShippingRate, ShippingZone,
};
pub use domain::value_objects::{CartOwner, CouponCode, Quantity};
pub use services::Engine;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: String, requested: u32, available: u32 },

    #[error("Coupon rejected: {0}")]
    CouponRejected(CouponRejection),

    #[error("Checkout rejected")]
    CheckoutRejected(CheckoutRejection),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Illegal order transition {from} -> {to}")]
    IllegalStateTransition { from: OrderState, to: OrderState },

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl EcommerceError {
    /// Retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_))
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound("Row".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
            _ => Self::StorageError(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

// =============================================================================
// Checkout rejection report
// =============================================================================

/// Everything wrong with a checkout attempt, collected in one pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckoutRejection {
    pub invalid_lines: Vec<InvalidLine>,
    pub order_level_errors: Vec<OrderLevelError>,
}

impl CheckoutRejection {
    pub fn is_empty(&self) -> bool { self.invalid_lines.is_empty() && self.order_level_errors.is_empty() }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvalidLine {
    pub line_id: uuid::Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub reason: LineRejection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum LineRejection {
    NoLongerAvailable,
    Disabled,
    InsufficientStock { requested: u32, available: u32 },
}

impl InvalidLine {
    /// The taxonomy error this rejection stands for, used for the customer-facing message.
    pub fn to_error(&self) -> EcommerceError {
        match self.reason {
            LineRejection::NoLongerAvailable => EcommerceError::NotFound(format!("Product {} (no longer available)", self.product_id)),
            LineRejection::Disabled => EcommerceError::Validation(format!("product {} is disabled", self.product_id)),
            LineRejection::InsufficientStock { requested, available } => EcommerceError::InsufficientStock { product_id: self.product_id.clone(), requested, available },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum OrderLevelError {
    EmptyCart,
}
