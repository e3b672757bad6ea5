//! Storage and collaborator boundaries the services are written against.
//!
//! Every implementation must make each method atomic on its own: a method
//! either commits all of its writes or none of them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, CartLine, CatalogEntry, Coupon, GatewayStatus, Order, OrderLine, OrderState, Payment, PaymentAudit,
    PaymentState, ShippingRate, ShippingZone,
};
use crate::domain::value_objects::{CartOwner, CouponCode, Quantity};
use crate::Result;

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// `None` when the product, or the requested variant of it, does not exist.
    async fn resolve(&self, product_id: &str, variant_id: Option<&str>) -> Result<Option<CatalogEntry>>;
}

#[async_trait]
pub trait ShippingRateTable: Send + Sync {
    async fn rate(&self, region: &str, locality: &str) -> Result<Option<ShippingRate>>;
}

/// Raw loader behind the cached shipping table.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    async fn load_zones(&self) -> Result<Vec<ShippingZone>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>>;
    /// Inserts the line or adds `quantity` to the existing one for (owner, product, variant).
    async fn upsert_line(&self, owner: &CartOwner, product_id: &str, variant_id: Option<&str>, quantity: Quantity) -> Result<CartLine>;
    /// `false` when no line with this id belongs to `owner`.
    async fn set_quantity(&self, owner: &CartOwner, line_id: Uuid, quantity: Quantity) -> Result<bool>;
    async fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<bool>;
    async fn clear(&self, owner: &CartOwner) -> Result<u64>;
    async fn is_tombstoned(&self, owner: &CartOwner) -> Result<bool>;
    /// Tombstones `guest` and moves its lines into `account`, summing per
    /// product/variant, as one write. `Conflict` if the guest is already
    /// tombstoned. Returns the number of lines moved.
    async fn merge_guest(&self, guest: &CartOwner, account: &CartOwner) -> Result<usize>;
}

/// Everything written when an order is placed.
#[derive(Clone, Debug)]
pub struct OrderWrite {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub addresses: Vec<(Uuid, Address)>,
    /// Incremented in the same write; refused with `LimitReached` if exhausted meanwhile.
    pub redeem_coupon: Option<CouponCode>,
}

#[derive(Clone, Debug)]
pub struct ReconciliationWrite {
    pub payment: Payment,
    pub expected_payment_state: PaymentState,
    pub order_id: Uuid,
    pub expected_order_state: OrderState,
    pub order_state: OrderState,
    pub audit: PaymentAudit,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, write: OrderWrite) -> Result<()>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>>;
    async fn address(&self, id: Uuid) -> Result<Option<Address>>;
    async fn orders_in_states(&self, states: &[OrderState]) -> Result<Vec<Order>>;
    /// Compare-and-set on the order state; `false` if the stored state is not `from`.
    async fn update_order_state(&self, id: Uuid, from: OrderState, to: OrderState) -> Result<bool>;
    /// Inserts the payment and moves the order `from -> to` together; `false` if the order moved meanwhile.
    async fn insert_payment(&self, payment: &Payment, from: OrderState, to: OrderState) -> Result<bool>;
    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>>;
    async fn payment_by_ref(&self, gateway_ref: &str) -> Result<Option<Payment>>;
    /// Payment update, order transition and audit row together, guarded by both expected states.
    async fn apply_reconciliation(&self, write: ReconciliationWrite) -> Result<bool>;
    async fn audits_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentAudit>>;
}

/// What the gateway says about one transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GatewayVerification {
    pub status: GatewayStatus,
    pub amount: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Transport or gateway-side failures surface as `GatewayUnavailable`.
    async fn verify(&self, gateway_ref: &str) -> Result<GatewayVerification>;
}
