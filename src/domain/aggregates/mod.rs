//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;

pub use cart::{Cart, CartError, CartLine};
pub use coupon::{Coupon, CouponKind, CouponRejection};
pub use order::{Address, NewOrder, Order, OrderLine, OrderState, OrderTotals, PaymentSignal};
pub use payment::{GatewayStatus, Payment, PaymentAudit, PaymentState, PAYMENT_NOT_VERIFIED};
pub use product::{CatalogEntry, Product, ProductStatus, Variant};
pub use shipping::{ShippingCity, ShippingMethod, ShippingRate, ShippingZone};
