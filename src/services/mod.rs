//! Application services and the engine that wires them together.

pub mod cart_store;
pub mod checkout;
pub mod ledger;
pub mod ports;
pub mod reconciler;
pub mod reference;
pub mod tax;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use crate::infrastructure::{EventBus, MemoryCatalog, MemoryStore, PgStore};

pub use cart_store::CartStore;
pub use checkout::{CheckoutRequest, CheckoutService, CheckoutValidator, Destination, OrderDraft, PricedLine};
pub use ledger::{OrderDetails, OrderLedger};
pub use ports::{CartRepository, CatalogLookup, CouponStore, OrderRepository, PaymentGateway, ShippingRateTable, ZoneSource};
pub use reconciler::{Disposition, PaymentReconciler, ReconcileOutcome, VerificationEvent};
pub use reference::{CachedShippingTable, CouponEvaluator};
pub use tax::{FlatRateTax, TaxPolicy};

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub currency: String,
    pub tax_rate_percent: Decimal,
    pub fallback_shipping: Decimal,
    pub gateway_timeout: Duration,
    pub reference_cache_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            currency: "KES".into(),
            tax_rate_percent: Decimal::from(16),
            fallback_shipping: Decimal::from(500),
            gateway_timeout: Duration::from_secs(10),
            reference_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// The storage side of the engine, one implementation per port.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogLookup>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub zones: Arc<dyn ZoneSource>,
    pub coupons: Arc<dyn CouponStore>,
}

impl Backends {
    pub fn memory(catalog: Arc<MemoryCatalog>, store: Arc<MemoryStore>) -> Self {
        Self { catalog, carts: store.clone(), orders: store.clone(), zones: store.clone(), coupons: store }
    }

    pub fn postgres(store: Arc<PgStore>) -> Self {
        Self { catalog: store.clone(), carts: store.clone(), orders: store.clone(), zones: store.clone(), coupons: store }
    }
}

#[derive(Clone)]
pub struct Engine {
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutService>,
    pub ledger: Arc<OrderLedger>,
    pub reconciler: Arc<PaymentReconciler>,
    pub shipping: Arc<CachedShippingTable>,
    pub coupons: Arc<CouponEvaluator>,
}

impl Engine {
    pub fn new(settings: EngineSettings, backends: Backends, gateway: Arc<dyn PaymentGateway>, events: EventBus) -> Self {
        let carts = Arc::new(CartStore::new(backends.carts, events.clone()));
        let ledger = Arc::new(OrderLedger::new(backends.orders.clone(), events));
        let shipping = Arc::new(CachedShippingTable::new(backends.zones, settings.reference_cache_ttl));
        let coupons = Arc::new(CouponEvaluator::new(backends.coupons, settings.reference_cache_ttl));
        let validator = CheckoutValidator::new(
            backends.catalog,
            shipping.clone(),
            coupons.clone(),
            Arc::new(FlatRateTax::new(settings.tax_rate_percent)),
            settings.fallback_shipping,
            settings.currency,
        );
        let checkout = Arc::new(CheckoutService::new(carts.clone(), validator, coupons.clone(), ledger.clone()));
        let reconciler = Arc::new(PaymentReconciler::new(backends.orders, ledger.clone(), gateway, settings.gateway_timeout));
        Self { carts, checkout, ledger, reconciler, shipping, coupons }
    }
}
