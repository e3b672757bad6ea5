//! In-memory implementations of the storage ports.
//!
//! All state sits behind one mutex and every method validates before it
//! mutates, so each call commits completely or not at all.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, Cart, CartLine, CatalogEntry, Coupon, CouponRejection, Order, OrderLine, OrderState, Payment,
    PaymentAudit, PaymentState, Product, ShippingZone,
};
use crate::domain::value_objects::{CartOwner, CouponCode, Quantity};
use crate::services::ports::{
    CartRepository, CatalogLookup, CouponStore, OrderRepository, OrderWrite, ReconciliationWrite, ZoneSource,
};
use crate::{EcommerceError, Result};

#[derive(Default)]
struct MemoryState {
    carts: HashMap<CartOwner, Cart>,
    tombstones: HashMap<CartOwner, CartOwner>,
    orders: HashMap<Uuid, Order>,
    order_lines: HashMap<Uuid, Vec<OrderLine>>,
    addresses: HashMap<Uuid, Address>,
    payments: HashMap<Uuid, Payment>,
    audits: Vec<PaymentAudit>,
    coupons: HashMap<CouponCode, Coupon>,
    zones: Vec<ShippingZone>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| EcommerceError::StorageError("memory store lock poisoned".into()))
    }

    pub fn put_coupon(&self, coupon: Coupon) -> Result<()> {
        self.state()?.coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    pub fn put_zone(&self, zone: ShippingZone) -> Result<()> {
        let mut state = self.state()?;
        state.zones.retain(|z| !z.covers(&zone.region));
        state.zones.push(zone);
        Ok(())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>> {
        Ok(self.state()?.carts.get(owner).map(|c| c.lines().to_vec()).unwrap_or_default())
    }

    async fn upsert_line(&self, owner: &CartOwner, product_id: &str, variant_id: Option<&str>, quantity: Quantity) -> Result<CartLine> {
        let mut state = self.state()?;
        let cart = state.carts.entry(owner.clone()).or_insert_with(|| Cart::empty(owner.clone()));
        Ok(cart.add(product_id, variant_id, quantity))
    }

    async fn set_quantity(&self, owner: &CartOwner, line_id: Uuid, quantity: Quantity) -> Result<bool> {
        Ok(self.state()?.carts.get_mut(owner).is_some_and(|c| c.set_quantity(line_id, quantity).is_ok()))
    }

    async fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<bool> {
        Ok(self.state()?.carts.get_mut(owner).is_some_and(|c| c.remove(line_id).is_ok()))
    }

    async fn clear(&self, owner: &CartOwner) -> Result<u64> {
        Ok(self.state()?.carts.remove(owner).map_or(0, |mut c| c.clear() as u64))
    }

    async fn is_tombstoned(&self, owner: &CartOwner) -> Result<bool> {
        Ok(self.state()?.tombstones.contains_key(owner))
    }

    async fn merge_guest(&self, guest: &CartOwner, account: &CartOwner) -> Result<usize> {
        let mut state = self.state()?;
        if state.tombstones.contains_key(guest) {
            return Err(EcommerceError::Conflict(format!("{guest} has already been merged")));
        }
        state.tombstones.insert(guest.clone(), account.clone());
        let Some(source) = state.carts.remove(guest) else { return Ok(0) };
        let target = state.carts.entry(account.clone()).or_insert_with(|| Cart::empty(account.clone()));
        Ok(target.absorb(source))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, write: OrderWrite) -> Result<()> {
        let mut state = self.state()?;
        if state.orders.values().any(|o| o.code == write.order.code) {
            return Err(EcommerceError::Conflict(format!("order code {} already used", write.order.code)));
        }
        if let Some(code) = &write.redeem_coupon {
            let coupon = state.coupons.get(code).ok_or(EcommerceError::CouponRejected(CouponRejection::UnknownCode))?;
            if !coupon.enabled { return Err(EcommerceError::CouponRejected(CouponRejection::Disabled)); }
            if !coupon.has_capacity() { return Err(EcommerceError::CouponRejected(CouponRejection::LimitReached)); }
        }

        if let Some(coupon) = write.redeem_coupon.as_ref().and_then(|code| state.coupons.get_mut(code)) {
            coupon.used_count += 1;
        }
        state.addresses.extend(write.addresses);
        state.order_lines.insert(write.order.id, write.lines);
        state.orders.insert(write.order.id, write.order);
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state()?.orders.get(&id).cloned())
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>> {
        Ok(self.state()?.order_lines.get(&order_id).cloned().unwrap_or_default())
    }

    async fn address(&self, id: Uuid) -> Result<Option<Address>> {
        Ok(self.state()?.addresses.get(&id).cloned())
    }

    async fn orders_in_states(&self, states: &[OrderState]) -> Result<Vec<Order>> {
        let state = self.state()?;
        let mut orders: Vec<Order> = state.orders.values().filter(|o| states.contains(&o.state)).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_order_state(&self, id: Uuid, from: OrderState, to: OrderState) -> Result<bool> {
        let mut state = self.state()?;
        let Some(order) = state.orders.get_mut(&id).filter(|o| o.state == from) else { return Ok(false) };
        order.state = to;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_payment(&self, payment: &Payment, from: OrderState, to: OrderState) -> Result<bool> {
        let mut state = self.state()?;
        if state.payments.values().any(|p| p.gateway_ref == payment.gateway_ref) {
            return Err(EcommerceError::Conflict(format!("gateway reference {} already used", payment.gateway_ref)));
        }
        let Some(order) = state.orders.get_mut(&payment.order_id).filter(|o| o.state == from) else { return Ok(false) };
        order.state = to;
        order.updated_at = Utc::now();
        state.payments.insert(payment.id, payment.clone());
        Ok(true)
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let state = self.state()?;
        let mut payments: Vec<Payment> = state.payments.values().filter(|p| p.order_id == order_id).cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn payment_by_ref(&self, gateway_ref: &str) -> Result<Option<Payment>> {
        Ok(self.state()?.payments.values().find(|p| p.gateway_ref == gateway_ref).cloned())
    }

    async fn apply_reconciliation(&self, write: ReconciliationWrite) -> Result<bool> {
        let mut state = self.state()?;
        let payment_matches = state.payments.get(&write.payment.id).is_some_and(|p| p.state == write.expected_payment_state);
        let order_matches = state.orders.get(&write.order_id).is_some_and(|o| o.state == write.expected_order_state);
        if !payment_matches || !order_matches { return Ok(false); }
        if write.payment.state == PaymentState::Settled
            && state.payments.values().any(|p| p.order_id == write.order_id && p.id != write.payment.id && p.state == PaymentState::Settled)
        {
            return Err(EcommerceError::Conflict(format!("order {} already has a settled payment", write.order_id)));
        }

        if let Some(order) = state.orders.get_mut(&write.order_id) {
            order.state = write.order_state;
            order.updated_at = Utc::now();
        }
        state.payments.insert(write.payment.id, write.payment);
        state.audits.push(write.audit);
        Ok(true)
    }

    async fn audits_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentAudit>> {
        Ok(self.state()?.audits.iter().filter(|a| a.payment_id == payment_id).cloned().collect())
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.state()?.coupons.get(code).cloned())
    }
}

#[async_trait]
impl ZoneSource for MemoryStore {
    async fn load_zones(&self) -> Result<Vec<ShippingZone>> {
        Ok(self.state()?.zones.clone())
    }
}

/// Mutable stand-in for the product service.
#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<String, Product>>,
}

impl MemoryCatalog {
    pub fn new() -> Self { Self::default() }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Product>>> {
        self.products.write().map_err(|_| EcommerceError::StorageError("catalog lock poisoned".into()))
    }

    pub fn put_product(&self, product: Product) -> Result<()> {
        self.write()?.insert(product.id.clone(), product);
        Ok(())
    }

    fn update(&self, product_id: &str, f: impl FnOnce(&mut Product)) -> Result<()> {
        let mut products = self.write()?;
        let product = products.get_mut(product_id).ok_or_else(|| EcommerceError::NotFound(format!("Product {product_id}")))?;
        f(product);
        Ok(())
    }

    pub fn set_price(&self, product_id: &str, price: Decimal) -> Result<()> { self.update(product_id, |p| p.price = price) }
    pub fn set_stock(&self, product_id: &str, stock: u32) -> Result<()> { self.update(product_id, |p| p.stock_on_hand = stock) }
}

#[async_trait]
impl CatalogLookup for MemoryCatalog {
    async fn resolve(&self, product_id: &str, variant_id: Option<&str>) -> Result<Option<CatalogEntry>> {
        let products = self.products.read().map_err(|_| EcommerceError::StorageError("catalog lock poisoned".into()))?;
        Ok(products.get(product_id).and_then(|p| p.resolve(variant_id)))
    }
}

/// Reference data for a memory-backed run (see `fixtures/demo.json`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemorySeed {
    pub products: Vec<Product>,
    pub zones: Vec<ShippingZone>,
    pub coupons: Vec<Coupon>,
}

impl MemorySeed {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> { serde_json::from_str(raw) }

    pub fn apply(self, catalog: &MemoryCatalog, store: &MemoryStore) -> Result<()> {
        for product in self.products { catalog.put_product(product)?; }
        for zone in self.zones { store.put_zone(zone)?; }
        for coupon in self.coupons { store.put_coupon(coupon)?; }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CouponKind, NewOrder, OrderTotals, ShippingMethod};
    use rust_decimal_macros::dec;

    fn order(code: &str) -> Order {
        let mut order = Order::place(NewOrder {
            code: code.into(), customer: CartOwner::guest("g").unwrap(), contact_email: None,
            totals: OrderTotals { sub_total: dec!(10), shipping: dec!(0), tax: dec!(0), discount: dec!(0), total: dec!(10), currency: "KES".into() },
            coupon_code: None, shipping_address_id: Uuid::new_v4(), billing_address_id: Uuid::new_v4(), shipping_method: ShippingMethod::Standard,
        });
        order.take_events();
        order
    }

    #[tokio::test]
    async fn test_insert_order_rolls_back_on_exhausted_coupon() {
        let store = MemoryStore::new();
        let code = CouponCode::new("ONCE").unwrap();
        store.put_coupon(Coupon {
            code: code.clone(), kind: CouponKind::Fixed, value: dec!(1), min_order_value: dec!(0), enabled: true,
            start_date: Utc::now(), end_date: None, usage_limit: Some(1), used_count: 1,
        }).unwrap();
        let o = order("ORD-1");
        let id = o.id;
        let err = store.insert_order(OrderWrite { order: o, lines: vec![], addresses: vec![(Uuid::new_v4(), Address::default())], redeem_coupon: Some(code) }).await;
        assert!(matches!(err, Err(EcommerceError::CouponRejected(CouponRejection::LimitReached))));
        assert!(store.order(id).await.unwrap().is_none());
        assert!(store.state().unwrap().addresses.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_order_code_conflicts() {
        let store = MemoryStore::new();
        store.insert_order(OrderWrite { order: order("ORD-1"), lines: vec![], addresses: vec![], redeem_coupon: None }).await.unwrap();
        let err = store.insert_order(OrderWrite { order: order("ORD-1"), lines: vec![], addresses: vec![], redeem_coupon: None }).await;
        assert!(matches!(err, Err(EcommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_demo_seed_loads() {
        let catalog = MemoryCatalog::new();
        let store = MemoryStore::new();
        MemorySeed::from_json(include_str!("../../fixtures/demo.json")).unwrap().apply(&catalog, &store).unwrap();

        let x = catalog.resolve("X", None).await.unwrap().unwrap();
        assert_eq!(x.price, dec!(1000));
        assert!(x.is_sellable());
        assert_eq!(catalog.resolve("TSHIRT", Some("TSHIRT-XL")).await.unwrap().unwrap().stock_on_hand, 3);
        assert!(!catalog.resolve("MUG", None).await.unwrap().unwrap().is_sellable());

        let zones = store.load_zones().await.unwrap();
        assert_eq!(zones.len(), 2);
        let welcome = store.find_coupon(&CouponCode::new("welcome10").unwrap()).await.unwrap().unwrap();
        assert_eq!(welcome.kind, CouponKind::Percentage);
        assert_eq!(welcome.used_count, 0);
        let flat = store.find_coupon(&CouponCode::new("FLAT200").unwrap()).await.unwrap().unwrap();
        assert_eq!(flat.min_order_value, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_merge_guest_is_all_or_nothing() {
        let store = MemoryStore::new();
        let guest = CartOwner::guest("tok").unwrap();
        let account = CartOwner::account(Uuid::new_v4());
        let one = Quantity::new(1).unwrap();
        store.upsert_line(&guest, "A", None, Quantity::new(2).unwrap()).await.unwrap();
        store.upsert_line(&account, "A", None, one).await.unwrap();

        assert_eq!(store.merge_guest(&guest, &account).await.unwrap(), 1);
        assert!(store.is_tombstoned(&guest).await.unwrap());
        assert_eq!(store.lines(&account).await.unwrap()[0].quantity.value(), 3);

        store.upsert_line(&guest, "B", None, one).await.unwrap();
        assert!(matches!(store.merge_guest(&guest, &account).await, Err(EcommerceError::Conflict(_))));
        assert_eq!(store.lines(&account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_state_compare_and_set() {
        let store = MemoryStore::new();
        let o = order("ORD-2");
        let id = o.id;
        store.insert_order(OrderWrite { order: o, lines: vec![], addresses: vec![], redeem_coupon: None }).await.unwrap();
        assert!(!store.update_order_state(id, OrderState::PaymentPending, OrderState::PaymentSettled).await.unwrap());
        assert!(store.update_order_state(id, OrderState::Created, OrderState::PaymentPending).await.unwrap());
        assert_eq!(store.order(id).await.unwrap().unwrap().state(), OrderState::PaymentPending);
    }
}
