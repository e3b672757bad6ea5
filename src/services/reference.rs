//! Cached views over slow-changing reference data: shipping zones and coupons.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::domain::aggregates::coupon::{self, Coupon};
use crate::domain::aggregates::shipping::find_rate;
use crate::domain::aggregates::{ShippingRate, ShippingZone};
use crate::domain::value_objects::CouponCode;
use crate::infrastructure::ReadThroughCache;
use crate::services::ports::{CouponStore, ShippingRateTable, ZoneSource};
use crate::{EcommerceError, Result};

/// The full zone table, loaded in one read and kept for the cache TTL.
pub struct CachedShippingTable {
    source: Arc<dyn ZoneSource>,
    zones: ReadThroughCache<(), Arc<Vec<ShippingZone>>>,
}

impl CachedShippingTable {
    pub fn new(source: Arc<dyn ZoneSource>, ttl: Duration) -> Self {
        Self { source, zones: ReadThroughCache::new(ttl) }
    }

    pub fn invalidate(&self) { self.zones.invalidate_all(); }
}

#[async_trait]
impl ShippingRateTable for CachedShippingTable {
    async fn rate(&self, region: &str, locality: &str) -> Result<Option<ShippingRate>> {
        let zones = self.zones.get_or_load((), || async {
            let zones = self.source.load_zones().await?;
            debug!(zones = zones.len(), "shipping zones loaded");
            Ok::<_, EcommerceError>(Arc::new(zones))
        }).await?;
        Ok(find_rate(&zones, region, locality))
    }
}

/// Coupon lookups are cached; the usage limit is re-checked durably when an order redeems one.
pub struct CouponEvaluator {
    store: Arc<dyn CouponStore>,
    coupons: ReadThroughCache<CouponCode, Option<Coupon>>,
}

impl CouponEvaluator {
    pub fn new(store: Arc<dyn CouponStore>, ttl: Duration) -> Self {
        Self { store, coupons: ReadThroughCache::new(ttl) }
    }

    /// Discount for `subtotal`, or `CouponRejected` with the reason.
    pub async fn evaluate(&self, code: &CouponCode, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal> {
        let coupon = self.coupons.get_or_load(code.clone(), || self.store.find_coupon(code)).await?;
        coupon::evaluate(coupon.as_ref(), subtotal, now).map_err(EcommerceError::CouponRejected)
    }

    pub fn invalidate(&self, code: &CouponCode) { self.coupons.invalidate(code); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CouponKind, CouponRejection, ShippingCity, ShippingMethod};
    use crate::infrastructure::MemoryStore;
    use rust_decimal_macros::dec;

    fn coupon(code: &CouponCode, used: u32) -> Coupon {
        Coupon {
            code: code.clone(), kind: CouponKind::Percentage, value: dec!(10), min_order_value: dec!(0), enabled: true,
            start_date: Utc::now() - chrono::Duration::days(1), end_date: None, usage_limit: Some(1), used_count: used,
        }
    }

    #[tokio::test]
    async fn test_coupon_cache_serves_until_invalidated() {
        let store = Arc::new(MemoryStore::new());
        let code = CouponCode::new("once").unwrap();
        store.put_coupon(coupon(&code, 0)).unwrap();
        let coupons = CouponEvaluator::new(store.clone(), Duration::from_secs(300));
        assert_eq!(coupons.evaluate(&code, dec!(5000), Utc::now()).await.unwrap(), dec!(500));

        store.put_coupon(coupon(&code, 1)).unwrap();
        assert!(coupons.evaluate(&code, dec!(5000), Utc::now()).await.is_ok()); // cached
        coupons.invalidate(&code);
        let err = coupons.evaluate(&code, dec!(5000), Utc::now()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::CouponRejected(CouponRejection::LimitReached)));
    }

    #[tokio::test]
    async fn test_unknown_coupon() {
        let coupons = CouponEvaluator::new(Arc::new(MemoryStore::new()), Duration::from_secs(300));
        let err = coupons.evaluate(&CouponCode::new("NOPE").unwrap(), dec!(10), Utc::now()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::CouponRejected(CouponRejection::UnknownCode)));
    }

    #[tokio::test]
    async fn test_shipping_table_reads_through() {
        let store = Arc::new(MemoryStore::new());
        let table = CachedShippingTable::new(store.clone(), Duration::from_secs(300));
        assert!(table.rate("Nairobi", "Westlands").await.unwrap().is_none());

        store.put_zone(ShippingZone {
            region: "Nairobi".into(),
            cities: vec![ShippingCity { locality: "Westlands".into(), standard_price: dec!(270), express_price: dec!(450) }],
        }).unwrap();
        assert!(table.rate("Nairobi", "Westlands").await.unwrap().is_none());
        table.invalidate();
        let rate = table.rate("nairobi", "westlands").await.unwrap().unwrap();
        assert_eq!(rate.price_for(ShippingMethod::Express), dec!(450));
    }
}
