//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::value_objects::{round_money, CouponCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind { Percentage, Fixed }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    pub kind: CouponKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_order_value: Decimal,
    pub enabled: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("unknown coupon code")]
    UnknownCode,
    #[error("coupon is disabled")]
    Disabled,
    #[error("coupon is not active yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    LimitReached,
    #[error("order subtotal is below the coupon minimum of {minimum}")]
    BelowMinimum { minimum: Decimal },
}

impl Coupon {
    pub fn has_capacity(&self) -> bool { self.usage_limit.map_or(true, |limit| self.used_count < limit) }

    /// Discount for `subtotal` at `now`, capped at the subtotal.
    pub fn evaluate(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, CouponRejection> {
        if !self.enabled { return Err(CouponRejection::Disabled); }
        if now < self.start_date { return Err(CouponRejection::NotStarted); }
        if self.end_date.is_some_and(|end| now > end) { return Err(CouponRejection::Expired); }
        if !self.has_capacity() { return Err(CouponRejection::LimitReached); }
        if subtotal < self.min_order_value { return Err(CouponRejection::BelowMinimum { minimum: self.min_order_value }); }
        let raw = match self.kind {
            CouponKind::Percentage => round_money(subtotal * self.value / Decimal::ONE_HUNDRED),
            CouponKind::Fixed => self.value,
        };
        Ok(raw.max(Decimal::ZERO).min(subtotal))
    }
}

/// Evaluates an optional lookup result; a missing coupon is an unknown code.
pub fn evaluate(coupon: Option<&Coupon>, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, CouponRejection> {
    coupon.ok_or(CouponRejection::UnknownCode)?.evaluate(subtotal, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(kind: CouponKind, value: Decimal) -> Coupon {
        Coupon {
            code: CouponCode::new("SAVE").unwrap(), kind, value, min_order_value: Decimal::ZERO, enabled: true,
            start_date: Utc::now() - Duration::days(1), end_date: None, usage_limit: None, used_count: 0,
        }
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        assert_eq!(coupon(CouponKind::Fixed, dec!(200)).evaluate(dec!(150), Utc::now()), Ok(dec!(150)));
    }

    #[test]
    fn test_percentage_discount() {
        assert_eq!(coupon(CouponKind::Percentage, dec!(10)).evaluate(dec!(5000), Utc::now()), Ok(dec!(500)));
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();
        assert_eq!(evaluate(None, dec!(10), now), Err(CouponRejection::UnknownCode));

        let mut c = coupon(CouponKind::Fixed, dec!(5));
        c.enabled = false;
        assert_eq!(c.evaluate(dec!(10), now), Err(CouponRejection::Disabled));

        let mut c = coupon(CouponKind::Fixed, dec!(5));
        c.start_date = now + Duration::hours(1);
        assert_eq!(c.evaluate(dec!(10), now), Err(CouponRejection::NotStarted));

        let mut c = coupon(CouponKind::Fixed, dec!(5));
        c.end_date = Some(now - Duration::hours(1));
        assert_eq!(c.evaluate(dec!(10), now), Err(CouponRejection::Expired));

        let mut c = coupon(CouponKind::Fixed, dec!(5));
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(c.evaluate(dec!(10), now), Err(CouponRejection::LimitReached));

        let mut c = coupon(CouponKind::Fixed, dec!(5));
        c.min_order_value = dec!(100);
        assert_eq!(c.evaluate(dec!(99.99), now), Err(CouponRejection::BelowMinimum { minimum: dec!(100) }));
        assert_eq!(c.evaluate(dec!(100), now), Ok(dec!(5)));
    }
}
