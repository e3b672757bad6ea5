//! Value Objects for checkout

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

/// Key under which cart lines are grouped: an opaque guest token or an account id, never both.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CartOwner {
    Guest(String),
    Account(Uuid),
}

impl CartOwner {
    pub fn guest(token: impl Into<String>) -> Result<Self, OwnerError> {
        let token = token.into().trim().to_string();
        if token.is_empty() { return Err(OwnerError::EmptyToken); }
        if token.len() > 128 { return Err(OwnerError::TooLong); }
        Ok(Self::Guest(token))
    }
    pub fn account(id: Uuid) -> Self { Self::Account(id) }
    pub fn is_guest(&self) -> bool { matches!(self, Self::Guest(_)) }
    /// Storage key, identical to the `Display` form.
    pub fn key(&self) -> String { self.to_string() }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest(token) => write!(f, "guest:{token}"),
            Self::Account(id) => write!(f, "account:{id}"),
        }
    }
}

impl FromStr for CartOwner {
    type Err = OwnerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("guest", token)) => Self::guest(token),
            Some(("account", id)) => Uuid::parse_str(id).map(Self::Account).map_err(|_| OwnerError::Malformed),
            _ => Err(OwnerError::Malformed),
        }
    }
}

impl TryFrom<String> for CartOwner {
    type Error = OwnerError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<CartOwner> for String {
    fn from(owner: CartOwner) -> Self { owner.key() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnerError {
    #[error("cart owner must look like guest:<token> or account:<uuid>")]
    Malformed,
    #[error("guest token is empty")]
    EmptyToken,
    #[error("guest token too long")]
    TooLong,
}

/// Coupon code, trimmed and upper-cased so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 32 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("coupon code empty")]
    Empty,
    #[error("coupon code too long")]
    TooLong,
}

/// Strictly positive line quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Option<Self> { (value > 0).then_some(Self(value)) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = &'static str;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value).ok_or("quantity must be at least 1") }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

/// Rounds a computed amount to minor units, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_owner_round_trips_through_display() {
        let id = Uuid::new_v4();
        assert_eq!(format!("account:{id}").parse::<CartOwner>().unwrap(), CartOwner::Account(id));
        assert_eq!("guest:abc".parse::<CartOwner>().unwrap(), CartOwner::Guest("abc".into()));
        assert_eq!("guest:  ".parse::<CartOwner>(), Err(OwnerError::EmptyToken));
        assert_eq!("member:1".parse::<CartOwner>(), Err(OwnerError::Malformed));
        assert_eq!("account:not-a-uuid".parse::<CartOwner>(), Err(OwnerError::Malformed));
    }

    #[test]
    fn test_coupon_code() { assert_eq!(CouponCode::new(" save10 ").unwrap().as_str(), "SAVE10"); }

    #[test]
    fn test_quantity_rejects_zero() {
        assert!(Quantity::new(0).is_none());
        assert_eq!(Quantity::new(2).unwrap().add(Quantity::ONE).value(), 3);
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(160.0000)), dec!(160.00));
    }
}
