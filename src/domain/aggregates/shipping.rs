//! Shipping zones: (region, locality) -> {standard, express} price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use crate::EcommerceError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str { match self { Self::Standard => "standard", Self::Express => "express" } }
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ShippingMethod {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            other => Err(EcommerceError::Validation(format!("unknown shipping method {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShippingRate { pub standard_price: Decimal, pub express_price: Decimal }

impl ShippingRate {
    pub fn price_for(&self, method: ShippingMethod) -> Decimal {
        match method { ShippingMethod::Standard => self.standard_price, ShippingMethod::Express => self.express_price }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingCity { pub locality: String, pub standard_price: Decimal, pub express_price: Decimal }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingZone { pub region: String, pub cities: Vec<ShippingCity> }

fn same_place(a: &str, b: &str) -> bool { a.trim().eq_ignore_ascii_case(b.trim()) }

impl ShippingZone {
    pub fn covers(&self, region: &str) -> bool { same_place(&self.region, region) }

    pub fn city(&self, locality: &str) -> Option<&ShippingCity> { self.cities.iter().find(|c| same_place(&c.locality, locality)) }
}

/// Finds the rate for a destination; `None` when region or locality is unknown.
pub fn find_rate(zones: &[ShippingZone], region: &str, locality: &str) -> Option<ShippingRate> {
    let city = zones.iter().find(|z| z.covers(region))?.city(locality)?;
    Some(ShippingRate { standard_price: city.standard_price, express_price: city.express_price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn nairobi() -> ShippingZone {
        ShippingZone {
            region: "Nairobi".into(),
            cities: vec![
                ShippingCity { locality: "Westlands".into(), standard_price: dec!(270), express_price: dec!(450) },
                ShippingCity { locality: "Karen".into(), standard_price: dec!(350), express_price: dec!(600) },
            ],
        }
    }

    #[test]
    fn test_find_rate_is_case_insensitive() {
        let rate = find_rate(&[nairobi()], " nairobi", "WESTLANDS").unwrap();
        assert_eq!(rate.price_for(ShippingMethod::Standard), dec!(270));
        assert_eq!(rate.price_for(ShippingMethod::Express), dec!(450));
    }

    #[test]
    fn test_no_match() {
        assert!(find_rate(&[nairobi()], "Mombasa", "Nyali").is_none());
        assert!(find_rate(&[nairobi()], "Nairobi", "Kilimani").is_none());
    }
}
