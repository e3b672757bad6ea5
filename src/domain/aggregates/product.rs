//! Product Aggregate
//!
//! The checkout engine only reads products; what it needs from one is a
//! [`CatalogEntry`]: the authoritative price, stock and enabled flags at the
//! moment of the lookup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub price: Decimal,
    pub stock_on_hand: u32,
    /// Variant flag; equals `product_enabled` for products without variants.
    pub enabled: bool,
    pub product_enabled: bool,
}

impl CatalogEntry {
    pub fn is_sellable(&self) -> bool { self.enabled && self.product_enabled }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant { pub id: String, pub name: String, pub price: Decimal, pub stock_on_hand: u32, pub enabled: bool }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub stock_on_hand: u32,
    pub status: ProductStatus,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Product {
    pub fn active(id: impl Into<String>, name: impl Into<String>, price: Decimal, stock_on_hand: u32) -> Self {
        Self { id: id.into(), name: name.into(), price, stock_on_hand, status: ProductStatus::Active, variants: vec![] }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self { self.variants.push(variant); self }

    pub fn is_enabled(&self) -> bool { self.status == ProductStatus::Active }

    /// Entry for the product itself or one of its variants; `None` for an unknown variant.
    pub fn resolve(&self, variant_id: Option<&str>) -> Option<CatalogEntry> {
        let product_enabled = self.is_enabled();
        match variant_id {
            None => Some(CatalogEntry { price: self.price, stock_on_hand: self.stock_on_hand, enabled: product_enabled, product_enabled }),
            Some(vid) => self.variants.iter().find(|v| v.id == vid).map(|v| CatalogEntry {
                price: v.price, stock_on_hand: v.stock_on_hand, enabled: v.enabled, product_enabled,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_resolve_variant() {
        let p = Product::active("P1", "Shirt", dec!(1000), 5)
            .with_variant(Variant { id: "P1-L".into(), name: "Large".into(), price: dec!(1100), stock_on_hand: 2, enabled: false });
        assert_eq!(p.resolve(None).unwrap().price, dec!(1000));
        let large = p.resolve(Some("P1-L")).unwrap();
        assert_eq!(large.price, dec!(1100));
        assert!(!large.is_sellable());
        assert!(p.resolve(Some("P1-XL")).is_none());
    }

    #[test]
    fn test_archived_product_not_sellable() {
        let mut p = Product::active("P1", "Shirt", dec!(1000), 5);
        p.status = ProductStatus::Archived;
        assert!(!p.resolve(None).unwrap().is_sellable());
    }
}
