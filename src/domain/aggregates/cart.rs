//! Cart Aggregate
//!
//! A cart has no lifecycle record of its own: it is the set of lines stored
//! under one owner, and an owner with no lines simply has an empty cart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{CartOwner, Quantity};

#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub owner: CartOwner,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(owner: CartOwner, product_id: impl Into<String>, variant_id: Option<String>, quantity: Quantity) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), owner, product_id: product_id.into(), variant_id, quantity, created_at: now, updated_at: now }
    }

    pub fn is_for(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_id.as_deref() == variant_id
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    owner: CartOwner,
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn empty(owner: CartOwner) -> Self { Self { owner, lines: vec![] } }
    pub fn from_lines(owner: CartOwner, lines: Vec<CartLine>) -> Self { Self { owner, lines } }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn quantity_of(&self, product_id: &str, variant_id: Option<&str>) -> Option<u32> {
        self.lines.iter().find(|l| l.is_for(product_id, variant_id)).map(|l| l.quantity.value())
    }

    /// Increments the existing line for the product/variant, or appends a new one.
    pub fn add(&mut self, product_id: &str, variant_id: Option<&str>, quantity: Quantity) -> CartLine {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.is_for(product_id, variant_id)) {
            existing.quantity = existing.quantity.add(quantity);
            existing.updated_at = Utc::now();
            return existing.clone();
        }
        let line = CartLine::new(self.owner.clone(), product_id, variant_id.map(str::to_string), quantity);
        self.lines.push(line.clone());
        line
    }

    pub fn set_quantity(&mut self, line_id: Uuid, quantity: Quantity) -> Result<(), CartError> {
        let line = self.lines.iter_mut().find(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        line.quantity = quantity;
        line.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove(&mut self, line_id: Uuid) -> Result<CartLine, CartError> {
        let idx = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        Ok(self.lines.remove(idx))
    }

    pub fn clear(&mut self) -> usize { std::mem::take(&mut self.lines).len() }

    /// Moves every line of `other` into this cart, summing quantities per product/variant.
    pub fn absorb(&mut self, other: Cart) -> usize {
        let moved = other.lines.len();
        for line in other.lines {
            self.add(&line.product_id, line.variant_id.as_deref(), line.quantity);
        }
        moved
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart line not found")]
    LineNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest() -> CartOwner { CartOwner::guest("tok-1").unwrap() }
    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::empty(guest());
        cart.add("P1", None, qty(2));
        cart.add("P1", None, qty(1));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of("P1", None), Some(3)); // Merged
        cart.add("P1", Some("P1-RED"), qty(1));
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.quantity_of("P1", Some("P1-RED")), Some(1));
    }

    #[test]
    fn test_set_and_remove_unknown_line() {
        let mut cart = Cart::empty(guest());
        assert_eq!(cart.set_quantity(Uuid::new_v4(), qty(1)), Err(CartError::LineNotFound));
        assert_eq!(cart.remove(Uuid::new_v4()).unwrap_err(), CartError::LineNotFound);
    }

    #[test]
    fn test_absorb_sums_quantities() {
        let account = CartOwner::account(Uuid::new_v4());
        let mut target = Cart::empty(account.clone());
        target.add("A", None, qty(1));
        let mut source = Cart::empty(guest());
        source.add("A", None, qty(2));
        source.add("B", None, qty(1));
        assert_eq!(target.absorb(source), 2);
        assert_eq!(target.quantity_of("A", None), Some(3));
        assert_eq!(target.quantity_of("B", None), Some(1));
        assert!(target.lines().iter().all(|l| l.owner == account));
    }
}
