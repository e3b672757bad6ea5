//! Tax policies applied to the discounted subtotal.

use rust_decimal::Decimal;
use crate::domain::value_objects::round_money;

pub trait TaxPolicy: Send + Sync {
    fn tax(&self, taxable: Decimal) -> Decimal;
}

/// A single percentage applied to every order.
#[derive(Clone, Copy, Debug)]
pub struct FlatRateTax {
    rate_percent: Decimal,
}

impl FlatRateTax {
    pub fn new(rate_percent: Decimal) -> Self { Self { rate_percent } }
}

impl TaxPolicy for FlatRateTax {
    fn tax(&self, taxable: Decimal) -> Decimal {
        round_money(taxable.max(Decimal::ZERO) * self.rate_percent / Decimal::ONE_HUNDRED)
    }
}
