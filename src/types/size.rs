use rust_decimal::Decimal;

use super::decimal::{decimal_newtype, snap};
use super::Price;

/// An order or fill quantity in the instrument's own unit (coins for spot, contracts for derivatives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size(pub Decimal);

decimal_newtype!(Size);

impl Size {
    /// Truncate to a whole number of lots. Sizes are never rounded up.
    pub fn align_down(&self, lot: Size) -> Self {
        Self(snap(self.0, lot.0, |lots| lots.floor()))
    }

    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }
}
