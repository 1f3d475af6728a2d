use rust_decimal::{Decimal, RoundingStrategy};

use super::decimal::{decimal_newtype, snap};

/// A quote price. Kept apart from [`Size`](super::Size) so the two can't be swapped by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(pub Decimal);

decimal_newtype!(Price);

impl Price {
    /// Largest multiple of `tick` not above this price.
    pub fn align_down(&self, tick: Price) -> Self {
        Self(snap(self.0, tick.0, |steps| steps.floor()))
    }

    /// Smallest multiple of `tick` not below this price.
    pub fn align_up(&self, tick: Price) -> Self {
        Self(snap(self.0, tick.0, |steps| steps.ceil()))
    }

    /// Nearest multiple of `tick`; halfway cases go to the even tick.
    pub fn align_nearest(&self, tick: Price) -> Self {
        Self(snap(self.0, tick.0, |steps| {
            steps.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        }))
    }

    /// Move by `ticks` whole ticks; negative values move down.
    pub fn offset_ticks(&self, tick: Price, ticks: i64) -> Self {
        Self(self.0 + tick.0 * Decimal::from(ticks))
    }
}

impl std::ops::Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self {
        Self(self.0 * rhs)
    }
}

impl std::ops::Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self {
        Self(self.0 / rhs)
    }
}
