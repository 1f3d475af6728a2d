use crate::core::events::{OrderSide, PositionSide};
use crate::types::{InstrumentId, Size};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;

/// Fill applied to a position ahead of the account snapshot that will confirm it
#[derive(Debug, Clone, Copy)]
struct PendingDeal {
    side: OrderSide,
    amount: Decimal,
    position_side: Option<PositionSide>,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PositionState {
    confirmed_long: Decimal,
    confirmed_short: Decimal,
    pending: Vec<PendingDeal>,
    snapshot_at: Option<DateTime<Utc>>,
}

impl PositionState {
    /// Confirmed legs with every pending deal replayed on top
    fn legs(&self) -> (Decimal, Decimal) {
        let mut long = self.confirmed_long;
        let mut short = self.confirmed_short;
        for deal in &self.pending {
            apply_deal(&mut long, &mut short, deal);
        }
        (long, short)
    }
}

fn apply_deal(long: &mut Decimal, short: &mut Decimal, deal: &PendingDeal) {
    match (deal.position_side, deal.side) {
        (Some(PositionSide::Long), OrderSide::Buy) => *long += deal.amount,
        (Some(PositionSide::Long), OrderSide::Sell) => *long = (*long - deal.amount).max(Decimal::ZERO),
        (Some(PositionSide::Short), OrderSide::Sell) => *short += deal.amount,
        (Some(PositionSide::Short), OrderSide::Buy) => *short = (*short - deal.amount).max(Decimal::ZERO),
        // Net mode: a single signed position split into its two legs
        (None, side) => {
            let mut net = *long - *short;
            match side {
                OrderSide::Buy => net += deal.amount,
                OrderSide::Sell => net -= deal.amount,
            }
            *long = net.max(Decimal::ZERO);
            *short = (-net).max(Decimal::ZERO);
        }
    }
}

/// Derivative position on one instrument, tracked as a long and a short leg.
///
/// In net mode only one leg is ever non-zero.
#[derive(Debug)]
pub struct Position {
    instrument_id: InstrumentId,
    state: Mutex<PositionState>,
}

impl Position {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            state: Mutex::new(PositionState::default()),
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn long(&self) -> Size {
        Size::new(self.state.lock().legs().0)
    }

    pub fn short(&self) -> Size {
        Size::new(self.state.lock().legs().1)
    }

    /// Long minus short
    pub fn net(&self) -> Decimal {
        let (long, short) = self.state.lock().legs();
        long - short
    }

    pub fn ready(&self) -> (bool, String) {
        if self.state.lock().snapshot_at.is_none() {
            (false, "no position snapshot received".to_string())
        } else {
            (true, String::new())
        }
    }

    /// Apply a fill of `amount` contracts. `position_side` is `None` in net mode.
    pub fn apply_deal(&self, side: OrderSide, amount: Size, position_side: Option<PositionSide>, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        if matches!(state.snapshot_at, Some(snapshot_at) if at <= snapshot_at) {
            debug!(
                "[position-{}] deal {} {} at {} predates snapshot, ignored",
                self.instrument_id, side, amount, at
            );
            return;
        }
        state.pending.push(PendingDeal {
            side,
            amount: amount.value(),
            position_side,
            at,
        });
    }

    /// Replace confirmed legs with an account snapshot taken at `at`
    pub fn apply_snapshot(&self, long: Size, short: Size, at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if matches!(state.snapshot_at, Some(prev) if at < prev) {
            warn!("[position-{}] out-of-order snapshot at {} dropped", self.instrument_id, at);
            return false;
        }
        state.confirmed_long = long.value();
        state.confirmed_short = short.value();
        state.pending.retain(|d| d.at > at);
        state.snapshot_at = Some(at);
        true
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (long, short) = self.state.lock().legs();
        write!(f, "{}: long={} short={}", self.instrument_id, long, short)
    }
}
