use crate::orderbook::types::{OrderBookDelta, OrderBookLevel, OrderBookSnapshot};
use crate::types::{InstrumentId, Price, Size};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Bid/ask ladders for one instrument.
/// Both sides are keyed ascending; the best bid is the last bid key.
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    bids: BTreeMap<Price, Size>,
    asks: BTreeMap<Price, Size>,
    last_update: u64,
}

/// A zero size removes the level
fn set_level(side: &mut BTreeMap<Price, Size>, level: &OrderBookLevel) {
    if level.size.is_zero() {
        side.remove(&level.price);
    } else {
        side.insert(level.price, level.size);
    }
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: 0,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    /// Highest bid level, if any
    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.bids.iter().next_back().map(|(price, size)| (*price, *size))
    }

    /// Lowest ask level, if any
    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.asks.iter().next().map(|(price, size)| (*price, *size))
    }

    /// Midpoint of the touch; `None` while either side is empty
    pub fn mid_price(&self) -> Option<Price> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        Some(Price::new((bid.value() + ask.value()) / rust_decimal::Decimal::TWO))
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Option<Price> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        Some(ask - bid)
    }

    /// Get the top N bid levels, best first
    pub fn top_bids(&self, n: usize) -> SmallVec<[(Price, Size); 20]> {
        self.bids.iter().rev().take(n).map(|(p, s)| (*p, *s)).collect()
    }

    /// Get the top N ask levels, best first
    pub fn top_asks(&self, n: usize) -> SmallVec<[(Price, Size); 20]> {
        self.asks.iter().take(n).map(|(p, s)| (*p, *s)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Replace both ladders; zero-size levels in the snapshot are skipped
    pub fn apply_snapshot(&mut self, snapshot: OrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        snapshot.bids.iter().for_each(|level| set_level(&mut self.bids, level));
        snapshot.asks.iter().for_each(|level| set_level(&mut self.asks, level));
        self.last_update = snapshot.timestamp;
    }

    /// Merge level changes into the ladders
    pub fn apply_delta(&mut self, delta: OrderBookDelta) {
        delta.bids.iter().for_each(|level| set_level(&mut self.bids, level));
        delta.asks.iter().for_each(|level| set_level(&mut self.asks, level));
        self.last_update = delta.timestamp;
    }

    /// Number of price levels on each side: `(bids, asks)`
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Venue timestamp of the last snapshot or delta applied
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    /// Ladder dump, asks on top (worst first), bids below (best first)
    pub fn render(&self, depth: usize) -> String {
        let mut out = String::new();
        for (price, size) in self.top_asks(depth).iter().rev() {
            let _ = writeln!(out, "  ask {:>16} {:>16}", price, size);
        }
        let _ = writeln!(out, "  ----");
        for (price, size) in self.top_bids(depth).iter() {
            let _ = writeln!(out, "  bid {:>16} {:>16}", price, size);
        }
        out
    }
}
