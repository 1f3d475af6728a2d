//! Per-instrument market state aggregated from streaming feeds.
//!
//! A market is `ready` only while every feed its product type depends on is
//! fresh: spot needs depth, derivatives need depth, mark price, price limits
//! and funding.

pub mod common;
pub mod feed;
pub mod future;
pub mod spot;

pub use common::MarketCore;
pub use feed::{Feed, FeedFlags, FlagSnapshot};
pub use future::{FundingInfo, FutureMarket};
pub use spot::SpotMarket;

use crate::core::events::OrderSide;
use crate::orderbook::OrderBook;
use crate::types::{Instrument, Price, Size};
use parking_lot::RwLockReadGuard;
use std::fmt;

/// Read side of a market, shared by spot and derivative implementations
pub trait Market: Send + Sync + fmt::Display {
    fn instrument(&self) -> &Instrument;

    fn ready(&self) -> bool;

    /// Empty when ready
    fn unready_reason(&self) -> String;

    fn latest_price(&self) -> Option<Price>;

    fn order_book(&self) -> RwLockReadGuard<'_, OrderBook>;

    fn align_price(&self, price: Price, side: OrderSide, make_only: bool) -> Price;

    fn align_size(&self, size: Size) -> Size;

    /// Unsubscribe all feeds and stop the watchdogs
    fn uninit(&self);
}

/// Extra state carried by futures and perpetual swaps
pub trait DerivativeMarket: Market {
    fn mark_price(&self) -> Option<Price>;

    fn funding_info(&self) -> FundingInfo;

    /// `(max_buy, min_sell)` once the venue has published them
    fn price_limits(&self) -> Option<(Price, Price)>;
}
