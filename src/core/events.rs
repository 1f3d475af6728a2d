//! Venue-normalized events and requests.
//!
//! Exchange adapters translate their wire formats into these shapes; nothing in
//! the core ever sees a venue payload.

use crate::types::{InstrumentId, Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue book timestamp, epoch milliseconds
pub type Timestamp = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Position leg addressed by an order in long/short (hedge) mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Account position mode for derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    /// One net position per instrument
    #[default]
    Net,
    /// Separate long and short legs; orders must name the leg
    LongShort,
}

/// Margin/trade mode attached to order requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    #[default]
    Cash,
    Cross,
    Isolated,
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Cash => write!(f, "cash"),
            TradeMode::Cross => write!(f, "cross"),
            TradeMode::Isolated => write!(f, "isolated"),
        }
    }
}

/// Order status as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

/// One price level; a zero size means "remove" when it arrives in a delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Price,
    pub size: Size,
}

impl OrderBookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

impl From<(Price, Size)> for OrderBookLevel {
    fn from((price, size): (Price, Size)) -> Self {
        Self::new(price, size)
    }
}

/// One side of a depth message, in venue order
pub type Ladder = Vec<OrderBookLevel>;

/// Full book image; replaces whatever the local book held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: InstrumentId,
    pub bids: Ladder,
    pub asks: Ladder,
    pub timestamp: Timestamp,
}

impl OrderBookSnapshot {
    pub fn new(instrument_id: impl Into<InstrumentId>, bids: Ladder, asks: Ladder, timestamp: Timestamp) -> Self {
        let instrument_id = instrument_id.into();
        Self { instrument_id, bids, asks, timestamp }
    }
}

/// Changed levels only, applied on top of the last snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub bids: Ladder,
    pub asks: Ladder,
    pub timestamp: Timestamp,
}

impl OrderBookDelta {
    pub fn new(instrument_id: impl Into<InstrumentId>, bids: Ladder, asks: Ladder, timestamp: Timestamp) -> Self {
        let instrument_id = instrument_id.into();
        Self { instrument_id, bids, asks, timestamp }
    }
}

/// Depth feed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthUpdate {
    Snapshot(OrderBookSnapshot),
    Delta(OrderBookDelta),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkPriceUpdate {
    pub instrument_id: InstrumentId,
    pub mark_price: Price,
    pub timestamp: DateTime<Utc>,
}

/// Venue price band: buy orders above `max_buy` or sell orders below `min_sell` are refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLimitUpdate {
    pub instrument_id: InstrumentId,
    pub max_buy: Price,
    pub min_sell: Price,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRateUpdate {
    pub instrument_id: InstrumentId,
    pub funding_rate: rust_decimal::Decimal,
    pub next_funding_rate: rust_decimal::Decimal,
    pub funding_time: DateTime<Utc>,
    /// Not every venue publishes this on the stream
    pub next_funding_time: Option<DateTime<Utc>>,
}

/// Public trade print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeUpdate {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Size,
    pub side: OrderSide,
    pub timestamp: DateTime<Utc>,
}

/// Limit order submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub instrument_id: InstrumentId,
    pub client_order_id: String,
    pub strategy_id: u32,
    pub side: OrderSide,
    pub price: Price,
    pub size: Size,
    pub make_only: bool,
    pub reduce_only: bool,
    pub position_side: Option<PositionSide>,
    pub trade_mode: Option<TradeMode>,
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrderRequest {
    pub instrument_id: InstrumentId,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
}

/// Synchronous venue acknowledgment of a place/cancel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time order state pushed (or queried) from the venue.
///
/// `cumulative_filled` and `average_price` are totals since order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub instrument_id: InstrumentId,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    /// Strategy tag decoded by the adapter; `None` when the venue order carries none
    pub strategy_id: Option<u32>,
    pub status: OrderStatus,
    pub cumulative_filled: Size,
    pub average_price: Price,
    pub update_time: DateTime<Utc>,
    /// Venue error/reject payload, if any
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub currency: String,
    pub available: rust_decimal::Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub instrument_id: InstrumentId,
    pub long: Size,
    pub short: Size,
}

/// Authoritative account state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balances: Vec<BalanceSnapshot>,
    pub positions: Vec<PositionSnapshot>,
    pub timestamp: DateTime<Utc>,
}
