use crate::core::events::{
    AccountSnapshot, CancelOrderRequest, DepthUpdate, FundingRateUpdate, MarkPriceUpdate, OrderAck,
    OrderSnapshot, PlaceOrderRequest, PriceLimitUpdate, TradeUpdate,
};
use crate::exchanges::error::ExchangeError;
use crate::types::InstrumentId;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Callback invoked by an adapter for every normalized feed message
pub type FeedCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Streaming channels an adapter can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Depth,
    MarkPrice,
    PriceLimit,
    FundingRate,
    Trades,
    OrderSnapshots,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedKind::Depth => "depth",
            FeedKind::MarkPrice => "mark price",
            FeedKind::PriceLimit => "price limit",
            FeedKind::FundingRate => "funding rate",
            FeedKind::Trades => "trades",
            FeedKind::OrderSnapshots => "order snapshots",
        };
        write!(f, "{}", name)
    }
}

/// Handle to a live stream subscription
pub trait Subscription: Send + Sync {
    /// Drop and re-establish the channel
    fn reset(&self);

    /// Stop delivering callbacks
    fn unsubscribe(&self);
}

/// Uniform interface over one venue's REST and streaming APIs.
///
/// Implementations own transport, signing and wire parsing, and deliver only
/// the normalized shapes from `core::events`. Subscriptions are registered
/// synchronously; the callbacks fire from the adapter's own tasks.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Venue name, used as a log prefix
    fn name(&self) -> &str;

    fn subscribe_depth(&self, instrument_id: &InstrumentId, callback: FeedCallback<DepthUpdate>) -> Box<dyn Subscription>;

    fn subscribe_mark_price(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<MarkPriceUpdate>,
    ) -> Box<dyn Subscription>;

    fn subscribe_price_limit(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<PriceLimitUpdate>,
    ) -> Box<dyn Subscription>;

    fn subscribe_funding_rate(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<FundingRateUpdate>,
    ) -> Box<dyn Subscription>;

    fn subscribe_trades(&self, instrument_id: &InstrumentId, callback: FeedCallback<TradeUpdate>) -> Box<dyn Subscription>;

    /// Private order channel, filtered to one instrument
    fn subscribe_order_snapshots(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<OrderSnapshot>,
    ) -> Box<dyn Subscription>;

    /// REST fallback for the price-limit channel
    async fn fetch_price_limit(&self, instrument_id: &InstrumentId) -> Result<PriceLimitUpdate, ExchangeError>;

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, request: CancelOrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn query_order(&self, instrument_id: &InstrumentId, client_order_id: &str) -> Result<OrderSnapshot, ExchangeError>;

    /// Authoritative balances and positions
    async fn fetch_account(&self) -> Result<AccountSnapshot, ExchangeError>;
}
