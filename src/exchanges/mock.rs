use crate::core::events::{
    AccountSnapshot, CancelOrderRequest, DepthUpdate, FundingRateUpdate, MarkPriceUpdate, OrderAck,
    OrderSnapshot, OrderStatus, PlaceOrderRequest, PriceLimitUpdate, TradeUpdate,
};
use crate::exchanges::error::ExchangeError;
use crate::traits::{ExchangeAdapter, FeedCallback, FeedKind, Subscription};
use crate::types::{InstrumentId, Price, Size};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Subscribers of one feed kind
struct FeedRegistry<T> {
    subscribers: Mutex<Vec<(u64, InstrumentId, FeedCallback<T>)>>,
}

impl<T: Clone> FeedRegistry<T> {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, id: u64, instrument_id: &InstrumentId, callback: FeedCallback<T>) {
        self.subscribers.lock().push((id, instrument_id.clone(), callback));
    }

    fn remove(&self, id: u64) {
        self.subscribers.lock().retain(|(sid, _, _)| *sid != id);
    }

    /// Callbacks run outside the registry lock so they may subscribe again
    fn push(&self, instrument_id: &InstrumentId, update: T) -> usize {
        let callbacks: Vec<FeedCallback<T>> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, iid, _)| iid == instrument_id)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for callback in &callbacks {
            callback(update.clone());
        }
        callbacks.len()
    }

    fn count(&self, instrument_id: &InstrumentId) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|(_, iid, _)| iid == instrument_id)
            .count()
    }
}

struct MockSubscription {
    kind: FeedKind,
    instrument_id: InstrumentId,
    resets: Arc<DashMap<(FeedKind, InstrumentId), usize>>,
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Subscription for MockSubscription {
    fn reset(&self) {
        *self
            .resets
            .entry((self.kind, self.instrument_id.clone()))
            .or_insert(0) += 1;
    }

    fn unsubscribe(&self) {
        (self.remove)();
    }
}

/// In-process exchange for tests and the mock session binary.
///
/// Feed messages and order snapshots are injected with the `push_*` methods;
/// every request the core sends is recorded for inspection.
pub struct MockExchange {
    name: String,
    next_id: AtomicU64,
    depth: Arc<FeedRegistry<DepthUpdate>>,
    mark_price: Arc<FeedRegistry<MarkPriceUpdate>>,
    price_limit: Arc<FeedRegistry<PriceLimitUpdate>>,
    funding_rate: Arc<FeedRegistry<FundingRateUpdate>>,
    trades: Arc<FeedRegistry<TradeUpdate>>,
    order_snapshots: Arc<FeedRegistry<OrderSnapshot>>,
    resets: Arc<DashMap<(FeedKind, InstrumentId), usize>>,
    placed: Mutex<Vec<PlaceOrderRequest>>,
    cancelled: Mutex<Vec<CancelOrderRequest>>,
    /// client order id -> exchange order id
    acks: DashMap<String, String>,
    /// Last snapshot pushed per client order id, served by `query_order`
    order_states: DashMap<String, OrderSnapshot>,
    place_error: Mutex<Option<ExchangeError>>,
    cancel_error: Mutex<Option<ExchangeError>>,
    rest_price_limits: DashMap<InstrumentId, PriceLimitUpdate>,
    rest_latency: Mutex<Duration>,
    account: Mutex<Option<AccountSnapshot>>,
}

impl MockExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            depth: Arc::new(FeedRegistry::new()),
            mark_price: Arc::new(FeedRegistry::new()),
            price_limit: Arc::new(FeedRegistry::new()),
            funding_rate: Arc::new(FeedRegistry::new()),
            trades: Arc::new(FeedRegistry::new()),
            order_snapshots: Arc::new(FeedRegistry::new()),
            resets: Arc::new(DashMap::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            acks: DashMap::new(),
            order_states: DashMap::new(),
            place_error: Mutex::new(None),
            cancel_error: Mutex::new(None),
            rest_price_limits: DashMap::new(),
            rest_latency: Mutex::new(Duration::ZERO),
            account: Mutex::new(None),
        }
    }

    fn subscribe<T: Clone + Send + 'static>(
        &self,
        kind: FeedKind,
        registry: &Arc<FeedRegistry<T>>,
        instrument_id: &InstrumentId,
        callback: FeedCallback<T>,
    ) -> Box<dyn Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        registry.add(id, instrument_id, callback);
        let registry = registry.clone();
        Box::new(MockSubscription {
            kind,
            instrument_id: instrument_id.clone(),
            resets: self.resets.clone(),
            remove: Box::new(move || registry.remove(id)),
        })
    }

    pub fn push_depth(&self, instrument_id: &InstrumentId, update: DepthUpdate) -> usize {
        self.depth.push(instrument_id, update)
    }

    pub fn push_mark_price(&self, update: MarkPriceUpdate) -> usize {
        self.mark_price.push(&update.instrument_id.clone(), update)
    }

    pub fn push_price_limit(&self, update: PriceLimitUpdate) -> usize {
        self.price_limit.push(&update.instrument_id.clone(), update)
    }

    pub fn push_funding_rate(&self, update: FundingRateUpdate) -> usize {
        self.funding_rate.push(&update.instrument_id.clone(), update)
    }

    pub fn push_trade(&self, update: TradeUpdate) -> usize {
        self.trades.push(&update.instrument_id.clone(), update)
    }

    pub fn push_order_snapshot(&self, snapshot: OrderSnapshot) -> usize {
        self.order_states
            .insert(snapshot.client_order_id.clone(), snapshot.clone());
        self.order_snapshots.push(&snapshot.instrument_id.clone(), snapshot)
    }

    /// Build a snapshot for an order previously placed through this exchange
    pub fn order_snapshot(
        &self,
        client_order_id: &str,
        status: OrderStatus,
        cumulative_filled: Size,
        average_price: Price,
    ) -> Option<OrderSnapshot> {
        let placed = self.placed.lock();
        let request = placed.iter().find(|r| r.client_order_id == client_order_id)?;
        Some(OrderSnapshot {
            instrument_id: request.instrument_id.clone(),
            client_order_id: client_order_id.to_string(),
            exchange_order_id: self.acks.get(client_order_id).map(|e| e.value().clone()),
            strategy_id: Some(request.strategy_id),
            status,
            cumulative_filled,
            average_price,
            update_time: Utc::now(),
            error: None,
        })
    }

    pub fn subscriber_count(&self, kind: FeedKind, instrument_id: &InstrumentId) -> usize {
        match kind {
            FeedKind::Depth => self.depth.count(instrument_id),
            FeedKind::MarkPrice => self.mark_price.count(instrument_id),
            FeedKind::PriceLimit => self.price_limit.count(instrument_id),
            FeedKind::FundingRate => self.funding_rate.count(instrument_id),
            FeedKind::Trades => self.trades.count(instrument_id),
            FeedKind::OrderSnapshots => self.order_snapshots.count(instrument_id),
        }
    }

    pub fn reset_count(&self, kind: FeedKind, instrument_id: &InstrumentId) -> usize {
        self.resets
            .get(&(kind, instrument_id.clone()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn placed_orders(&self) -> Vec<PlaceOrderRequest> {
        self.placed.lock().clone()
    }

    pub fn cancelled_orders(&self) -> Vec<CancelOrderRequest> {
        self.cancelled.lock().clone()
    }

    pub fn exchange_order_id(&self, client_order_id: &str) -> Option<String> {
        self.acks.get(client_order_id).map(|e| e.value().clone())
    }

    /// Fail every subsequent place request with `error` (or succeed again with `None`)
    pub fn set_place_error(&self, error: Option<ExchangeError>) {
        *self.place_error.lock() = error;
    }

    pub fn set_cancel_error(&self, error: Option<ExchangeError>) {
        *self.cancel_error.lock() = error;
    }

    pub fn set_rest_price_limit(&self, update: PriceLimitUpdate) {
        self.rest_price_limits.insert(update.instrument_id.clone(), update);
    }

    /// Delay every `fetch_price_limit` response by `latency`
    pub fn set_rest_latency(&self, latency: Duration) {
        *self.rest_latency.lock() = latency;
    }

    pub fn set_account(&self, snapshot: AccountSnapshot) {
        *self.account.lock() = Some(snapshot);
    }

    fn ack(&self, client_order_id: &str) -> OrderAck {
        let exchange_order_id = self
            .acks
            .entry(client_order_id.to_string())
            .or_insert_with(|| format!("mock-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
            .clone();
        OrderAck {
            client_order_id: client_order_id.to_string(),
            exchange_order_id,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe_depth(&self, instrument_id: &InstrumentId, callback: FeedCallback<DepthUpdate>) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::Depth, &self.depth, instrument_id, callback)
    }

    fn subscribe_mark_price(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<MarkPriceUpdate>,
    ) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::MarkPrice, &self.mark_price, instrument_id, callback)
    }

    fn subscribe_price_limit(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<PriceLimitUpdate>,
    ) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::PriceLimit, &self.price_limit, instrument_id, callback)
    }

    fn subscribe_funding_rate(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<FundingRateUpdate>,
    ) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::FundingRate, &self.funding_rate, instrument_id, callback)
    }

    fn subscribe_trades(&self, instrument_id: &InstrumentId, callback: FeedCallback<TradeUpdate>) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::Trades, &self.trades, instrument_id, callback)
    }

    fn subscribe_order_snapshots(
        &self,
        instrument_id: &InstrumentId,
        callback: FeedCallback<OrderSnapshot>,
    ) -> Box<dyn Subscription> {
        self.subscribe(FeedKind::OrderSnapshots, &self.order_snapshots, instrument_id, callback)
    }

    async fn fetch_price_limit(&self, instrument_id: &InstrumentId) -> Result<PriceLimitUpdate, ExchangeError> {
        let latency = *self.rest_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.rest_price_limits
            .get(instrument_id)
            .map(|p| {
                let mut update = p.value().clone();
                update.timestamp = Utc::now();
                update
            })
            .ok_or_else(|| ExchangeError::Unavailable(format!("no price limit for {}", instrument_id)))
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        let client_order_id = request.client_order_id.clone();
        self.placed.lock().push(request);
        if let Some(error) = self.place_error.lock().clone() {
            return Err(error);
        }
        Ok(self.ack(&client_order_id))
    }

    async fn cancel_order(&self, request: CancelOrderRequest) -> Result<OrderAck, ExchangeError> {
        let client_order_id = request.client_order_id.clone();
        self.cancelled.lock().push(request);
        if let Some(error) = self.cancel_error.lock().clone() {
            return Err(error);
        }
        Ok(self.ack(&client_order_id))
    }

    async fn query_order(&self, _instrument_id: &InstrumentId, client_order_id: &str) -> Result<OrderSnapshot, ExchangeError> {
        self.order_states
            .get(client_order_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(client_order_id.to_string()))
    }

    async fn fetch_account(&self) -> Result<AccountSnapshot, ExchangeError> {
        let mut snapshot = self
            .account
            .lock()
            .clone()
            .ok_or_else(|| ExchangeError::Unavailable("account snapshot not configured".to_string()))?;
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}
