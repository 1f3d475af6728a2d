use super::client_id;
use super::hooks::OrderHooks;
use super::observer::OrderObserver;
use crate::core::events::{
    CancelOrderRequest, OrderSide, OrderSnapshot, OrderStatus, PlaceOrderRequest, PositionSide, TradeMode,
};
use crate::exchanges::ExchangeError;
use crate::traits::ExchangeAdapter;
use crate::types::{InstrumentId, Price, Size};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Local order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderState {
    Created,
    Submitting,
    Live,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Cancelled | OrderState::Rejected)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderState::Created => "created",
            OrderState::Submitting => "submitting",
            OrderState::Live => "live",
            OrderState::PartiallyFilled => "partially_filled",
            OrderState::Filled => "filled",
            OrderState::Cancelled => "cancelled",
            OrderState::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

/// Order validation failure; nothing is sent to the venue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order size must be positive, got {0}")]
    InvalidSize(Size),

    #[error("price {price} outside allowed range [{min}, {max}]")]
    InvalidPrice { price: Price, min: Price, max: Price },
}

/// Inclusive price band a trader accepts for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Price,
    pub max: Price,
}

impl PriceRange {
    pub fn new(min: Price, max: Price) -> Self {
        Self { min, max }
    }

    /// `(0, i32::MAX]`, the band used when the venue imposes none
    pub fn unbounded() -> Self {
        Self {
            min: Price::ZERO,
            max: Price::new(Decimal::from(i32::MAX)),
        }
    }

    pub fn contains(&self, price: Price) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Caller-supplied order parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParams {
    pub instrument_id: InstrumentId,
    pub strategy_id: u32,
    pub price: Price,
    pub size: Size,
    pub side: OrderSide,
    pub make_only: bool,
    pub reduce_only: bool,
    /// Free-form tag for the strategy's own bookkeeping
    pub purpose: String,
}

/// One fill, derived from the growth of the cumulative filled amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub client_order_id: String,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub position_side: Option<PositionSide>,
    pub amount: Size,
    pub price: Price,
    pub time: DateTime<Utc>,
}

/// Dispatch path for snapshots the order fetches itself, so they are applied
/// under the same serialization as streamed ones
pub type SnapshotRoute = Arc<dyn Fn(&OrderSnapshot) + Send + Sync>;

#[derive(Debug)]
struct OrderInner {
    state: OrderState,
    exchange_order_id: Option<String>,
    position_side: Option<PositionSide>,
    trade_mode: Option<TradeMode>,
    filled: Size,
    avg_price: Price,
    updated_at: DateTime<Utc>,
    deals: Vec<Deal>,
    error: Option<String>,
}

/// Single limit order and its state machine.
///
/// Venue updates enter only through [`Order::on_snapshot`] (and the place
/// acknowledgment). Each update is applied under the order's lock, then the
/// resulting deal and transition are fanned out to the observers with the
/// lock released.
pub struct Order {
    client_order_id: String,
    params: OrderParams,
    hooks: OrderHooks,
    created_at: DateTime<Utc>,
    adapter: Arc<dyn ExchangeAdapter>,
    inner: Mutex<OrderInner>,
    observers: Mutex<Vec<Arc<dyn OrderObserver>>>,
    route: Mutex<Option<SnapshotRoute>>,
    /// Held while observers run so callbacks for one order never interleave
    dispatch: Mutex<()>,
    finished: AtomicBool,
    log_prefix: String,
}

impl Order {
    /// Validate `params` and assign a fresh client order id
    pub fn new(
        params: OrderParams,
        hooks: OrderHooks,
        adapter: Arc<dyn ExchangeAdapter>,
        price_range: PriceRange,
    ) -> Result<Arc<Self>, OrderError> {
        if !params.size.is_positive() {
            return Err(OrderError::InvalidSize(params.size));
        }
        if !params.price.is_positive() || !price_range.contains(params.price) {
            return Err(OrderError::InvalidPrice {
                price: params.price,
                min: price_range.min,
                max: price_range.max,
            });
        }

        let client_order_id = client_id::generate(params.strategy_id);
        let log_prefix = format!("[{}-{}]", adapter.name(), client_order_id);
        let now = Utc::now();
        Ok(Arc::new(Self {
            client_order_id,
            params,
            hooks,
            created_at: now,
            adapter,
            inner: Mutex::new(OrderInner {
                state: OrderState::Created,
                exchange_order_id: None,
                position_side: None,
                trade_mode: None,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                updated_at: now,
                deals: Vec::new(),
                error: None,
            }),
            observers: Mutex::new(Vec::new()),
            route: Mutex::new(None),
            dispatch: Mutex::new(()),
            finished: AtomicBool::new(false),
            log_prefix,
        }))
    }

    /// Client order id, tagged with the owning strategy
    pub fn client_order_id(&self) -> &str {
        &self.client_order_id
    }

    /// Venue order id, known after the ack or the first snapshot carrying it
    pub fn exchange_order_id(&self) -> Option<String> {
        self.inner.lock().exchange_order_id.clone()
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.params.instrument_id
    }

    pub fn strategy_id(&self) -> u32 {
        self.params.strategy_id
    }

    pub fn side(&self) -> OrderSide {
        self.params.side
    }

    pub fn price(&self) -> Price {
        self.params.price
    }

    pub fn size(&self) -> Size {
        self.params.size
    }

    pub fn make_only(&self) -> bool {
        self.params.make_only
    }

    pub fn reduce_only(&self) -> bool {
        self.params.reduce_only
    }

    pub fn purpose(&self) -> &str {
        &self.params.purpose
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle state
    pub fn state(&self) -> OrderState {
        self.inner.lock().state
    }

    /// Cumulative filled amount
    pub fn filled(&self) -> Size {
        self.inner.lock().filled
    }

    /// Size still open, never negative
    pub fn remaining(&self) -> Size {
        let filled = self.inner.lock().filled;
        if filled >= self.params.size {
            Size::ZERO
        } else {
            self.params.size - filled
        }
    }

    /// Average fill price; zero before the first fill
    pub fn avg_price(&self) -> Price {
        self.inner.lock().avg_price
    }

    /// Position side chosen by the hooks at submission
    pub fn position_side(&self) -> Option<PositionSide> {
        self.inner.lock().position_side
    }

    /// Time of the last venue update applied
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().updated_at
    }

    /// Every deal emitted so far, oldest first
    pub fn deals(&self) -> Vec<Deal> {
        self.inner.lock().deals.clone()
    }

    /// Venue error payload from a reject or failed cancel
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// Terminal and every observer has seen the final transition
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Observers are called in the order they were added
    pub fn add_observer(&self, observer: Arc<dyn OrderObserver>) {
        self.observers.lock().push(observer);
    }

    /// Send queried snapshots through `route` instead of applying them directly
    pub fn set_route(&self, route: SnapshotRoute) {
        *self.route.lock() = Some(route);
    }

    /// Submit asynchronously; returns once the request task is spawned
    pub fn go(self: &Arc<Self>) -> bool {
        let request = {
            let mut inner = self.inner.lock();
            if inner.state != OrderState::Created {
                warn!("{} go() in state {}, ignored", self.log_prefix, inner.state);
                return false;
            }
            inner.state = OrderState::Submitting;
            inner.position_side =
                self.hooks
                    .position_side(self.params.side, self.params.size, self.params.reduce_only);
            inner.trade_mode = self.hooks.trade_mode();
            PlaceOrderRequest {
                instrument_id: self.params.instrument_id.clone(),
                client_order_id: self.client_order_id.clone(),
                strategy_id: self.params.strategy_id,
                side: self.params.side,
                price: self.params.price,
                size: self.params.size,
                make_only: self.params.make_only,
                reduce_only: self.params.reduce_only,
                position_side: inner.position_side,
                trade_mode: inner.trade_mode,
                purpose: self.params.purpose.clone(),
            }
        };
        self.notify_state(OrderState::Created, OrderState::Submitting);
        info!(
            "{} submitting {} {}@{} ({})",
            self.log_prefix, self.params.side, self.params.size, self.params.price, self.params.purpose
        );

        let order = self.clone();
        tokio::spawn(async move {
            match order.adapter.place_order(request).await {
                Ok(ack) => order.on_ack(ack.exchange_order_id),
                Err(e) => {
                    if order.on_place_error(e) {
                        if let Err(e) = order.refresh().await {
                            warn!("{} refresh after failed place: {}", order.log_prefix, e);
                        }
                    }
                }
            }
        });
        true
    }

    fn on_ack(&self, exchange_order_id: String) {
        let _dispatch = self.dispatch.lock();
        let transition = {
            let mut inner = self.inner.lock();
            inner.exchange_order_id.get_or_insert(exchange_order_id);
            // A snapshot may already have moved the order on
            if inner.state == OrderState::Submitting {
                inner.state = OrderState::Live;
                inner.updated_at = Utc::now();
                Some((OrderState::Submitting, OrderState::Live))
            } else {
                None
            }
        };
        if let Some((from, to)) = transition {
            self.notify_state(from, to);
        }
    }

    /// Reject the order while it is still `Submitting`. Once a snapshot has shown
    /// the venue holding it, the error is only attached; returns true when the
    /// caller should re-query the order.
    fn on_place_error(&self, error: ExchangeError) -> bool {
        warn!("{} place failed: {}", self.log_prefix, error);
        let _dispatch = self.dispatch.lock();
        {
            let mut inner = self.inner.lock();
            let state = inner.state;
            match state {
                OrderState::Submitting => {
                    inner.state = OrderState::Rejected;
                    inner.error = Some(error.to_string());
                    inner.updated_at = Utc::now();
                }
                _ if state.is_terminal() => return false,
                _ => {
                    inner.error = Some(error.to_string());
                    return true;
                }
            }
        }
        self.notify_state(OrderState::Submitting, OrderState::Rejected);
        self.finished.store(true, Ordering::Release);
        false
    }

    /// Apply a venue snapshot. The only entry point for fills and venue-driven transitions.
    pub(crate) fn on_snapshot(&self, snapshot: &OrderSnapshot) {
        let _dispatch = self.dispatch.lock();
        let (deal, transition) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                debug!(
                    "{} snapshot {:?} after terminal state {}, ignored",
                    self.log_prefix, snapshot.status, inner.state
                );
                return;
            }
            if let Some(exchange_order_id) = &snapshot.exchange_order_id {
                if inner.exchange_order_id.is_none() {
                    inner.exchange_order_id = Some(exchange_order_id.clone());
                }
            }

            let deal = if snapshot.cumulative_filled > inner.filled {
                let delta = snapshot.cumulative_filled - inner.filled;
                let price = self.deal_price(&inner, snapshot, delta);
                let deal = Deal {
                    client_order_id: self.client_order_id.clone(),
                    instrument_id: self.params.instrument_id.clone(),
                    side: self.params.side,
                    position_side: inner.position_side,
                    amount: delta,
                    price,
                    time: snapshot.update_time,
                };
                inner.avg_price = if snapshot.average_price.is_positive() {
                    snapshot.average_price
                } else {
                    let cost = inner.avg_price.value() * inner.filled.value() + price.value() * delta.value();
                    Price::new(cost / snapshot.cumulative_filled.value())
                };
                inner.filled = snapshot.cumulative_filled;
                inner.deals.push(deal.clone());
                Some(deal)
            } else {
                if snapshot.cumulative_filled < inner.filled {
                    warn!(
                        "{} cumulative fill went down {} -> {}, ignored",
                        self.log_prefix, inner.filled, snapshot.cumulative_filled
                    );
                }
                None
            };

            if let Some(error) = &snapshot.error {
                inner.error = Some(error.clone());
            }
            inner.updated_at = snapshot.update_time;

            let from = inner.state;
            let to = Self::map_status(snapshot.status, inner.filled);
            if to != from {
                inner.state = to;
            }
            (deal, (to != from).then_some((from, to)))
        };

        let observers = self.observers.lock().clone();
        if let Some(deal) = &deal {
            debug!("{} deal {}@{}", self.log_prefix, deal.amount, deal.price);
            for observer in &observers {
                observer.on_deal(self, deal);
            }
        }
        if let Some((from, to)) = transition {
            for observer in &observers {
                observer.on_state_changed(self, from, to);
            }
            if to.is_terminal() {
                info!("{} {} (filled {}/{})", self.log_prefix, to, self.filled(), self.params.size);
                self.finished.store(true, Ordering::Release);
            }
        }
    }

    /// Price of the newly filled `delta`, recovered from the change in total cost.
    /// Falls back to the reported average, then the order price.
    fn deal_price(&self, inner: &OrderInner, snapshot: &OrderSnapshot, delta: Size) -> Price {
        if snapshot.average_price.is_positive() {
            let new_cost = snapshot.average_price.value() * snapshot.cumulative_filled.value();
            let old_cost = inner.avg_price.value() * inner.filled.value();
            let price = (new_cost - old_cost) / delta.value();
            if price > Decimal::ZERO {
                return Price::new(price);
            }
            return snapshot.average_price;
        }
        self.params.price
    }

    fn map_status(status: OrderStatus, filled: Size) -> OrderState {
        match status {
            OrderStatus::New if filled.is_positive() => OrderState::PartiallyFilled,
            OrderStatus::New => OrderState::Live,
            OrderStatus::PartiallyFilled => OrderState::PartiallyFilled,
            OrderStatus::Filled => OrderState::Filled,
            OrderStatus::Cancelled | OrderStatus::Expired => OrderState::Cancelled,
            OrderStatus::Rejected => OrderState::Rejected,
        }
    }

    fn notify_state(&self, from: OrderState, to: OrderState) {
        let observers = self.observers.lock().clone();
        for observer in &observers {
            observer.on_state_changed(self, from, to);
        }
    }

    /// Request cancellation. The terminal state arrives later via snapshot; on
    /// failure the venue error is attached and the order re-queried.
    pub fn cancel(self: &Arc<Self>) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        let request = CancelOrderRequest {
            instrument_id: self.params.instrument_id.clone(),
            client_order_id: self.client_order_id.clone(),
            exchange_order_id: self.exchange_order_id(),
        };
        let order = self.clone();
        tokio::spawn(async move {
            match order.adapter.cancel_order(request).await {
                Ok(_) => debug!("{} cancel accepted", order.log_prefix),
                Err(e) => {
                    warn!("{} cancel failed: {}", order.log_prefix, e);
                    order.inner.lock().error = Some(e.to_string());
                    if let Err(e) = order.refresh().await {
                        warn!("{} refresh after failed cancel: {}", order.log_prefix, e);
                    }
                }
            }
        });
        true
    }

    /// Query the venue and apply the result as a snapshot, through the route when one is set
    pub async fn refresh(&self) -> Result<(), ExchangeError> {
        let snapshot = self
            .adapter
            .query_order(&self.params.instrument_id, &self.client_order_id)
            .await?;
        let route = self.route.lock().clone();
        match route {
            Some(route) => route(&snapshot),
            None => self.on_snapshot(&snapshot),
        }
        Ok(())
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        write!(
            f,
            "{} {} {} {}@{} filled={} avg={} state={} purpose={}",
            self.client_order_id,
            self.params.instrument_id,
            self.params.side,
            self.params.size,
            self.params.price,
            inner.filled,
            inner.avg_price,
            inner.state,
            self.params.purpose
        )?;
        if let Some(error) = &inner.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("client_order_id", &self.client_order_id)
            .field("params", &self.params)
            .field("state", &self.state())
            .finish()
    }
}
