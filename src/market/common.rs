use super::feed::{spawn_staleness_watchdog, Feed, FeedFlags, FlagSnapshot};
use crate::core::events::{DepthUpdate, OrderSide, TradeUpdate};
use crate::core::StopSignal;
use crate::exchanges::ExchangeContext;
use crate::orderbook::OrderBook;
use crate::traits::Subscription;
use crate::types::{Instrument, InstrumentId, Price, Size};
use log::{debug, info};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// State shared by spot and derivative markets: the book, the last trade and
/// the freshness flags, plus the subscriptions and watchdogs feeding them.
pub struct MarketCore {
    instrument: Instrument,
    ctx: Arc<ExchangeContext>,
    book: RwLock<OrderBook>,
    last_trade: RwLock<Option<Price>>,
    flags: Arc<FeedFlags>,
    subscriptions: Mutex<Vec<Arc<dyn Subscription>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    log_prefix: String,
}

/// Implemented by concrete markets so feed callbacks can reach their core through a `Weak`
pub(crate) trait HasCore: Send + Sync + 'static {
    fn core(&self) -> &MarketCore;
}

impl MarketCore {
    pub(crate) fn new(ctx: Arc<ExchangeContext>, instrument: Instrument) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let log_prefix = format!("[{}-{}]", ctx.name(), instrument.id);
        Self {
            book: RwLock::new(OrderBook::new(instrument.id.clone())),
            instrument,
            ctx,
            last_trade: RwLock::new(None),
            flags: Arc::new(FeedFlags::new()),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            stop_tx,
            log_prefix,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument.id
    }

    pub(crate) fn ctx(&self) -> &Arc<ExchangeContext> {
        &self.ctx
    }

    pub fn flags(&self) -> &Arc<FeedFlags> {
        &self.flags
    }

    pub fn flag_snapshot(&self) -> FlagSnapshot {
        self.flags.snapshot()
    }

    pub(crate) fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    pub(crate) fn stop_signal(&self) -> StopSignal {
        StopSignal::new(self.ctx.shutdown_signal(), self.stop_tx.subscribe())
    }

    pub fn order_book(&self) -> RwLockReadGuard<'_, OrderBook> {
        self.book.read()
    }

    /// Last trade print, falling back to the book mid
    pub fn latest_price(&self) -> Option<Price> {
        let last = *self.last_trade.read();
        last.or_else(|| self.book.read().mid_price())
    }

    pub(crate) fn on_depth(&self, update: DepthUpdate) {
        let mut book = self.book.write();
        match update {
            DepthUpdate::Snapshot(snapshot) => {
                book.apply_snapshot(snapshot);
                drop(book);
                self.flags.mark_fresh(Feed::Depth);
            }
            DepthUpdate::Delta(delta) => {
                book.apply_delta(delta);
                drop(book);
                // A delta only keeps an already synced book fresh
                if self.flags.get(Feed::Depth) {
                    self.flags.mark_fresh(Feed::Depth);
                } else {
                    debug!("{} depth delta before snapshot", self.log_prefix);
                }
            }
        }
    }

    pub(crate) fn on_trade(&self, update: TradeUpdate) {
        *self.last_trade.write() = Some(update.price);
    }

    /// Buy prices round down and sell prices round up to the tick. Maker-only
    /// prices are additionally kept one tick behind the opposite touch.
    pub fn align_price(&self, price: Price, side: OrderSide, make_only: bool) -> Price {
        let tick = self.instrument.tick_size;
        let mut aligned = match side {
            OrderSide::Buy => price.align_down(tick),
            OrderSide::Sell => price.align_up(tick),
        };

        if make_only {
            let book = self.book.read();
            match side {
                OrderSide::Buy => {
                    if let Some((ask, _)) = book.best_ask() {
                        let cap = ask.offset_ticks(tick, -1);
                        if aligned > cap {
                            aligned = cap;
                        }
                    }
                }
                OrderSide::Sell => {
                    if let Some((bid, _)) = book.best_bid() {
                        let floor = bid.offset_ticks(tick, 1);
                        if aligned < floor {
                            aligned = floor;
                        }
                    }
                }
            }
        }
        aligned
    }

    pub fn align_size(&self, size: Size) -> Size {
        size.align_down(self.instrument.lot_size)
    }

    pub(crate) fn add_subscription(&self, subscription: Arc<dyn Subscription>) {
        self.subscriptions.lock().push(subscription);
    }

    pub(crate) fn add_task(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    pub(crate) fn watch_feed(&self, feed: Feed, timeout: Duration, subscription: Arc<dyn Subscription>) {
        let task = spawn_staleness_watchdog(
            feed,
            timeout,
            self.flags.clone(),
            subscription,
            self.stop_signal(),
            self.log_prefix.clone(),
        );
        self.add_task(task);
    }

    /// Subscribe depth and trades, the feeds every product needs
    pub(crate) fn subscribe_common<M: HasCore>(market: &Arc<M>) {
        let core = market.core();
        let adapter = core.ctx.adapter().clone();
        let id = core.instrument.id.clone();

        let weak: Weak<M> = Arc::downgrade(market);
        let depth: Arc<dyn Subscription> = Arc::from(adapter.subscribe_depth(
            &id,
            Arc::new(move |update: DepthUpdate| {
                if let Some(market) = weak.upgrade() {
                    market.core().on_depth(update);
                }
            }),
        ));
        core.add_subscription(depth.clone());
        core.watch_feed(Feed::Depth, core.ctx.config().feeds.depth(), depth);

        let weak: Weak<M> = Arc::downgrade(market);
        let trades: Arc<dyn Subscription> = Arc::from(adapter.subscribe_trades(
            &id,
            Arc::new(move |update: TradeUpdate| {
                if let Some(market) = weak.upgrade() {
                    market.core().on_trade(update);
                }
            }),
        ));
        core.add_subscription(trades);
    }

    /// Unsubscribe every feed and stop the watchdogs
    pub(crate) fn uninit(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        self.stop_tx.send_replace(true);
        self.tasks.lock().clear();
        for feed in Feed::ALL {
            self.flags.set(feed, false);
        }
        info!("{} market uninited", self.log_prefix);
    }

    pub fn is_uninited(&self) -> bool {
        *self.stop_tx.borrow()
    }
}
