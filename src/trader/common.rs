use super::live_orders::LiveOrders;
use crate::core::events::OrderSnapshot;
use crate::core::StopSignal;
use crate::exchanges::ExchangeContext;
use crate::oms::{Order, OrderHooks, OrderObserver, OrderParams, PriceRange};
use crate::traits::Subscription;
use crate::types::InstrumentId;
use log::{info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Plumbing shared by the spot and contract traders: the live-order map, the
/// order-snapshot subscription feeding it, and the sweeper task.
pub struct TraderCore {
    ctx: Arc<ExchangeContext>,
    instrument_id: InstrumentId,
    orders: Arc<LiveOrders>,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    log_prefix: String,
}

impl TraderCore {
    /// Subscribe order snapshots and start the sweeper. Must be called inside a tokio runtime.
    pub(crate) fn new(ctx: Arc<ExchangeContext>, instrument_id: InstrumentId, strategy_id: u32) -> Self {
        let log_prefix = format!("[{}-Trader-{}]", ctx.name(), instrument_id);
        let orders = Arc::new(LiveOrders::new(strategy_id, log_prefix.clone()));

        let routed = orders.clone();
        let subscription = ctx.adapter().subscribe_order_snapshots(
            &instrument_id,
            Arc::new(move |snapshot: OrderSnapshot| routed.route(&snapshot)),
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = orders.spawn_sweeper(
            ctx.config().sweep_interval(),
            StopSignal::new(ctx.shutdown_signal(), stop_rx),
        );

        Self {
            ctx,
            instrument_id,
            orders,
            subscription: Mutex::new(Some(subscription)),
            sweeper: Mutex::new(Some(sweeper)),
            stop_tx,
            log_prefix,
        }
    }

    pub fn ctx(&self) -> &Arc<ExchangeContext> {
        &self.ctx
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn strategy_id(&self) -> u32 {
        self.orders.strategy_id()
    }

    pub fn live_orders(&self) -> &Arc<LiveOrders> {
        &self.orders
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    pub fn is_error_locked(&self) -> bool {
        self.orders.is_error_locked()
    }

    /// Connected and not error-locked
    pub(crate) fn gate_ready(&self) -> bool {
        self.ctx.is_connected() && !self.orders.is_error_locked()
    }

    /// Log why no order is made and back off for the configured pause
    pub(crate) async fn refuse(&self, reason: &str) {
        info!("{} trader not ready, can't make order. reason={}", self.log_prefix, reason);
        tokio::time::sleep(self.ctx.config().unready_pause()).await;
    }

    /// Build, register and submit an order. The reconciler observes before the caller.
    pub(crate) fn submit(
        &self,
        params: OrderParams,
        hooks: OrderHooks,
        price_range: PriceRange,
        reconciler: Arc<dyn OrderObserver>,
        observer: Option<Arc<dyn OrderObserver>>,
    ) -> Option<Arc<Order>> {
        let order = match Order::new(params, hooks, self.ctx.adapter().clone(), price_range) {
            Ok(order) => order,
            Err(e) => {
                warn!("{} order rejected locally: {}", self.log_prefix, e);
                return None;
            }
        };

        self.orders.insert(order.clone());
        order.set_route(self.orders.snapshot_route());
        order.add_observer(reconciler);
        if let Some(observer) = observer {
            order.add_observer(observer);
        }
        order.go();
        Some(order)
    }

    pub(crate) fn uninit(&self) {
        self.stop_tx.send_replace(true);
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        // The sweeper exits on the stop signal; drop the handle without aborting
        self.sweeper.lock().take();
        info!("{} trader uninited", self.log_prefix);
    }

    pub fn is_uninited(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// `"{n} alive orders:"` followed by one line per order
    pub(crate) fn fmt_orders(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut orders = self.orders.orders();
        orders.sort_by_key(|o| o.created_at());
        write!(f, "{} alive orders:", orders.len())?;
        for order in orders {
            write!(f, "\n{}", order)?;
        }
        Ok(())
    }
}
