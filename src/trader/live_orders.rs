use crate::core::events::OrderSnapshot;
use crate::core::StopSignal;
use crate::oms::{client_id, Order, SnapshotRoute};
use log::{debug, error};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Live orders of one trader, keyed by client order id.
///
/// Snapshot dispatch holds the gate shared and a sweep holds it exclusive, so
/// the two never overlap. Insertion only takes the map lock, which lets an
/// observer place a follow-up order from inside a fill callback.
pub struct LiveOrders {
    strategy_id: u32,
    orders: RwLock<HashMap<String, Arc<Order>>>,
    gate: RwLock<()>,
    error_lock: AtomicBool,
    log_prefix: String,
}

impl LiveOrders {
    pub fn new(strategy_id: u32, log_prefix: impl Into<String>) -> Self {
        Self {
            strategy_id,
            orders: RwLock::new(HashMap::new()),
            gate: RwLock::new(()),
            error_lock: AtomicBool::new(false),
            log_prefix: log_prefix.into(),
        }
    }

    pub fn strategy_id(&self) -> u32 {
        self.strategy_id
    }

    /// Register an order. Takes only the map lock, never the gate.
    pub fn insert(&self, order: Arc<Order>) {
        self.orders
            .write()
            .insert(order.client_order_id().to_string(), order);
    }

    /// Look up a live order by client order id
    pub fn get(&self, client_order_id: &str) -> Option<Arc<Order>> {
        self.orders.read().get(client_order_id).cloned()
    }

    /// Snapshot of the live orders, in no particular order
    pub fn orders(&self) -> Vec<Arc<Order>> {
        self.orders.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// True once a foreign snapshot has been seen
    pub fn is_error_locked(&self) -> bool {
        self.error_lock.load(Ordering::Acquire)
    }

    /// Permanently disable order creation for this trader
    pub fn set_error_lock(&self, reason: &str) {
        self.error_lock.store(true, Ordering::Release);
        error!("{} error lock set: {}", self.log_prefix, reason);
    }

    /// Route a venue snapshot to its order. Unknown ids are dropped; a snapshot
    /// tagged with another strategy sets the error lock. Untagged snapshots are
    /// attributed by the strategy embedded in the client order id.
    pub fn route(&self, snapshot: &OrderSnapshot) {
        let tagged = snapshot
            .strategy_id
            .or_else(|| client_id::parse_strategy_id(&snapshot.client_order_id));
        if let Some(strategy_id) = tagged {
            if strategy_id > 0 && strategy_id != self.strategy_id {
                self.set_error_lock(&format!(
                    "order {} belongs to strategy {}, expected {}",
                    snapshot.client_order_id, strategy_id, self.strategy_id
                ));
                return;
            }
        }

        let _gate = self.gate.read();
        match self.get(&snapshot.client_order_id) {
            Some(order) => order.on_snapshot(snapshot),
            None => debug!(
                "{} snapshot for unknown order {}, dropped",
                self.log_prefix, snapshot.client_order_id
            ),
        }
    }

    /// Route for snapshots an order queries itself. Holds the map weakly since
    /// every order in it keeps a copy.
    pub fn snapshot_route(self: &Arc<Self>) -> SnapshotRoute {
        let live = Arc::downgrade(self);
        Arc::new(move |snapshot: &OrderSnapshot| match live.upgrade() {
            Some(live) => live.route(snapshot),
            None => debug!("snapshot for {} after trader dropped", snapshot.client_order_id),
        })
    }

    /// Drop every finished order; returns how many were removed
    pub fn sweep(&self) -> usize {
        let _gate = self.gate.write();
        let mut orders = self.orders.write();
        let before = orders.len();
        orders.retain(|_, order| !order.is_finished());
        before - orders.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, mut stop: StopSignal) -> JoinHandle<()> {
        let live = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop.stopped() => break,
                    _ = ticker.tick() => {
                        let removed = live.sweep();
                        if removed > 0 {
                            debug!("{} swept {} finished order(s)", live.log_prefix, removed);
                        }
                    }
                }
            }
            debug!("{} sweeper stopped", live.log_prefix);
        })
    }
}
