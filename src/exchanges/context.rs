use crate::config::CoreConfig;
use crate::core::events::AccountSnapshot;
use crate::exchanges::error::ExchangeError;
use crate::ledger::{BalanceManager, PositionManager};
use crate::traits::ExchangeAdapter;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Process-scoped state for one exchange connection.
///
/// Construct it first, start the account sync, then create markets and
/// traders from it. Everything spawned from the context stops when
/// [`ExchangeContext::shutdown`] is called.
pub struct ExchangeContext {
    adapter: Arc<dyn ExchangeAdapter>,
    config: CoreConfig,
    connected: AtomicBool,
    balances: BalanceManager,
    positions: PositionManager,
    shutdown_tx: watch::Sender<bool>,
    log_prefix: String,
}

impl ExchangeContext {
    pub fn new(adapter: Arc<dyn ExchangeAdapter>, config: CoreConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let log_prefix = format!("[{}]", adapter.name());
        Arc::new(Self {
            adapter,
            config,
            connected: AtomicBool::new(false),
            balances: BalanceManager::new(),
            positions: PositionManager::new(),
            shutdown_tx,
            log_prefix,
        })
    }

    pub fn adapter(&self) -> &Arc<dyn ExchangeAdapter> {
        &self.adapter
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn balances(&self) -> &BalanceManager {
        &self.balances
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// Connectivity as reported by the transport layer
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            info!("{} connectivity changed: {}", self.log_prefix, connected);
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Push path for venues that stream account updates
    pub fn apply_account_snapshot(&self, snapshot: &AccountSnapshot) {
        self.balances.apply_account_snapshot(snapshot);
        self.positions.apply_account_snapshot(snapshot);
    }

    pub async fn sync_account(&self) -> Result<(), ExchangeError> {
        let snapshot = self.adapter.fetch_account().await?;
        self.apply_account_snapshot(&snapshot);
        Ok(())
    }

    /// Poll the account on the configured interval until shutdown
    pub fn start_account_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = self.clone();
        let mut shutdown = self.shutdown_signal();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ctx.config.account_poll_interval());
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = ctx.sync_account().await {
                            warn!("{} account sync failed: {}", ctx.log_prefix, e);
                        }
                    }
                }
            }
            info!("{} account sync stopped", ctx.log_prefix);
        })
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        info!("{} shutdown requested", self.log_prefix);
    }
}
