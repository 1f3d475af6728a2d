use super::common::TraderCore;
use crate::core::events::{OrderSide, PositionMode};
use crate::exchanges::ExchangeContext;
use crate::ledger::{Balance, Position};
use crate::market::{DerivativeMarket, FutureMarket, Market};
use crate::oms::{Deal, Order, OrderHooks, OrderObserver, OrderParams, PriceRange};
use crate::types::{Price, Size};
use log::info;
use std::fmt;
use std::sync::Arc;

struct ContractDealReconciler {
    position: Arc<Position>,
}

impl OrderObserver for ContractDealReconciler {
    fn on_deal(&self, _order: &Order, deal: &Deal) {
        self.position
            .apply_deal(deal.side, deal.amount, deal.position_side, deal.time);
    }
}

/// Places and tracks orders for one strategy on one futures or swap instrument.
///
/// Fills move the instrument's [`Position`]; margin is left to the account
/// snapshot. In long/short position mode every order names the leg it
/// opens or closes.
pub struct ContractTrader {
    core: TraderCore,
    market: Arc<FutureMarket>,
    settle: Arc<Balance>,
    position: Arc<Position>,
    hooks: OrderHooks,
    reconciler: Arc<ContractDealReconciler>,
}

impl ContractTrader {
    /// Must be called inside a tokio runtime
    pub fn new(ctx: &Arc<ExchangeContext>, strategy_id: u32, market: Arc<FutureMarket>) -> Arc<Self> {
        let instrument_id = market.instrument().id.clone();
        let settle = ctx.balances().find_balance(market.settle_currency());
        let position = ctx.positions().find_position(&instrument_id);

        let config = ctx.config();
        let mut hooks = OrderHooks::new().with_trade_mode(config.contract_trade_mode);
        if config.position_mode == PositionMode::LongShort {
            hooks = hooks.with_position_side(OrderHooks::hedge_mode(position.clone()));
        }

        let core = TraderCore::new(ctx.clone(), instrument_id, strategy_id);
        info!(
            "{} contract trader inited, strategy {} ({:?}, {:?})",
            core.log_prefix(),
            strategy_id,
            config.position_mode,
            config.contract_trade_mode
        );
        Arc::new(Self {
            core,
            market,
            settle,
            reconciler: Arc::new(ContractDealReconciler {
                position: position.clone(),
            }),
            position,
            hooks,
        })
    }

    pub fn core(&self) -> &TraderCore {
        &self.core
    }

    pub fn market(&self) -> &Arc<FutureMarket> {
        &self.market
    }

    pub fn strategy_id(&self) -> u32 {
        self.core.strategy_id()
    }

    pub fn ready(&self) -> bool {
        self.market.ready() && self.settle.ready().0 && self.position.ready().0 && self.core.gate_ready()
    }

    pub fn unready_reason(&self) -> String {
        if self.core.is_error_locked() {
            return "error locked".to_string();
        }
        if !self.market.ready() {
            return self.market.unready_reason();
        }
        let (ok, reason) = self.settle.ready();
        if !ok {
            return format!("settle balance({}) not ready: {}", self.settle.currency(), reason);
        }
        let (ok, reason) = self.position.ready();
        if !ok {
            return format!("position not ready: {}", reason);
        }
        if !self.core.ctx().is_connected() {
            return "exchange not ready".to_string();
        }
        String::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn make_order(
        &self,
        price: Price,
        size: Size,
        side: OrderSide,
        make_only: bool,
        reduce_only: bool,
        purpose: &str,
        observer: Option<Arc<dyn OrderObserver>>,
    ) -> Option<Arc<Order>> {
        if !self.ready() {
            self.core.refuse(&self.unready_reason()).await;
            return None;
        }

        let params = OrderParams {
            instrument_id: self.core.instrument_id().clone(),
            strategy_id: self.core.strategy_id(),
            price,
            size,
            side,
            make_only,
            reduce_only,
            purpose: purpose.to_string(),
        };
        let range = match side {
            OrderSide::Buy => self.buy_price_range(),
            OrderSide::Sell => self.sell_price_range(),
        };
        self.core
            .submit(params, self.hooks.clone(), range, self.reconciler.clone(), observer)
    }

    pub fn orders(&self) -> Vec<Arc<Order>> {
        self.core.live_orders().orders()
    }

    pub fn settle_balance(&self) -> &Arc<Balance> {
        &self.settle
    }

    pub fn position(&self) -> &Arc<Position> {
        &self.position
    }

    /// Up to the venue's current max buy price once published
    pub fn buy_price_range(&self) -> PriceRange {
        let unbounded = PriceRange::unbounded();
        match self.market.price_limits() {
            Some((max_buy, _)) if max_buy.is_positive() => PriceRange::new(unbounded.min, max_buy),
            _ => unbounded,
        }
    }

    /// From the venue's current min sell price once published
    pub fn sell_price_range(&self) -> PriceRange {
        let unbounded = PriceRange::unbounded();
        match self.market.price_limits() {
            Some((_, min_sell)) if min_sell.is_positive() => PriceRange::new(min_sell, unbounded.max),
            _ => unbounded,
        }
    }

    pub fn is_error_locked(&self) -> bool {
        self.core.is_error_locked()
    }

    pub fn uninit(&self) {
        self.core.uninit();
        self.market.uninit();
    }
}

impl fmt::Display for ContractTrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.market)?;
        writeln!(f, "contract trader: {}", self.core.strategy_id())?;
        writeln!(
            f,
            "settle currency({}): {}/{}",
            self.settle.currency(),
            self.settle.available(),
            self.settle.rights()
        )?;
        writeln!(f, "position {}", self.position)?;
        self.core.fmt_orders(f)
    }
}
