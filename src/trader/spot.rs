use super::common::TraderCore;
use crate::core::events::OrderSide;
use crate::exchanges::ExchangeContext;
use crate::ledger::Balance;
use crate::market::{Market, SpotMarket};
use crate::oms::{Deal, Order, OrderHooks, OrderObserver, OrderParams, PriceRange};
use crate::types::{Price, Size};
use log::info;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Moves base and quote rights as fills arrive, ahead of the next account snapshot
struct SpotDealReconciler {
    base: Arc<Balance>,
    quote: Arc<Balance>,
}

impl OrderObserver for SpotDealReconciler {
    fn on_deal(&self, _order: &Order, deal: &Deal) {
        let amount = deal.amount.value();
        let notional = deal.amount.notional(deal.price);
        let (base_delta, quote_delta) = match deal.side {
            OrderSide::Buy => (amount, -notional),
            OrderSide::Sell => (-amount, notional),
        };
        Balance::apply_deal_pair(&self.base, base_delta, &self.quote, quote_delta, deal.time);
    }
}

/// Places and tracks orders for one strategy on one spot instrument
pub struct SpotTrader {
    core: TraderCore,
    market: Arc<SpotMarket>,
    base: Arc<Balance>,
    quote: Arc<Balance>,
    reconciler: Arc<SpotDealReconciler>,
}

impl SpotTrader {
    /// Must be called inside a tokio runtime
    pub fn new(ctx: &Arc<ExchangeContext>, strategy_id: u32, market: Arc<SpotMarket>) -> Arc<Self> {
        let base = ctx.balances().find_balance(market.base_currency());
        let quote = ctx.balances().find_balance(market.quote_currency());
        let core = TraderCore::new(ctx.clone(), market.instrument().id.clone(), strategy_id);
        let reconciler = Arc::new(SpotDealReconciler {
            base: base.clone(),
            quote: quote.clone(),
        });
        info!("{} spot trader inited, strategy {}", core.log_prefix(), strategy_id);
        Arc::new(Self {
            core,
            market,
            base,
            quote,
            reconciler,
        })
    }

    pub fn core(&self) -> &TraderCore {
        &self.core
    }

    pub fn market(&self) -> &Arc<SpotMarket> {
        &self.market
    }

    pub fn strategy_id(&self) -> u32 {
        self.core.strategy_id()
    }

    pub fn ready(&self) -> bool {
        self.market.ready() && self.base.ready().0 && self.quote.ready().0 && self.core.gate_ready()
    }

    /// First failing readiness input, empty when ready
    pub fn unready_reason(&self) -> String {
        if self.core.is_error_locked() {
            return "error locked".to_string();
        }
        if !self.market.ready() {
            return self.market.unready_reason();
        }
        let (ok, reason) = self.base.ready();
        if !ok {
            return format!("base balance({}) not ready: {}", self.base.currency(), reason);
        }
        let (ok, reason) = self.quote.ready();
        if !ok {
            return format!("quote balance({}) not ready: {}", self.quote.currency(), reason);
        }
        if !self.core.ctx().is_connected() {
            return "exchange not ready".to_string();
        }
        String::new()
    }

    /// Create and submit a limit order. Returns `None` after a short pause when
    /// the trader is not ready, or immediately when the parameters are invalid.
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
            .submit(params, OrderHooks::new(), range, self.reconciler.clone(), observer)
    }

    /// Live orders, including finished ones not yet swept
    pub fn orders(&self) -> Vec<Arc<Order>> {
        self.core.live_orders().orders()
    }

    pub fn base_balance(&self) -> &Arc<Balance> {
        &self.base
    }

    pub fn quote_balance(&self) -> &Arc<Balance> {
        &self.quote
    }

    /// Buy: quote available at `price`, rounded down to the lot. Sell: base available.
    pub fn available_amount(&self, side: OrderSide, price: Price) -> Size {
        match side {
            OrderSide::Buy => {
                if !price.is_positive() {
                    return Size::ZERO;
                }
                let amount = Size::new(self.quote.available() / price.value());
                self.market.align_size(amount)
            }
            OrderSide::Sell => Size::new(self.base.available()),
        }
    }

    /// `(base, quote)` rights read together, so a deal is never seen half applied
    pub fn rights(&self) -> (Decimal, Decimal) {
        Balance::rights_pair(&self.base, &self.quote)
    }

    pub fn buy_price_range(&self) -> PriceRange {
        PriceRange::unbounded()
    }

    pub fn sell_price_range(&self) -> PriceRange {
        PriceRange::unbounded()
    }

    pub fn is_error_locked(&self) -> bool {
        self.core.is_error_locked()
    }

    /// Stop the sweeper, drop the snapshot subscription and release the market
    pub fn uninit(&self) {
        self.core.uninit();
        self.market.uninit();
    }
}

impl fmt::Display for SpotTrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (base_rights, quote_rights) = self.rights();
        writeln!(f, "{}", self.market)?;
        writeln!(f, "spot trader: {}", self.core.strategy_id())?;
        writeln!(
            f,
            "base currency({}): {}/{}",
            self.base.currency(),
            self.base.available(),
            base_rights
        )?;
        writeln!(
            f,
            "quote currency({}): {}/{}",
            self.quote.currency(),
            self.quote.available(),
            quote_rights
        )?;
        self.core.fmt_orders(f)
    }
}
