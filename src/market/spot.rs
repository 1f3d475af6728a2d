use super::common::{HasCore, MarketCore};
use super::Market;
use crate::core::events::OrderSide;
use crate::exchanges::ExchangeContext;
use crate::orderbook::OrderBook;
use crate::types::{Instrument, Price, Size};
use log::info;
use parking_lot::RwLockReadGuard;
use std::fmt;
use std::sync::Arc;

/// Spot market. Ready as soon as the depth feed is fresh.
pub struct SpotMarket {
    core: MarketCore,
}

impl HasCore for SpotMarket {
    fn core(&self) -> &MarketCore {
        &self.core
    }
}

impl SpotMarket {
    /// Subscribe the spot feeds. Must be called inside a tokio runtime.
    pub fn new(ctx: &Arc<ExchangeContext>, instrument: Instrument) -> Arc<Self> {
        let market = Arc::new(Self {
            core: MarketCore::new(ctx.clone(), instrument),
        });
        MarketCore::subscribe_common(&market);
        info!("{} spot market inited", market.core.log_prefix());
        market
    }

    pub fn core(&self) -> &MarketCore {
        &self.core
    }

    pub fn base_currency(&self) -> &str {
        &self.core.instrument().base_currency
    }

    pub fn quote_currency(&self) -> &str {
        &self.core.instrument().quote_currency
    }
}

impl Market for SpotMarket {
    fn instrument(&self) -> &Instrument {
        self.core.instrument()
    }

    fn ready(&self) -> bool {
        self.core.flag_snapshot().ready_for(self.core.instrument().product)
    }

    fn unready_reason(&self) -> String {
        self.core.flag_snapshot().unready_reason(self.core.instrument().product)
    }

    fn latest_price(&self) -> Option<Price> {
        self.core.latest_price()
    }

    fn order_book(&self) -> RwLockReadGuard<'_, OrderBook> {
        self.core.order_book()
    }

    fn align_price(&self, price: Price, side: OrderSide, make_only: bool) -> Price {
        self.core.align_price(price, side, make_only)
    }

    fn align_size(&self, size: Size) -> Size {
        self.core.align_size(size)
    }

    fn uninit(&self) {
        self.core.uninit();
    }
}

impl fmt::Display for SpotMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "spot market: {}", self.core.instrument_id())?;
        match self.core.latest_price() {
            Some(price) => writeln!(f, "price: {}", price)?,
            None => writeln!(f, "price: -")?,
        }
        writeln!(f, "depth:")?;
        write!(f, "{}", self.core.order_book().render(5))
    }
}
