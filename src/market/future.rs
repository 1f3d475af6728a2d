use super::common::{HasCore, MarketCore};
use super::feed::{spawn_price_limit_watchdog, Feed};
use super::{DerivativeMarket, Market};
use crate::core::events::{FundingRateUpdate, MarkPriceUpdate, OrderSide, PriceLimitUpdate};
use crate::exchanges::ExchangeContext;
use crate::orderbook::OrderBook;
use crate::traits::{FeedCallback, Subscription};
use crate::types::{Instrument, Price, ProductType, Size};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{RwLock, RwLockReadGuard};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::{Arc, Weak};

/// Current and next funding, as last published by the venue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundingInfo {
    pub rate: Decimal,
    pub next_rate: Decimal,
    pub time: Option<DateTime<Utc>>,
    pub next_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct DerivativeState {
    mark_price: Option<Price>,
    max_buy: Price,
    min_sell: Price,
    funding: FundingInfo,
}

/// Dated future or perpetual swap market.
///
/// Ready only while depth, mark price, price limits and funding are all fresh.
/// Dated futures pay no funding, so that flag is held permanently set.
pub struct FutureMarket {
    core: MarketCore,
    state: RwLock<DerivativeState>,
}

impl HasCore for FutureMarket {
    fn core(&self) -> &MarketCore {
        &self.core
    }
}

impl FutureMarket {
    /// Subscribe every derivative feed. Must be called inside a tokio runtime.
    pub fn new(ctx: &Arc<ExchangeContext>, instrument: Instrument) -> Arc<Self> {
        let market = Arc::new(Self {
            core: MarketCore::new(ctx.clone(), instrument),
            state: RwLock::new(DerivativeState::default()),
        });
        MarketCore::subscribe_common(&market);
        Self::subscribe_derivative(&market);
        info!("{} future market inited", market.core.log_prefix());
        market
    }

    fn subscribe_derivative(market: &Arc<Self>) {
        let core = &market.core;
        let ctx = core.ctx().clone();
        let adapter = ctx.adapter().clone();
        let feeds = ctx.config().feeds.clone();
        let id = core.instrument_id().clone();

        let weak: Weak<Self> = Arc::downgrade(market);
        let mark: Arc<dyn Subscription> = Arc::from(adapter.subscribe_mark_price(
            &id,
            Arc::new(move |update: MarkPriceUpdate| {
                if let Some(market) = weak.upgrade() {
                    market.on_mark_price(update);
                }
            }),
        ));
        core.add_subscription(mark.clone());
        core.watch_feed(Feed::MarkPrice, feeds.mark_price(), mark);

        let weak: Weak<Self> = Arc::downgrade(market);
        let apply_limit: FeedCallback<PriceLimitUpdate> = Arc::new(move |update: PriceLimitUpdate| {
            if let Some(market) = weak.upgrade() {
                market.on_price_limit(update);
            }
        });
        let limit: Arc<dyn Subscription> = Arc::from(adapter.subscribe_price_limit(&id, apply_limit.clone()));
        core.add_subscription(limit.clone());
        core.add_task(spawn_price_limit_watchdog(
            feeds.price_limit_poll(),
            feeds.price_limit(),
            core.flags().clone(),
            limit,
            adapter.clone(),
            id.clone(),
            apply_limit,
            core.stop_signal(),
            core.log_prefix().to_string(),
        ));

        if core.instrument().product == ProductType::Perpetual {
            let weak: Weak<Self> = Arc::downgrade(market);
            let funding: Arc<dyn Subscription> = Arc::from(adapter.subscribe_funding_rate(
                &id,
                Arc::new(move |update: FundingRateUpdate| {
                    if let Some(market) = weak.upgrade() {
                        market.on_funding_rate(update);
                    }
                }),
            ));
            core.add_subscription(funding.clone());
            core.watch_feed(Feed::FundingRate, feeds.funding_rate(), funding);
        } else {
            core.flags().set(Feed::FundingRate, true);
        }
    }

    pub fn core(&self) -> &MarketCore {
        &self.core
    }

    pub fn value_currency(&self) -> &str {
        self.core.instrument().value_currency()
    }

    pub fn settle_currency(&self) -> &str {
        self.core.instrument().settle_currency()
    }

    pub fn contract_value(&self) -> Decimal {
        self.core.instrument().contract_value
    }

    fn on_mark_price(&self, update: MarkPriceUpdate) {
        let aligned = update.mark_price.align_nearest(self.core.instrument().tick_size);
        self.state.write().mark_price = Some(aligned);
        self.core.flags().mark_fresh(Feed::MarkPrice);
    }

    fn on_price_limit(&self, update: PriceLimitUpdate) {
        {
            let mut state = self.state.write();
            state.max_buy = update.max_buy;
            state.min_sell = update.min_sell;
        }
        self.core.flags().mark_fresh(Feed::PriceLimit);
    }

    fn on_funding_rate(&self, update: FundingRateUpdate) {
        self.state.write().funding = FundingInfo {
            rate: update.funding_rate,
            next_rate: update.next_funding_rate,
            time: Some(update.funding_time),
            next_time: update.next_funding_time,
        };
        self.core.flags().mark_fresh(Feed::FundingRate);
        debug!("{} funding rate {}", self.core.log_prefix(), update.funding_rate);
    }
}

impl Market for FutureMarket {
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

    /// Tick alignment first, then the venue price band when known
    fn align_price(&self, price: Price, side: OrderSide, make_only: bool) -> Price {
        let aligned = self.core.align_price(price, side, make_only);
        let state = self.state.read();
        match side {
            OrderSide::Buy if state.max_buy.is_positive() && aligned > state.max_buy => state.max_buy,
            OrderSide::Sell if state.min_sell.is_positive() && aligned < state.min_sell => state.min_sell,
            _ => aligned,
        }
    }

    fn align_size(&self, size: Size) -> Size {
        self.core.align_size(size)
    }

    fn uninit(&self) {
        self.core.uninit();
    }
}

impl DerivativeMarket for FutureMarket {
    fn mark_price(&self) -> Option<Price> {
        self.state.read().mark_price
    }

    fn funding_info(&self) -> FundingInfo {
        self.state.read().funding.clone()
    }

    fn price_limits(&self) -> Option<(Price, Price)> {
        let state = self.state.read();
        if state.max_buy.is_zero() && state.min_sell.is_zero() {
            None
        } else {
            Some((state.max_buy, state.min_sell))
        }
    }
}

impl fmt::Display for FutureMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let funding = self.funding_info();
        writeln!(f, "future market: {}", self.core.instrument_id())?;
        match self.core.latest_price() {
            Some(price) => writeln!(f, "price: {}", price)?,
            None => writeln!(f, "price: -")?,
        }
        writeln!(f, "this funding rate: {:.2}%", funding.rate * Decimal::ONE_HUNDRED)?;
        writeln!(f, "next funding rate: {:.2}%", funding.next_rate * Decimal::ONE_HUNDRED)?;
        writeln!(f, "{}", self.core.flag_snapshot())?;
        writeln!(f, "depth:")?;
        write!(f, "{}", self.core.order_book().render(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::core::events::{DepthUpdate, OrderBookLevel, OrderBookSnapshot};
    use crate::exchanges::MockExchange;
    use crate::traits::FeedKind;
    use crate::types::InstrumentId;
    use std::str::FromStr;
    use std::time::Duration;

    fn p(v: &str) -> Price {
        Price::from_str(v).unwrap()
    }

    fn swap() -> Instrument {
        Instrument::derivative("BTC-USDT-SWAP", "BTC", "USDT", Decimal::new(1, 2), p("0.1"), Size::new(Decimal::ONE))
    }

    fn setup(instrument: Instrument) -> (Arc<MockExchange>, Arc<FutureMarket>) {
        let exchange = Arc::new(MockExchange::new("mock"));
        let ctx = ExchangeContext::new(exchange.clone(), CoreConfig::default());
        let market = FutureMarket::new(&ctx, instrument);
        (exchange, market)
    }

    fn feed_all(exchange: &MockExchange, id: &InstrumentId) {
        exchange.push_depth(
            id,
            DepthUpdate::Snapshot(OrderBookSnapshot::new(
                id.clone(),
                vec![OrderBookLevel::new(p("100"), Size::new(Decimal::ONE))],
                vec![OrderBookLevel::new(p("101"), Size::new(Decimal::ONE))],
                1,
            )),
        );
        exchange.push_mark_price(MarkPriceUpdate {
            instrument_id: id.clone(),
            mark_price: p("100.53"),
            timestamp: Utc::now(),
        });
        exchange.push_price_limit(PriceLimitUpdate {
            instrument_id: id.clone(),
            max_buy: p("105"),
            min_sell: p("95"),
            timestamp: Utc::now(),
        });
        exchange.push_funding_rate(FundingRateUpdate {
            instrument_id: id.clone(),
            funding_rate: Decimal::new(1, 4),
            next_funding_rate: Decimal::new(2, 4),
            funding_time: Utc::now(),
            next_funding_time: None,
        });
    }

    #[tokio::test]
    async fn test_ready_requires_all_four_feeds() {
        let (exchange, market) = setup(swap());
        let id = market.instrument().id.clone();
        assert!(!market.ready());

        exchange.push_depth(
            &id,
            DepthUpdate::Snapshot(OrderBookSnapshot::new(id.clone(), vec![], vec![], 1)),
        );
        assert!(!market.ready());
        assert!(market.unready_reason().contains("mark price not ready"));
        assert!(!market.unready_reason().contains("depth"));

        feed_all(&exchange, &id);
        assert!(market.ready());
        assert_eq!(market.unready_reason(), "");
        assert_eq!(market.mark_price(), Some(p("100.5")));
        assert_eq!(market.funding_info().rate, Decimal::new(1, 4));
    }

    #[tokio::test]
    async fn test_dated_future_skips_funding() {
        let instrument = Instrument::derivative("BTC-USD-240628", "USD", "BTC", Decimal::from(100), p("0.1"), Size::new(Decimal::ONE));
        let (exchange, market) = setup(instrument);
        let id = market.instrument().id.clone();
        assert_eq!(exchange.subscriber_count(FeedKind::FundingRate, &id), 0);
        assert!(market.core().flags().get(Feed::FundingRate));
    }

    #[tokio::test]
    async fn test_align_price_clamps_to_limits() {
        let (exchange, market) = setup(swap());
        let id = market.instrument().id.clone();
        feed_all(&exchange, &id);

        assert_eq!(market.align_price(p("110"), OrderSide::Buy, false), p("105"));
        assert_eq!(market.align_price(p("90"), OrderSide::Sell, false), p("95"));
        assert_eq!(market.align_price(p("100.07"), OrderSide::Buy, false), p("100.0"));
        assert_eq!(market.price_limits(), Some((p("105"), p("95"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_mark_price_clears_flag_and_resubscribes() {
        let (exchange, market) = setup(swap());
        let id = market.instrument().id.clone();
        feed_all(&exchange, &id);
        assert!(market.ready());

        // Keep everything else alive past the mark price window
        tokio::time::sleep(Duration::from_secs(8)).await;
        feed_all_but_mark(&exchange, &id);
        tokio::time::sleep(Duration::from_secs(8)).await;
        feed_all_but_mark(&exchange, &id);
        tokio::time::sleep(Duration::from_secs(8)).await;

        assert!(!market.ready());
        assert_eq!(market.unready_reason(), "mark price not ready");
        assert_eq!(exchange.reset_count(FeedKind::MarkPrice, &id), 1);
        assert_eq!(exchange.reset_count(FeedKind::Depth, &id), 0);

        feed_all(&exchange, &id);
        assert!(market.ready());
    }

    fn feed_all_but_mark(exchange: &MockExchange, id: &InstrumentId) {
        exchange.push_depth(
            id,
            DepthUpdate::Snapshot(OrderBookSnapshot::new(id.clone(), vec![], vec![], 2)),
        );
        exchange.push_price_limit(PriceLimitUpdate {
            instrument_id: id.clone(),
            max_buy: p("105"),
            min_sell: p("95"),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_limit_rest_fallback_keeps_flag() {
        let (exchange, market) = setup(swap());
        let id = market.instrument().id.clone();
        exchange.set_rest_price_limit(PriceLimitUpdate {
            instrument_id: id.clone(),
            max_buy: p("120"),
            min_sell: p("80"),
            timestamp: Utc::now(),
        });

        // No stream message at all: the 10s poll fills in before the 20s timeout
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(market.core().flags().get(Feed::PriceLimit));
        assert_eq!(market.price_limits(), Some((p("120"), p("80"))));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(market.core().flags().get(Feed::PriceLimit));
        assert_eq!(exchange.reset_count(FeedKind::PriceLimit, &id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninit_unsubscribes() {
        let (exchange, market) = setup(swap());
        let id = market.instrument().id.clone();
        market.uninit();
        assert_eq!(exchange.subscriber_count(FeedKind::MarkPrice, &id), 0);
        assert_eq!(exchange.subscriber_count(FeedKind::Depth, &id), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(exchange.reset_count(FeedKind::MarkPrice, &id), 0);
        assert!(market.core().is_uninited());
    }
}
