//! Market readiness against the mock exchange
//!
//! - spot markets only wait for depth
//! - derivatives wait for depth, mark price, price limits and funding
//! - silent feeds clear their flag and force a resubscription

use chrono::Utc;
use crypto_oms::core::events::{
    FundingRateUpdate, MarkPriceUpdate, OrderBookDelta, OrderBookLevel, OrderBookSnapshot, PriceLimitUpdate,
    TradeUpdate,
};
use crypto_oms::market::Feed;
use crypto_oms::{
    CoreConfig, DepthUpdate, DerivativeMarket, ExchangeContext, FeedKind, FutureMarket, Instrument, InstrumentId,
    Market, MockExchange, OrderSide, Price, Size, SpotMarket,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn p(v: &str) -> Price {
    Price::from_str(v).unwrap()
}

fn s(v: &str) -> Size {
    Size::from_str(v).unwrap()
}

fn book(id: &InstrumentId, bid: &str, ask: &str) -> DepthUpdate {
    DepthUpdate::Snapshot(OrderBookSnapshot::new(
        id.clone(),
        vec![OrderBookLevel::new(p(bid), s("1"))],
        vec![OrderBookLevel::new(p(ask), s("1"))],
        1,
    ))
}

fn context() -> (Arc<MockExchange>, Arc<ExchangeContext>) {
    let exchange = Arc::new(MockExchange::new("mock"));
    let ctx = ExchangeContext::new(exchange.clone(), CoreConfig::default());
    (exchange, ctx)
}

fn push_derivative_feeds(exchange: &MockExchange, id: &InstrumentId, funding: bool) {
    exchange.push_depth(id, book(id, "49999", "50001"));
    exchange.push_mark_price(MarkPriceUpdate {
        instrument_id: id.clone(),
        mark_price: p("50000.04"),
        timestamp: Utc::now(),
    });
    exchange.push_price_limit(PriceLimitUpdate {
        instrument_id: id.clone(),
        max_buy: p("51000"),
        min_sell: p("49000"),
        timestamp: Utc::now(),
    });
    if funding {
        exchange.push_funding_rate(FundingRateUpdate {
            instrument_id: id.clone(),
            funding_rate: Decimal::new(1, 4),
            next_funding_rate: Decimal::new(-5, 5),
            funding_time: Utc::now(),
            next_funding_time: None,
        });
    }
}

// =============================================================================
// Spot
// =============================================================================

#[tokio::test]
async fn test_spot_market_ready_on_depth_only() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("ETH-USDT");
    let market = SpotMarket::new(&ctx, Instrument::spot(id.clone(), "ETH", "USDT", p("0.01"), s("0.001")));

    assert!(!market.ready());
    assert_eq!(market.unready_reason(), "depth not ready");

    exchange.push_depth(&id, book(&id, "3000.00", "3000.10"));
    assert!(market.ready());
    assert_eq!(market.unready_reason(), "");
    assert_eq!(market.latest_price(), Some(p("3000.05")));

    exchange.push_trade(TradeUpdate {
        instrument_id: id.clone(),
        price: p("3000.07"),
        size: s("0.5"),
        side: OrderSide::Buy,
        timestamp: Utc::now(),
    });
    assert_eq!(market.latest_price(), Some(p("3000.07")));
}

#[tokio::test]
async fn test_depth_delta_before_snapshot_keeps_market_unready() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("ETH-USDT");
    let market = SpotMarket::new(&ctx, Instrument::spot(id.clone(), "ETH", "USDT", p("0.01"), s("0.001")));

    let delta = DepthUpdate::Delta(OrderBookDelta::new(
        id.clone(),
        vec![OrderBookLevel::new(p("2999.99"), s("2"))],
        vec![],
        2,
    ));
    exchange.push_depth(&id, delta.clone());
    assert!(!market.ready());

    exchange.push_depth(&id, book(&id, "3000.00", "3000.10"));
    exchange.push_depth(&id, delta);
    assert!(market.ready());
    assert_eq!(market.order_book().best_bid(), Some((p("3000.00"), s("1"))));
}

#[tokio::test(start_paused = true)]
async fn test_silent_depth_goes_stale_and_resubscribes() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("ETH-USDT");
    let market = SpotMarket::new(&ctx, Instrument::spot(id.clone(), "ETH", "USDT", p("0.01"), s("0.001")));

    exchange.push_depth(&id, book(&id, "3000.00", "3000.10"));
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(market.ready());
    assert_eq!(exchange.reset_count(FeedKind::Depth, &id), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!market.ready());
    assert_eq!(exchange.reset_count(FeedKind::Depth, &id), 1);

    exchange.push_depth(&id, book(&id, "3001.00", "3001.10"));
    assert!(market.ready());
}

#[tokio::test]
async fn test_maker_only_alignment_stays_behind_touch() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("ETH-USDT");
    let market = SpotMarket::new(&ctx, Instrument::spot(id.clone(), "ETH", "USDT", p("0.01"), s("0.001")));
    exchange.push_depth(&id, book(&id, "3000.00", "3000.10"));

    assert_eq!(market.align_price(p("3000.237"), OrderSide::Buy, false), p("3000.23"));
    assert_eq!(market.align_price(p("3000.231"), OrderSide::Sell, false), p("3000.24"));
    assert_eq!(market.align_price(p("3000.50"), OrderSide::Buy, true), p("3000.09"));
    assert_eq!(market.align_price(p("2999.00"), OrderSide::Sell, true), p("3000.01"));
    assert_eq!(market.align_size(s("1.23456")), s("1.234"));
}

// =============================================================================
// Derivatives
// =============================================================================

#[tokio::test]
async fn test_swap_needs_all_four_feeds() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    let market = FutureMarket::new(
        &ctx,
        Instrument::derivative(id.clone(), "BTC", "USDT", Decimal::new(1, 2), p("0.1"), s("1")),
    );

    exchange.push_depth(&id, book(&id, "49999", "50001"));
    assert!(!market.ready());
    let reason = market.unready_reason();
    assert!(reason.contains("mark price not ready"));
    assert!(reason.contains("funding rate not ready"));
    assert!(!reason.contains("depth"));

    push_derivative_feeds(&exchange, &id, true);
    assert!(market.ready());
    assert_eq!(market.mark_price(), Some(p("50000.0")));
    assert_eq!(market.price_limits(), Some((p("51000"), p("49000"))));
    assert_eq!(market.funding_info().rate, Decimal::new(1, 4));
    assert!(market.core().flags().get(Feed::FundingRate));
}

#[tokio::test]
async fn test_dated_future_ignores_funding() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USD-250627");
    let market = FutureMarket::new(
        &ctx,
        Instrument::derivative(id.clone(), "USD", "BTC", Decimal::from(100), p("0.1"), s("1")),
    );

    push_derivative_feeds(&exchange, &id, false);
    assert!(market.ready());
    assert_eq!(exchange.subscriber_count(FeedKind::FundingRate, &id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_price_limit_rest_fallback_keeps_market_ready() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    exchange.set_rest_price_limit(PriceLimitUpdate {
        instrument_id: id.clone(),
        max_buy: p("52000"),
        min_sell: p("48000"),
        timestamp: Utc::now(),
    });
    let market = FutureMarket::new(
        &ctx,
        Instrument::derivative(id.clone(), "BTC", "USDT", Decimal::new(1, 2), p("0.1"), s("1")),
    );
    push_derivative_feeds(&exchange, &id, true);

    // Keep the other feeds alive while the price-limit stream stays silent
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
    }

    assert!(market.ready());
    assert_eq!(market.price_limits(), Some((p("52000"), p("48000"))));
    assert_eq!(exchange.reset_count(FeedKind::PriceLimit, &id), 0);
}

fn push_derivative_feeds_without_limit(exchange: &MockExchange, id: &InstrumentId) {
    exchange.push_depth(id, book(id, "49999", "50001"));
    exchange.push_mark_price(MarkPriceUpdate {
        instrument_id: id.clone(),
        mark_price: p("50000"),
        timestamp: Utc::now(),
    });
}

fn push_price_limit(exchange: &MockExchange, id: &InstrumentId) {
    exchange.push_price_limit(PriceLimitUpdate {
        instrument_id: id.clone(),
        max_buy: p("51000"),
        min_sell: p("49000"),
        timestamp: Utc::now(),
    });
}

fn swap(ctx: &Arc<ExchangeContext>, id: &InstrumentId) -> Arc<FutureMarket> {
    FutureMarket::new(
        ctx,
        Instrument::derivative(id.clone(), "BTC", "USDT", Decimal::new(1, 2), p("0.1"), s("1")),
    )
}

#[tokio::test(start_paused = true)]
async fn test_silent_funding_goes_stale_after_three_minutes() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    let market = swap(&ctx, &id);
    push_derivative_feeds(&exchange, &id, true);

    // Funding publishes rarely; everything else keeps streaming
    for _ in 0..35 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
        push_price_limit(&exchange, &id);
    }
    assert!(market.ready());
    assert_eq!(exchange.reset_count(FeedKind::FundingRate, &id), 0);

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
        push_price_limit(&exchange, &id);
    }
    assert!(!market.ready());
    assert!(!market.core().flags().get(Feed::FundingRate));
    assert_eq!(market.unready_reason(), "funding rate not ready");
    assert_eq!(exchange.reset_count(FeedKind::FundingRate, &id), 1);
    assert_eq!(exchange.reset_count(FeedKind::Depth, &id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_price_limit_hard_timeout_when_rest_fails() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    let market = swap(&ctx, &id);
    // No REST limit configured: every poll fails
    push_derivative_feeds(&exchange, &id, true);

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
    }
    assert!(market.ready());
    assert_eq!(exchange.reset_count(FeedKind::PriceLimit, &id), 0);

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
    }
    assert!(!market.ready());
    assert!(!market.core().flags().get(Feed::PriceLimit));
    assert_eq!(market.unready_reason(), "price limit not ready");
    assert_eq!(exchange.reset_count(FeedKind::PriceLimit, &id), 1);

    push_price_limit(&exchange, &id);
    assert!(market.ready());
}

#[tokio::test(start_paused = true)]
async fn test_slow_price_limit_poll_does_not_delay_timeout() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    exchange.set_rest_price_limit(PriceLimitUpdate {
        instrument_id: id.clone(),
        max_buy: p("52000"),
        min_sell: p("48000"),
        timestamp: Utc::now(),
    });
    exchange.set_rest_latency(Duration::from_secs(60));
    let market = swap(&ctx, &id);
    push_derivative_feeds(&exchange, &id, true);

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        push_derivative_feeds_without_limit(&exchange, &id);
    }
    assert!(!market.core().flags().get(Feed::PriceLimit));
    assert_eq!(exchange.reset_count(FeedKind::PriceLimit, &id), 1);
    assert_eq!(market.price_limits(), Some((p("51000"), p("49000"))));

    // Shutdown is not held up by the request still in flight
    market.uninit();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(exchange.subscriber_count(FeedKind::PriceLimit, &id), 0);
}

#[tokio::test]
async fn test_uninit_releases_every_feed() {
    let (exchange, ctx) = context();
    let id = InstrumentId::new("BTC-USDT-SWAP");
    let market = FutureMarket::new(
        &ctx,
        Instrument::derivative(id.clone(), "BTC", "USDT", Decimal::new(1, 2), p("0.1"), s("1")),
    );
    push_derivative_feeds(&exchange, &id, true);
    assert!(market.ready());

    market.uninit();
    assert!(!market.ready());
    for kind in [FeedKind::Depth, FeedKind::MarkPrice, FeedKind::PriceLimit, FeedKind::FundingRate, FeedKind::Trades] {
        assert_eq!(exchange.subscriber_count(kind, &id), 0, "{} still subscribed", kind);
    }
}
