//! Spot trader gating, reconciliation and the error lock

use chrono::{Duration as ChronoDuration, Utc};
use crypto_oms::core::events::{AccountSnapshot, BalanceSnapshot, OrderBookLevel, OrderBookSnapshot};
use crypto_oms::{
    CoreConfig, Deal, DepthUpdate, ExchangeContext, Instrument, InstrumentId, MockExchange, Order, OrderObserver,
    OrderSide, OrderState, OrderStatus, Price, Size, SpotMarket, SpotTrader,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn p(v: &str) -> Price {
    Price::from_str(v).unwrap()
}

fn s(v: &str) -> Size {
    Size::from_str(v).unwrap()
}

fn account(btc: i64, usdt: i64, at: chrono::DateTime<Utc>) -> AccountSnapshot {
    AccountSnapshot {
        balances: vec![
            BalanceSnapshot {
                currency: "BTC".to_string(),
                available: Decimal::from(btc),
            },
            BalanceSnapshot {
                currency: "USDT".to_string(),
                available: Decimal::from(usdt),
            },
        ],
        positions: vec![],
        timestamp: at,
    }
}

#[derive(Default)]
struct DealCounter(AtomicUsize);

impl OrderObserver for DealCounter {
    fn on_deal(&self, _order: &Order, _deal: &Deal) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup() -> (Arc<MockExchange>, Arc<ExchangeContext>, Arc<SpotTrader>) {
    let exchange = Arc::new(MockExchange::new("mock"));
    let ctx = ExchangeContext::new(exchange.clone(), CoreConfig::default());
    let id = InstrumentId::new("BTC-USDT");
    let market = SpotMarket::new(&ctx, Instrument::spot(id, "BTC", "USDT", p("0.1"), s("0.0001")));
    let trader = SpotTrader::new(&ctx, 21, market);
    (exchange, ctx, trader)
}

fn make_ready(exchange: &MockExchange, ctx: &ExchangeContext) {
    let id = InstrumentId::new("BTC-USDT");
    exchange.push_depth(
        &id,
        DepthUpdate::Snapshot(OrderBookSnapshot::new(
            id.clone(),
            vec![OrderBookLevel::new(p("49999.9"), s("3"))],
            vec![OrderBookLevel::new(p("50000.1"), s("3"))],
            1,
        )),
    );
    ctx.apply_account_snapshot(&account(0, 150_000, Utc::now() - ChronoDuration::seconds(1)));
    ctx.set_connected(true);
}

async fn acked(order: &Order) {
    for _ in 0..100 {
        if order.state() != OrderState::Submitting {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_unready_trader_refuses_without_touching_map() {
    let (exchange, ctx, trader) = setup();
    ctx.set_connected(true);

    let started = tokio::time::Instant::now();
    let order = trader
        .make_order(p("50000"), s("1"), OrderSide::Buy, false, false, "early", None)
        .await;
    assert!(order.is_none());
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(trader.orders().is_empty());
    assert!(exchange.placed_orders().is_empty());
    assert_eq!(trader.unready_reason(), "depth not ready");
}

#[tokio::test]
async fn test_buy_in_two_fills_moves_both_balances() {
    let (exchange, ctx, trader) = setup();
    make_ready(&exchange, &ctx);

    let counter = Arc::new(DealCounter::default());
    let order = trader
        .make_order(p("50000"), s("2"), OrderSide::Buy, false, false, "accumulate", Some(counter.clone()))
        .await
        .unwrap();
    acked(&order).await;

    for (status, filled) in [(OrderStatus::PartiallyFilled, "1"), (OrderStatus::Filled, "2")] {
        let snapshot = exchange
            .order_snapshot(order.client_order_id(), status, s(filled), p("50000"))
            .unwrap();
        exchange.push_order_snapshot(snapshot);
    }

    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    assert_eq!(trader.base_balance().rights(), Decimal::from(2));
    assert_eq!(trader.quote_balance().rights(), Decimal::from(50_000));
    // Available only moves with the account snapshot
    assert_eq!(trader.quote_balance().available(), Decimal::from(150_000));

    // The venue's next account snapshot already includes the fills
    ctx.apply_account_snapshot(&account(2, 50_000, Utc::now() + ChronoDuration::seconds(1)));
    assert_eq!(trader.base_balance().rights(), Decimal::from(2));
    assert_eq!(trader.quote_balance().rights(), Decimal::from(50_000));
    assert_eq!(trader.quote_balance().pending_rights(), Decimal::ZERO);
}

#[tokio::test]
async fn test_foreign_snapshot_locks_trader_for_good() {
    let (exchange, ctx, trader) = setup();
    make_ready(&exchange, &ctx);

    let order = trader
        .make_order(p("49000"), s("1"), OrderSide::Buy, false, false, "victim", None)
        .await
        .unwrap();
    acked(&order).await;

    let mut foreign = exchange
        .order_snapshot(order.client_order_id(), OrderStatus::Filled, s("1"), p("49000"))
        .unwrap();
    foreign.strategy_id = Some(99);
    exchange.push_order_snapshot(foreign);

    assert!(trader.is_error_locked());
    assert_eq!(order.filled(), Size::ZERO);

    // Every other input is still fine, yet nothing more is placed
    make_ready(&exchange, &ctx);
    assert!(!trader.ready());
    let refused = trader
        .make_order(p("49000"), s("1"), OrderSide::Buy, false, false, "after lock", None)
        .await;
    assert!(refused.is_none());
    assert_eq!(exchange.placed_orders().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finished_orders_are_swept() {
    let (exchange, ctx, trader) = setup();
    make_ready(&exchange, &ctx);

    let mut orders = Vec::new();
    for i in 0..4 {
        let price = p("49000") - Price::new(Decimal::from(i));
        let order = trader
            .make_order(price, s("0.1"), OrderSide::Buy, false, false, "ladder", None)
            .await
            .unwrap();
        acked(&order).await;
        orders.push(order);
    }
    for order in orders.iter().step_by(2) {
        let snapshot = exchange
            .order_snapshot(order.client_order_id(), OrderStatus::Cancelled, Size::ZERO, Price::ZERO)
            .unwrap();
        exchange.push_order_snapshot(snapshot);
    }
    assert_eq!(trader.orders().len(), 4);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let left: Vec<_> = trader.orders().iter().map(|o| o.client_order_id().to_string()).collect();
    assert_eq!(left.len(), 2);
    assert!(left.contains(&orders[1].client_order_id().to_string()));
    assert!(left.contains(&orders[3].client_order_id().to_string()));
}

#[tokio::test]
async fn test_context_shutdown_stops_trader_tasks() {
    let (exchange, ctx, trader) = setup();
    make_ready(&exchange, &ctx);
    let rendered = trader.to_string();
    assert!(rendered.contains("spot market: BTC-USDT"));
    assert!(rendered.contains("quote currency(USDT): 150000/150000"));

    ctx.shutdown();
    trader.uninit();
    assert!(trader.core().is_uninited());
    assert!(!trader.ready());
}
