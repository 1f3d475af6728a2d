//! Order lifecycle through a spot trader and the mock exchange
//!
//! Fills are reported as cumulative totals; every test drives the order with
//! venue snapshots and checks the deals and transitions seen by observers.

use chrono::Utc;
use crypto_oms::core::events::{AccountSnapshot, BalanceSnapshot, OrderBookLevel, OrderBookSnapshot};
use crypto_oms::{
    CoreConfig, Deal, DepthUpdate, ExchangeContext, ExchangeError, Instrument, InstrumentId, MockExchange, Order,
    OrderObserver, OrderSide, OrderState, OrderStatus, Price, Size, SpotMarket, SpotTrader,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

fn p(v: &str) -> Price {
    Price::from_str(v).unwrap()
}

fn s(v: &str) -> Size {
    Size::from_str(v).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Deal(Size, Price),
    State(OrderState, OrderState),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn deals(&self) -> Vec<(Size, Price)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Deal(amount, price) => Some((amount, price)),
                Event::State(..) => None,
            })
            .collect()
    }
}

impl OrderObserver for Recorder {
    fn on_deal(&self, _order: &Order, deal: &Deal) {
        self.events.lock().push(Event::Deal(deal.amount, deal.price));
    }

    fn on_state_changed(&self, _order: &Order, from: OrderState, to: OrderState) {
        self.events.lock().push(Event::State(from, to));
    }
}

struct Session {
    exchange: Arc<MockExchange>,
    trader: Arc<SpotTrader>,
}

impl Session {
    fn ready() -> Self {
        let exchange = Arc::new(MockExchange::new("mock"));
        let ctx = ExchangeContext::new(exchange.clone(), CoreConfig::default());
        let id = InstrumentId::new("BTC-USDT");
        let market = SpotMarket::new(&ctx, Instrument::spot(id.clone(), "BTC", "USDT", p("0.1"), s("0.0001")));
        let trader = SpotTrader::new(&ctx, 11, market);

        exchange.push_depth(
            &id,
            DepthUpdate::Snapshot(OrderBookSnapshot::new(
                id.clone(),
                vec![OrderBookLevel::new(p("49990"), s("1"))],
                vec![OrderBookLevel::new(p("50010"), s("1"))],
                1,
            )),
        );
        ctx.apply_account_snapshot(&AccountSnapshot {
            balances: vec![
                BalanceSnapshot {
                    currency: "BTC".to_string(),
                    available: Decimal::from(5),
                },
                BalanceSnapshot {
                    currency: "USDT".to_string(),
                    available: Decimal::from(1_000_000),
                },
            ],
            positions: vec![],
            timestamp: Utc::now() - chrono::Duration::seconds(1),
        });
        ctx.set_connected(true);
        assert!(trader.ready(), "{}", trader.unready_reason());
        Self { exchange, trader }
    }

    async fn place(&self, side: OrderSide, price: &str, size: &str, recorder: &Arc<Recorder>) -> Arc<Order> {
        let order = self
            .trader
            .make_order(p(price), s(size), side, false, false, "lifecycle", Some(recorder.clone()))
            .await
            .unwrap();
        settle(|| order.state() != OrderState::Submitting).await;
        order
    }

    fn report(&self, order: &Order, status: OrderStatus, filled: &str, avg: &str) {
        let snapshot = self
            .exchange
            .order_snapshot(order.client_order_id(), status, s(filled), p(avg))
            .unwrap();
        self.exchange.push_order_snapshot(snapshot);
    }
}

async fn settle(done: impl Fn() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_partial_fills_then_filled() {
    let session = Session::ready();
    let recorder = Arc::new(Recorder::default());
    let order = session.place(OrderSide::Buy, "50000", "2", &recorder).await;
    assert_eq!(order.state(), OrderState::Live);
    assert!(order.exchange_order_id().is_some());

    session.report(&order, OrderStatus::PartiallyFilled, "0.5", "50000");
    session.report(&order, OrderStatus::PartiallyFilled, "0.5", "50000");
    session.report(&order, OrderStatus::PartiallyFilled, "1.5", "49990");
    session.report(&order, OrderStatus::Filled, "2", "49992.5");

    assert_eq!(order.state(), OrderState::Filled);
    assert!(order.is_finished());
    assert_eq!(order.filled(), s("2"));
    assert_eq!(order.remaining(), Size::ZERO);
    assert_eq!(
        recorder.deals(),
        vec![(s("0.5"), p("50000")), (s("1"), p("49985")), (s("0.5"), p("50000"))]
    );
    assert_eq!(
        recorder.events(),
        vec![
            Event::State(OrderState::Created, OrderState::Submitting),
            Event::State(OrderState::Submitting, OrderState::Live),
            Event::Deal(s("0.5"), p("50000")),
            Event::State(OrderState::Live, OrderState::PartiallyFilled),
            Event::Deal(s("1"), p("49985")),
            Event::Deal(s("0.5"), p("50000")),
            Event::State(OrderState::PartiallyFilled, OrderState::Filled),
        ]
    );
}

#[tokio::test]
async fn test_snapshots_after_terminal_state_are_ignored() {
    let session = Session::ready();
    let recorder = Arc::new(Recorder::default());
    let order = session.place(OrderSide::Sell, "50100", "1", &recorder).await;

    session.report(&order, OrderStatus::Cancelled, "0", "0");
    session.report(&order, OrderStatus::Filled, "1", "50100");

    assert_eq!(order.state(), OrderState::Cancelled);
    assert!(recorder.deals().is_empty());
    assert_eq!(order.filled(), Size::ZERO);
}

#[tokio::test]
async fn test_cancel_round_trip() {
    let session = Session::ready();
    let recorder = Arc::new(Recorder::default());
    let order = session.place(OrderSide::Buy, "49000", "1", &recorder).await;

    assert!(order.cancel());
    settle(|| !session.exchange.cancelled_orders().is_empty()).await;
    let cancelled = session.exchange.cancelled_orders();
    assert_eq!(cancelled[0].client_order_id, order.client_order_id());
    assert_eq!(cancelled[0].exchange_order_id, order.exchange_order_id());

    session.report(&order, OrderStatus::Cancelled, "0", "0");
    assert_eq!(order.state(), OrderState::Cancelled);
    assert!(!order.cancel());
}

#[tokio::test]
async fn test_venue_reject_carries_payload() {
    let session = Session::ready();
    session
        .exchange
        .set_place_error(Some(ExchangeError::rejected("51008", "insufficient balance")));
    let recorder = Arc::new(Recorder::default());
    let order = session
        .trader
        .make_order(p("50000"), s("1"), OrderSide::Buy, false, false, "reject", Some(recorder.clone()))
        .await
        .unwrap();
    settle(|| order.is_finished()).await;

    assert_eq!(order.state(), OrderState::Rejected);
    assert!(order.error().unwrap().contains("insufficient balance"));
    assert_eq!(
        recorder.events().last(),
        Some(&Event::State(OrderState::Submitting, OrderState::Rejected))
    );
}

#[tokio::test]
async fn test_observer_can_place_follow_up_order() {
    struct Hedger {
        trader: Arc<SpotTrader>,
        placed: Arc<Mutex<Vec<Arc<Order>>>>,
    }

    impl OrderObserver for Hedger {
        fn on_deal(&self, _order: &Order, deal: &Deal) {
            let trader = self.trader.clone();
            let placed = self.placed.clone();
            let amount = deal.amount;
            tokio::spawn(async move {
                if let Some(order) = trader
                    .make_order(p("50100"), amount, OrderSide::Sell, true, false, "hedge", None)
                    .await
                {
                    placed.lock().push(order);
                }
            });
        }
    }

    let session = Session::ready();
    let recorder = Arc::new(Recorder::default());
    let order = session.place(OrderSide::Buy, "50000", "1", &recorder).await;
    let placed = Arc::new(Mutex::new(Vec::new()));
    order.add_observer(Arc::new(Hedger {
        trader: session.trader.clone(),
        placed: placed.clone(),
    }));

    session.report(&order, OrderStatus::Filled, "1", "50000");
    settle(|| !placed.lock().is_empty()).await;

    let hedges = placed.lock().clone();
    assert_eq!(hedges.len(), 1);
    assert_eq!(hedges[0].side(), OrderSide::Sell);
    assert_eq!(hedges[0].size(), s("1"));
    assert!(hedges[0].make_only());
    assert_eq!(session.trader.orders().len(), 2);
}
