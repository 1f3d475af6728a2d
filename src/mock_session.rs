//! End-to-end session against the in-memory exchange: feeds come up, the
//! trader turns ready, one buy order is filled in two parts and the ledger
//! follows the fills.

use crypto_oms::{
    init_logging, AccountSnapshot, BalanceSnapshot, CoreConfig, Deal, DepthUpdate, ExchangeContext, Instrument,
    InstrumentId, MockExchange, Order, OrderBookLevel, OrderBookSnapshot, OrderObserver, OrderSide, OrderState,
    OrderStatus, Price, Size, SpotMarket, SpotTrader,
};
use log::{info, warn};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Duration;

/// Prints every fill and transition of the orders it watches
struct FillPrinter;

impl OrderObserver for FillPrinter {
    fn on_deal(&self, order: &Order, deal: &Deal) {
        info!(
            "[session] deal on {}: {} {} @ {} (filled {}/{})",
            order.client_order_id(),
            deal.side,
            deal.amount,
            deal.price,
            order.filled(),
            order.size()
        );
    }

    fn on_state_changed(&self, order: &Order, from: OrderState, to: OrderState) {
        info!("[session] {} {} -> {}", order.client_order_id(), from, to);
    }
}

fn price(v: &str) -> crypto_oms::Result<Price> {
    Price::from_str(v).map_err(|e| crypto_oms::Error::Config(format!("bad price {}: {}", v, e)))
}

fn size(v: &str) -> crypto_oms::Result<Size> {
    Size::from_str(v).map_err(|e| crypto_oms::Error::Config(format!("bad size {}: {}", v, e)))
}

#[tokio::main]
async fn main() -> crypto_oms::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::default(),
    };
    init_logging(config.log_level(), None)?;

    let exchange = Arc::new(MockExchange::new("mock"));
    exchange.set_account(AccountSnapshot {
        balances: vec![
            BalanceSnapshot {
                currency: "BTC".to_string(),
                available: Decimal::ZERO,
            },
            BalanceSnapshot {
                currency: "USDT".to_string(),
                available: Decimal::from(150_000),
            },
        ],
        positions: vec![],
        timestamp: chrono::Utc::now(),
    });

    let ctx = ExchangeContext::new(exchange.clone(), config);
    ctx.sync_account().await?;
    let account_sync = ctx.start_account_sync();
    ctx.set_connected(true);

    let id = InstrumentId::new("BTC-USDT");
    let instrument = Instrument::spot(id.clone(), "BTC", "USDT", price("0.1")?, size("0.0001")?);
    let market = SpotMarket::new(&ctx, instrument);
    let trader = SpotTrader::new(&ctx, 1, market);
    info!("[session] before depth: {}", trader.unready_reason());

    exchange.push_depth(
        &id,
        DepthUpdate::Snapshot(OrderBookSnapshot::new(
            id.clone(),
            vec![
                OrderBookLevel::new(price("49999.9")?, size("1.2")?),
                OrderBookLevel::new(price("49999.5")?, size("3")?),
            ],
            vec![
                OrderBookLevel::new(price("50000.1")?, size("0.8")?),
                OrderBookLevel::new(price("50000.6")?, size("2.5")?),
            ],
            chrono::Utc::now().timestamp_millis().max(0) as u64,
        )),
    );
    info!("[session] trader ready: {}", trader.ready());

    let buy_price = price("50000")?;
    let amount = trader.available_amount(OrderSide::Buy, buy_price).min(size("2")?);
    let Some(order) = trader
        .make_order(buy_price, amount, OrderSide::Buy, false, false, "session", Some(Arc::new(FillPrinter)))
        .await
    else {
        warn!("[session] no order made: {}", trader.unready_reason());
        ctx.shutdown();
        return Ok(());
    };

    while order.state() == OrderState::Submitting {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let half = Size::new(amount.value() / Decimal::TWO);
    for (status, filled) in [(OrderStatus::PartiallyFilled, half), (OrderStatus::Filled, amount)] {
        if let Some(snapshot) = exchange.order_snapshot(order.client_order_id(), status, filled, buy_price) {
            exchange.push_order_snapshot(snapshot);
        }
    }

    println!("{}", trader);
    println!("{}", ctx.balances());

    trader.uninit();
    ctx.shutdown();
    if let Err(e) = account_sync.await {
        warn!("[session] account sync task failed: {}", e);
    }
    Ok(())
}
