pub mod config;
pub mod core;
pub mod error;
pub mod exchanges;
pub mod ledger;
pub mod logging;
pub mod market;
pub mod oms;
pub mod orderbook;
pub mod trader;
pub mod traits;
pub mod types;

pub use config::{CoreConfig, FeedTimeouts};
pub use core::events::{
    AccountSnapshot, BalanceSnapshot, DepthUpdate, OrderSide, OrderSnapshot, OrderStatus, PositionMode,
    PositionSide, PositionSnapshot, TradeMode,
};
pub use error::{Error, Result};
pub use exchanges::{ExchangeContext, ExchangeError, MockExchange};
pub use ledger::{Balance, BalanceManager, Position, PositionManager};
pub use logging::init_logging;
pub use market::{DerivativeMarket, FutureMarket, Market, SpotMarket};
pub use oms::{Deal, Order, OrderError, OrderHooks, OrderObserver, OrderParams, OrderState, PriceRange};
pub use orderbook::{OrderBook, OrderBookDelta, OrderBookLevel, OrderBookSnapshot};
pub use trader::{ContractTrader, SpotTrader};
pub use traits::{ExchangeAdapter, FeedCallback, FeedKind, Subscription};
pub use types::{Instrument, InstrumentId, Price, ProductType, Size};
