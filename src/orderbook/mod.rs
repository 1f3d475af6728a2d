pub mod orderbook;
pub mod types;

pub use orderbook::OrderBook;
pub use types::{OrderBookDelta, OrderBookLevel, OrderBookSnapshot};
