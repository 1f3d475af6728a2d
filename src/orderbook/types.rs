// Book payload types live with the other venue events
pub use crate::core::events::{OrderBookDelta, OrderBookLevel, OrderBookSnapshot};
