pub mod exchange;

pub use exchange::{ExchangeAdapter, FeedCallback, FeedKind, Subscription};
