pub mod context;
pub mod error;
pub mod mock;

pub use context::ExchangeContext;
pub use error::ExchangeError;
pub use mock::MockExchange;
