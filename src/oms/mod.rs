pub mod client_id;
pub mod hooks;
pub mod observer;
pub mod order;

pub use hooks::OrderHooks;
pub use observer::OrderObserver;
pub use order::{Deal, Order, OrderError, OrderParams, OrderState, PriceRange, SnapshotRoute};
