//! Strategy-facing order entry.
//!
//! A trader gates order creation on market, balance and connectivity
//! readiness, routes venue order snapshots to its live orders, and keeps the
//! balance or position ledger in step with fills until the next account
//! snapshot confirms them.

pub mod common;
pub mod contract;
pub mod live_orders;
pub mod spot;

pub use common::TraderCore;
pub use contract::ContractTrader;
pub use live_orders::LiveOrders;
pub use spot::SpotTrader;
