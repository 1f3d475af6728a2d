//! Balance and position bookkeeping shared across traders

pub mod balance;
pub mod manager;
pub mod position;

pub use balance::Balance;
pub use manager::{BalanceManager, PositionManager};
pub use position::Position;
