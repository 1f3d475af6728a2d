use super::order::{Deal, Order, OrderState};

/// Receives fills and state transitions of the orders it is attached to.
///
/// Callbacks for one order are delivered one at a time, in registration
/// order, from whichever task processed the venue update. Implementations
/// must not block.
#[cfg_attr(test, mockall::automock)]
pub trait OrderObserver: Send + Sync {
    fn on_deal(&self, order: &Order, deal: &Deal);

    fn on_state_changed(&self, _order: &Order, _from: OrderState, _to: OrderState) {}
}
