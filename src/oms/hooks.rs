use crate::core::events::{OrderSide, PositionSide, TradeMode};
use crate::ledger::Position;
use crate::types::Size;
use std::fmt;
use std::sync::Arc;

/// Chooses the position leg for an order: `(side, size, reduce_only)`
pub type PositionSideFn = Arc<dyn Fn(OrderSide, Size, bool) -> Option<PositionSide> + Send + Sync>;

pub type TradeModeFn = Arc<dyn Fn() -> Option<TradeMode> + Send + Sync>;

/// Venue- and product-specific request fields, injected into an otherwise
/// product-agnostic order. Both hooks default to "not sent".
#[derive(Clone, Default)]
pub struct OrderHooks {
    position_side: Option<PositionSideFn>,
    trade_mode: Option<TradeModeFn>,
}

impl OrderHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position_side(mut self, f: PositionSideFn) -> Self {
        self.position_side = Some(f);
        self
    }

    pub fn with_trade_mode(mut self, mode: TradeMode) -> Self {
        self.trade_mode = Some(Arc::new(move || Some(mode)));
        self
    }

    pub fn position_side(&self, side: OrderSide, size: Size, reduce_only: bool) -> Option<PositionSide> {
        self.position_side.as_ref().and_then(|f| f(side, size, reduce_only))
    }

    pub fn trade_mode(&self) -> Option<TradeMode> {
        self.trade_mode.as_ref().and_then(|f| f())
    }

    /// Long/short mode leg selection: close the opposite leg when it is large
    /// enough (or the order is reduce-only), otherwise open on the order's side.
    pub fn hedge_mode(position: Arc<Position>) -> PositionSideFn {
        Arc::new(move |side, size, reduce_only| {
            let leg = match side {
                OrderSide::Buy if reduce_only || position.short() >= size => PositionSide::Short,
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell if reduce_only || position.long() >= size => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            };
            Some(leg)
        })
    }
}

impl fmt::Debug for OrderHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderHooks")
            .field("position_side", &self.position_side.is_some())
            .field("trade_mode", &self.trade_mode())
            .finish()
    }
}
