mod decimal;
pub mod instrument;
pub mod price;
pub mod size;

pub use instrument::{Instrument, InstrumentId, ProductType};
pub use price::Price;
pub use size::Size;
