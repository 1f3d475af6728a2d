pub mod events;
pub mod shutdown;

pub use shutdown::StopSignal;
