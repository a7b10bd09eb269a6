//! Protocol implementations.

pub mod exchange;
pub mod stk500;

// Re-export common types
pub use exchange::{ExchangeTiming, FrameExchange, MAX_TRIES, RX_WAIT_TIMEOUT};
pub use stk500::{Command, CommandFrame};
