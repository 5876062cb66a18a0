pub mod engine;
pub mod types;

pub use engine::{TradeCtx, TradeEngine};
pub use types::{Role, Trade, TradeState};
