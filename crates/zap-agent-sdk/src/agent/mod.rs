//! The agent loop (C5): boots one agent, then drives its listen/tick/
//! persist activity until shutdown.

pub mod loop_;
pub mod state;

pub use loop_::Agent;
pub use state::{AgentStateSnapshot, Stats};
