pub mod generator;
pub mod templates;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

pub use generator::ProgramGenerator;

pub const QUALITY_DISCARD_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn factor(self) -> f64 {
        match self {
            Complexity::Simple => 0.5,
            Complexity::Medium => 1.0,
            Complexity::Complex => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

/// A unit of digital inventory this agent owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub category: String,
    pub complexity: Complexity,
    pub price: u64,
    pub production_cost: u64,
    pub quality: f64,
    pub listed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_at: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_event_id: Option<nostr_sdk::EventId>,
}

impl Program {
    /// Per-tick quality decay, rate depending on the current quality band.
    pub fn decay_quality(&mut self) {
        let rate = if self.quality >= 0.8 {
            0.999
        } else if self.quality < 0.4 {
            0.995
        } else {
            0.998
        };
        self.quality *= rate;
    }

    pub fn should_discard(&self) -> bool {
        self.quality < QUALITY_DISCARD_THRESHOLD
    }
}

pub fn new_program_id() -> String {
    Uuid::new_v4().to_string()
}
