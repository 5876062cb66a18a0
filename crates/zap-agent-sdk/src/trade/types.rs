//! Trade data model: the unit of negotiation and its five-state lifecycle.

use nostr_sdk::{EventId, PublicKey};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub const OFFER_TIMEOUT: Duration = Duration::from_secs(60);
pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(120);

pub const MAX_ACTIVE_BUYER_TRADES: usize = 3;
pub const MAX_ACTIVE_SELLER_TRADES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Offered,
    Accepted,
    Paid,
    Delivered,
    Complete,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub offer_id: String,
    pub role: Role,
    pub state: TradeState,
    pub counterparty: PublicKey,
    pub listing_id: String,
    pub amount_sats: u64,
    #[serde(with = "system_time_secs")]
    pub started_at: SystemTime,
    #[serde(with = "system_time_secs")]
    pub deadline: SystemTime,
    pub payment_event_id: Option<EventId>,
    pub delivery_event_id: Option<EventId>,
}

impl Trade {
    pub fn new_offer(
        offer_id: String,
        role: Role,
        counterparty: PublicKey,
        listing_id: String,
        amount_sats: u64,
        now: SystemTime,
    ) -> Self {
        Self {
            offer_id,
            role,
            state: TradeState::Offered,
            counterparty,
            listing_id,
            amount_sats,
            started_at: now,
            deadline: now + OFFER_TIMEOUT,
            payment_event_id: None,
            delivery_event_id: None,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.deadline < now
    }
}

mod system_time_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::Keys;

    #[test]
    fn new_offer_has_sixty_second_deadline() {
        let now = SystemTime::now();
        let trade = Trade::new_offer(
            "abc".into(),
            Role::Buyer,
            Keys::generate().public_key(),
            "listing".into(),
            90,
            now,
        );
        assert_eq!(trade.state, TradeState::Offered);
        assert_eq!(trade.deadline, now + OFFER_TIMEOUT);
        assert!(!trade.is_expired(now));
        assert!(trade.is_expired(now + OFFER_TIMEOUT + Duration::from_secs(1)));
    }
}
