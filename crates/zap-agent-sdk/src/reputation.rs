//! Per-peer trust ledger (C2): event-driven adjustments, mean-reversion
//! decay, on-disk persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nostr_sdk::PublicKey;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_TRUST: f64 = 0.5;

/// The kind of outcome being recorded against a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustEvent {
    TradeSuccess,
    PaymentFailed,
    DeliveryTimeout,
    OfferTimeout,
    TradeRejected,
}

impl TrustEvent {
    fn delta(self) -> f64 {
        match self {
            TrustEvent::TradeSuccess => 0.10,
            TrustEvent::PaymentFailed => -0.30,
            TrustEvent::DeliveryTimeout => -0.40,
            TrustEvent::OfferTimeout => -0.05,
            TrustEvent::TradeRejected => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub trust: f64,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub last_trade_ts: Option<i64>,
    pub total_sats_exchanged: u64,
}

impl Default for ReputationRecord {
    fn default() -> Self {
        Self {
            trust: DEFAULT_TRUST,
            total_trades: 0,
            successful_trades: 0,
            failed_trades: 0,
            last_trade_ts: None,
            total_sats_exchanged: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReputationLedger {
    records: HashMap<PublicKey, ReputationRecord>,
    path: Option<PathBuf>,
}

impl ReputationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let records = if path.is_file() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            records,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn get_trust(&self, pk: &PublicKey) -> f64 {
        self.records.get(pk).map(|r| r.trust).unwrap_or(DEFAULT_TRUST)
    }

    pub fn update_trust(&mut self, pk: PublicKey, event: TrustEvent, amount_sats: u64) {
        let record = self.records.entry(pk).or_default();
        record.trust = (record.trust + event.delta()).clamp(0.0, 1.0);
        record.total_trades += 1;
        match event {
            TrustEvent::TradeSuccess => record.successful_trades += 1,
            TrustEvent::PaymentFailed | TrustEvent::DeliveryTimeout | TrustEvent::OfferTimeout => {
                record.failed_trades += 1
            }
            TrustEvent::TradeRejected => {}
        }
        record.total_sats_exchanged += amount_sats;
        record.last_trade_ts = Some(chrono::Utc::now().timestamp());
    }

    /// Mean-reversion decay toward the neutral default, applied once per tick.
    pub fn decay_all(&mut self) {
        for record in self.records.values_mut() {
            record.trust = (0.99 * record.trust + 0.01 * DEFAULT_TRUST).clamp(0.0, 1.0);
        }
    }

    pub fn all_scores(&self) -> &HashMap<PublicKey, ReputationRecord> {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::Keys;

    fn pk() -> PublicKey {
        Keys::generate().public_key()
    }

    #[test]
    fn unknown_peer_defaults_to_neutral_trust() {
        let ledger = ReputationLedger::new();
        assert_eq!(ledger.get_trust(&pk()), 0.5);
    }

    #[test]
    fn trade_success_then_decay_matches_scenario_one() {
        let mut ledger = ReputationLedger::new();
        let peer = pk();
        ledger.update_trust(peer, TrustEvent::TradeSuccess, 90);
        assert!((ledger.get_trust(&peer) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn trust_never_leaves_zero_one() {
        let mut ledger = ReputationLedger::new();
        let peer = pk();
        for _ in 0..20 {
            ledger.update_trust(peer, TrustEvent::DeliveryTimeout, 0);
        }
        assert!(ledger.get_trust(&peer) >= 0.0);
        for _ in 0..20 {
            ledger.update_trust(peer, TrustEvent::TradeSuccess, 0);
        }
        assert!(ledger.get_trust(&peer) <= 1.0);
    }

    #[test]
    fn decay_moves_toward_neutral() {
        let mut ledger = ReputationLedger::new();
        let peer = pk();
        ledger.update_trust(peer, TrustEvent::TradeSuccess, 0);
        let before = ledger.get_trust(&peer);
        ledger.decay_all();
        let after = ledger.get_trust(&peer);
        assert!(after < before);
        assert!(after > 0.5);
    }

    #[test]
    fn persists_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reputation.json");
        let peer = pk();
        {
            let mut ledger = ReputationLedger::load(&path).unwrap();
            ledger.update_trust(peer, TrustEvent::TradeSuccess, 90);
            ledger.save().unwrap();
        }
        let reloaded = ReputationLedger::load(&path).unwrap();
        assert!((reloaded.get_trust(&peer) - 0.6).abs() < 1e-9);
    }
}
