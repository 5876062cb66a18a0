//! Buy/sell decision engine: personality-parameterized pricing, the buy
//! predicate, and per-tick action selection.

use rand::Rng;

use crate::marketplace::{BuyScoreContext, ObservedListing};
use crate::personality::Personality;
use crate::program::templates::{base_price, CATEGORIES};
use crate::program::Complexity;

/// Starting wallet balance minted for a brand-new agent (AMBIENT: the
/// wallet is an external black box in the spec, but the simulation needs
/// a seed balance for `balance_factor` in action selection to mean
/// anything on first boot).
pub const INITIAL_BALANCE_SATS: u64 = 10_000;
const INITIAL_BALANCE: f64 = INITIAL_BALANCE_SATS as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Buy,
    AdjustPrices,
    Idle,
}

pub struct Strategy {
    pub personality: Personality,
}

impl Strategy {
    pub fn new(personality: Personality) -> Self {
        Self { personality }
    }

    pub fn budget_limit(&self, balance: u64) -> f64 {
        balance as f64 * self.personality.params().spending_ratio
    }

    /// List price for a freshly generated program, with +/-10% jitter.
    pub fn calculate_program_price(&self, category: &str, complexity: Complexity) -> u64 {
        let raw = base_price(category) as f64 * complexity.factor() * self.personality.params().price_multiplier;
        let variation = rand::thread_rng().gen_range(0.9..=1.1);
        (raw * variation).round().max(10.0) as u64
    }

    /// Offer price for a marketplace listing: aggressive personalities bid
    /// low, conservative ones bid close to the listed price.
    pub fn calculate_offer_price(&self, listing: &ObservedListing, balance: u64) -> u64 {
        let listed_price = listing.content.price;
        if listed_price == 0 {
            return 0;
        }
        let multiplier = self.personality.params().price_multiplier;
        let mut rng = rand::thread_rng();
        let offer = if multiplier < 1.0 {
            listed_price as f64 * rng.gen_range(0.80..=0.95)
        } else if multiplier > 1.1 {
            listed_price as f64 * rng.gen_range(0.90..=1.00)
        } else {
            listed_price as f64 * rng.gen_range(0.85..=1.00)
        };
        (offer.max(1.0) as u64).min(self.budget_limit(balance) as u64)
    }

    fn estimate_value(&self, listing: &ObservedListing, seller_trust: f64) -> f64 {
        let base = base_price(&listing.content.category) as f64;
        let factor = match listing.content.complexity.as_str() {
            "simple" => 0.5,
            "complex" => 2.0,
            _ => 1.0,
        };
        let trust_factor = 0.5 + seller_trust * 0.5;
        base * factor * trust_factor
    }

    pub fn should_accept_offer(&self, listing_price: u64, offer_sats: u64, buyer_trust: f64) -> bool {
        let params = self.personality.params();
        if buyer_trust < params.trust_minimum {
            return false;
        }
        offer_sats as f64 >= listing_price as f64 * params.accept_threshold
    }

    pub fn get_counter_offer(&self, listing_price: u64, offer_sats: u64) -> Option<u64> {
        if offer_sats as f64 >= listing_price as f64 * 0.5 {
            Some((listing_price as f64 * self.personality.params().accept_threshold).round() as u64)
        } else {
            None
        }
    }

    /// Category for the next generated program: specialists lean on their
    /// focus list 70% of the time, otherwise uniform random.
    pub fn select_category(&self) -> String {
        let mut rng = rand::thread_rng();
        if !self.personality.category_focus.is_empty() && rng.gen_bool(0.7) {
            use rand::seq::SliceRandom;
            self.personality.category_focus.choose(&mut rng).cloned().unwrap()
        } else {
            use rand::seq::SliceRandom;
            CATEGORIES.choose(&mut rng).unwrap().to_string()
        }
    }

    /// The per-tick action decision tree.
    pub fn select_action(&self, balance: u64, active_trades: usize, has_listings: bool, any_own_listed: bool) -> Action {
        if active_trades >= 3 {
            return Action::Idle;
        }

        let mut rng = rand::thread_rng();

        if has_listings && balance > 500 && rng.gen_bool(0.3) {
            return Action::Buy;
        }

        let params = self.personality.params();
        let mut creation_prob = params.creation_rate.base_prob();
        if (balance as f64) < INITIAL_BALANCE * 0.2 {
            creation_prob *= 1.5;
        } else if (balance as f64) > INITIAL_BALANCE * 1.5 {
            creation_prob *= 0.7;
        }
        if !self.personality.category_focus.is_empty() {
            creation_prob *= 1.2;
        }
        if rng.gen_bool(creation_prob.clamp(0.0, 1.0)) {
            return Action::Create;
        }

        if any_own_listed && rng.gen_bool(0.15) {
            return Action::AdjustPrices;
        }

        Action::Idle
    }
}

impl BuyScoreContext for StrategyBuyCtx<'_> {
    fn owned_categories(&self) -> &[String] {
        self.owned_categories
    }
    fn is_specialist_category(&self, category: &str) -> bool {
        self.strategy.personality.is_specialist_category(category)
    }
    fn estimated_value(&self, listing: &ObservedListing) -> f64 {
        self.strategy.estimate_value(listing, self.reputation.get_trust(&listing.seller))
    }
    fn budget_limit(&self) -> f64 {
        self.strategy.budget_limit(self.balance)
    }
    fn trust_minimum(&self) -> f64 {
        self.strategy.personality.params().trust_minimum
    }
    fn trust_of(&self, peer: &nostr_sdk::PublicKey) -> f64 {
        self.reputation.get_trust(peer)
    }
}

/// Narrow per-call context satisfying `BuyScoreContext`, built fresh for
/// each marketplace scan. Holds the reputation ledger (rather than one
/// fixed trust value) so a single scan scores listings from many distinct
/// sellers correctly.
pub struct StrategyBuyCtx<'a> {
    pub strategy: &'a Strategy,
    pub owned_categories: &'a [String],
    pub balance: u64,
    pub reputation: &'a crate::reputation::ReputationLedger,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::{for_agent_slot, Archetype};

    #[test]
    fn aggressive_offers_below_listed_price() {
        let strategy = Strategy::new(for_agent_slot(2));
        assert_eq!(strategy.personality.archetype, Archetype::Aggressive);
    }

    #[test]
    fn three_active_trades_forces_idle() {
        let strategy = Strategy::new(for_agent_slot(0));
        assert_eq!(strategy.select_action(5000, 3, true, true), Action::Idle);
    }

    #[test]
    fn accept_offer_requires_both_trust_and_price() {
        let strategy = Strategy::new(for_agent_slot(0)); // conservative: accept 0.9, trust_min 0.4
        assert!(!strategy.should_accept_offer(100, 95, 0.3));
        assert!(!strategy.should_accept_offer(100, 80, 0.9));
        assert!(strategy.should_accept_offer(100, 95, 0.9));
    }

    #[test]
    fn counter_offer_present_above_half_listed_price() {
        let strategy = Strategy::new(for_agent_slot(0));
        assert!(strategy.get_counter_offer(100, 60).is_some());
        assert!(strategy.get_counter_offer(100, 40).is_none());
    }
}
