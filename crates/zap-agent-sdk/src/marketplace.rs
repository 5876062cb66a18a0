//! Marketplace view (C3): accumulates externally-observed listings, expires
//! stale ones, and scores candidates for purchase.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use nostr_sdk::{Event, EventBuilder, EventId, Keys, PublicKey, Tag, TagKind};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::KIND_LISTING;

const STALE_AFTER: Duration = Duration::from_secs(30 * 60);
const SCORE_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingContent {
    pub name: String,
    pub description: String,
    pub language: String,
    pub version: String,
    pub category: String,
    pub complexity: String,
    pub price: u64,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ObservedListing {
    pub seller: PublicKey,
    pub d_tag: String,
    pub event_id: EventId,
    pub content: ListingContent,
    pub observed_at: SystemTime,
}

impl ObservedListing {
    pub fn is_stale(&self, now: SystemTime) -> bool {
        now.duration_since(self.observed_at).unwrap_or_default() > STALE_AFTER
    }
}

#[derive(Default)]
pub struct Marketplace {
    listings: HashMap<String, ObservedListing>,
}

impl Marketplace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert keyed by d-tag.
    pub fn on_listing(&mut self, event: &Event) {
        let Some(d_tag) = find_tag_prefixed(event, "d") else {
            return;
        };
        let Ok(content) = serde_json::from_str::<ListingContent>(&event.content) else {
            return;
        };
        self.listings.insert(
            d_tag.clone(),
            ObservedListing {
                seller: event.pubkey,
                d_tag,
                event_id: event.id,
                content,
                observed_at: SystemTime::now(),
            },
        );
    }

    pub fn get(&self, d_tag: &str) -> Option<&ObservedListing> {
        self.listings.get(d_tag)
    }

    /// Drop any cached listing whose originating event matches a kind-5
    /// deletion's referenced id (a seller delisting a program).
    pub fn remove_by_event_id(&mut self, event_id: EventId) {
        self.listings.retain(|_, l| l.event_id != event_id);
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings not from `own_pubkey`, with a positive price, observed
    /// within the freshness window, and passing the scoring predicate.
    pub fn get_interesting_listings<R: BuyScoreContext>(
        &self,
        own_pubkey: &PublicKey,
        ctx: &R,
    ) -> Vec<&ObservedListing> {
        let now = SystemTime::now();
        let mut candidates: Vec<&ObservedListing> = self
            .listings
            .values()
            .filter(|l| &l.seller != own_pubkey)
            .filter(|l| l.content.price > 0)
            .filter(|l| !l.is_stale(now))
            .filter(|l| score_listing(l, ctx) >= SCORE_THRESHOLD)
            .filter(|l| l.content.price as f64 <= ctx.budget_limit())
            .filter(|l| ctx.trust_of(&l.seller) >= ctx.trust_minimum())
            .collect();
        candidates.sort_by(|a, b| a.content.price.cmp(&b.content.price));
        candidates
    }
}

/// Narrow context the scoring predicate needs, implemented by the agent so
/// marketplace scoring can be unit-tested without a back-pointer to it.
pub trait BuyScoreContext {
    fn owned_categories(&self) -> &[String];
    fn is_specialist_category(&self, category: &str) -> bool;
    fn estimated_value(&self, listing: &ObservedListing) -> f64;
    fn budget_limit(&self) -> f64;
    fn trust_minimum(&self) -> f64;
    fn trust_of(&self, peer: &PublicKey) -> f64;
}

fn score_listing<R: BuyScoreContext>(listing: &ObservedListing, ctx: &R) -> f64 {
    let mut score = 0.0;
    if !ctx.owned_categories().contains(&listing.content.category) {
        score += 0.4;
    }
    if ctx.owned_categories().len() < 5 {
        score += 0.2;
    }
    if ctx.is_specialist_category(&listing.content.category) {
        score += 0.2;
    }
    if listing.content.price as f64 <= ctx.estimated_value(listing) {
        score += 0.2;
    }
    score += rand::thread_rng().gen_range(0.0..0.1);
    score
}

fn find_tag_prefixed(event: &Event, name: &str) -> Option<String> {
    event.tags.iter().find_map(|t| {
        let v = t.as_slice();
        if v.len() >= 2 && v[0] == name {
            Some(v[1].to_string())
        } else {
            None
        }
    })
}

/// Build the kind-30078 listing event described in the spec.
pub fn build_listing_event(
    keys: &Keys,
    program_id: &str,
    category: &str,
    content: &ListingContent,
) -> Result<Event> {
    let json = serde_json::to_string(content)?;
    let tags = vec![
        Tag::identifier(program_id),
        Tag::hashtag("python"),
        Tag::hashtag(category),
        Tag::custom(TagKind::custom("price"), vec![content.price.to_string()]),
    ];
    EventBuilder::new(KIND_LISTING, json)
        .tags(tags)
        .sign_with_keys(keys)
        .map_err(|e| crate::Error::EventBuilder(e.to_string()))
}

/// Build the kind-5 deletion event that delists a listing.
pub fn build_delist_event(keys: &Keys, listing_event_id: EventId) -> Result<Event> {
    EventBuilder::new(crate::KIND_DELETION, "")
        .tag(Tag::event(listing_event_id))
        .sign_with_keys(keys)
        .map_err(|e| crate::Error::EventBuilder(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        owned: Vec<String>,
        specialist: Vec<String>,
        budget: f64,
        trust_min: f64,
    }

    impl BuyScoreContext for Ctx {
        fn owned_categories(&self) -> &[String] {
            &self.owned
        }
        fn is_specialist_category(&self, category: &str) -> bool {
            self.specialist.iter().any(|c| c == category)
        }
        fn estimated_value(&self, listing: &ObservedListing) -> f64 {
            listing.content.price as f64 * 1.5
        }
        fn budget_limit(&self) -> f64 {
            self.budget
        }
        fn trust_minimum(&self) -> f64 {
            self.trust_min
        }
        fn trust_of(&self, _peer: &PublicKey) -> f64 {
            0.5
        }
    }

    fn listing(price: u64, category: &str) -> ObservedListing {
        ObservedListing {
            seller: Keys::generate().public_key(),
            d_tag: "abc".into(),
            event_id: nostr_sdk::EventBuilder::new(nostr_sdk::Kind::TextNote, "x")
                .sign_with_keys(&Keys::generate())
                .unwrap()
                .id,
            content: ListingContent {
                name: "thing".into(),
                description: "d".into(),
                language: "python".into(),
                version: "1".into(),
                category: category.into(),
                complexity: "simple".into(),
                price,
                preview: "print(1)".into(),
                quality: Some(0.9),
            },
            observed_at: SystemTime::now(),
        }
    }

    #[test]
    fn new_category_scores_above_threshold() {
        let ctx = Ctx {
            owned: vec![],
            specialist: vec![],
            budget: 1000.0,
            trust_min: 0.0,
        };
        let l = listing(50, "math");
        assert!(score_listing(&l, &ctx) >= SCORE_THRESHOLD);
    }

    #[test]
    fn stale_listing_is_excluded() {
        let mut l = listing(50, "math");
        l.observed_at = SystemTime::now() - Duration::from_secs(31 * 60);
        assert!(l.is_stale(SystemTime::now()));
    }
}
