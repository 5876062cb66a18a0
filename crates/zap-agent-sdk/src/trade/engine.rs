//! Buyer/seller trade state machine (C4): dispatches incoming trade-kind
//! events, drives the OFFERED -> ACCEPTED -> PAID -> DELIVERED -> COMPLETE
//! lifecycle, and sweeps expired trades on each tick.

use std::collections::HashMap;
use std::path::Path;

use nostr_sdk::nips::nip04;
use nostr_sdk::{Event, EventBuilder, Keys, PublicKey, Tag, TagKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::program::Program;
use crate::relay::RelayClient;
use crate::reputation::{ReputationLedger, TrustEvent};
use crate::{KIND_TRADE_ACCEPT, KIND_TRADE_COMPLETE, KIND_TRADE_OFFER, KIND_TRADE_PAYMENT, KIND_TRADE_REJECT};
use zap_wallet::Wallet;

use super::types::{Role, Trade, TradeState, DELIVERY_TIMEOUT, MAX_ACTIVE_SELLER_TRADES, PAYMENT_TIMEOUT};

/// The capabilities the trade engine needs from the rest of the agent,
/// bundled per call instead of holding a back-pointer to a full agent type.
pub struct TradeCtx<'a> {
    pub my_keys: &'a Keys,
    pub relay: &'a mut RelayClient,
    pub wallet: &'a mut dyn Wallet,
    pub reputation: &'a mut ReputationLedger,
    pub programs: &'a mut Vec<Program>,
    pub sources: &'a HashMap<String, String>,
    /// This agent's data directory, used to persist a bought program's
    /// source on delivery.
    pub data_dir: &'a Path,
    /// Mint the seller advertises in a trade-accept so the buyer knows
    /// where to redeem the token it's about to receive.
    pub mint_url: &'a str,
    /// Minimum fraction of listed price a seller will accept from an offer.
    pub accept_threshold: f64,
    /// Minimum buyer trust required to accept an offer.
    pub trust_minimum: f64,
}

#[derive(Default)]
pub struct TradeEngine {
    pub active: HashMap<String, Trade>,
    pub programs_sold: u64,
    pub programs_bought: u64,
    pub total_sats_earned: u64,
    pub total_sats_spent: u64,
    pub trades_completed: u64,
    pub trades_failed: u64,
}

#[derive(Serialize, Deserialize)]
struct OfferContent {
    listing_id: String,
    offer_sats: u64,
    #[serde(default)]
    message: String,
}

#[derive(Serialize, Deserialize)]
struct AcceptContent {
    listing_id: String,
    accepted_sats: u64,
    mint_url: String,
}

#[derive(Serialize, Deserialize)]
struct PaymentContent {
    listing_id: String,
    token: String,
    amount_sats: u64,
    payment_id: String,
}

#[derive(Serialize, Deserialize)]
struct DeliveryContent {
    listing_id: String,
    language: String,
    source: String,
    sha256: String,
}

impl TradeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_seller_trades(&self) -> usize {
        self.active
            .values()
            .filter(|t| t.role == Role::Seller && !matches!(t.state, TradeState::Complete | TradeState::Rejected))
            .count()
    }

    pub async fn dispatch(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        if event.kind == KIND_TRADE_OFFER {
            self.on_trade_offer(event, ctx).await
        } else if event.kind == KIND_TRADE_ACCEPT {
            self.on_trade_accept(event, ctx).await
        } else if event.kind == KIND_TRADE_REJECT {
            self.on_trade_reject(event, ctx)
        } else if event.kind == KIND_TRADE_PAYMENT {
            self.on_payment_received(event, ctx).await
        } else if event.kind == crate::KIND_TRADE_DELIVERY {
            self.on_program_delivery(event, ctx).await
        } else if event.kind == KIND_TRADE_COMPLETE {
            self.on_trade_complete(event, ctx)
        } else {
            Ok(())
        }
    }

    /// Buyer side: send a trade offer (kind 4200) for a listing.
    pub async fn send_offer(
        &mut self,
        seller: PublicKey,
        listing_event_id: nostr_sdk::EventId,
        listing_id: String,
        offer_sats: u64,
        ctx: &mut TradeCtx<'_>,
    ) -> Result<String> {
        let offer_id = short_id();
        let content = serde_json::to_string(&OfferContent {
            listing_id: listing_id.clone(),
            offer_sats,
            message: String::new(),
        })?;
        let event = EventBuilder::new(KIND_TRADE_OFFER, content)
            .tags(vec![
                p_tag(seller),
                e_tag(listing_event_id, "root"),
                offer_id_tag(&offer_id),
            ])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&event).await?;

        let now = SystemTime::now();
        let mut trade = Trade::new_offer(offer_id.clone(), Role::Buyer, seller, listing_id, offer_sats, now);
        trade.deadline = now + super::types::OFFER_TIMEOUT;
        self.active.insert(offer_id.clone(), trade);
        Ok(offer_id)
    }

    /// Seller side: an incoming offer (kind 4200).
    async fn on_trade_offer(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Ok(content) = serde_json::from_str::<OfferContent>(&event.content) else {
            return Ok(());
        };
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };

        let Some(program) = ctx.programs.iter().find(|p| p.id == content.listing_id) else {
            return Ok(());
        };
        let listed_price = program.price;

        if self.active_seller_trades() >= MAX_ACTIVE_SELLER_TRADES {
            log::info!("too many active seller trades, ignoring offer {offer_id}");
            return Ok(());
        }

        let buyer_trust = ctx.reputation.get_trust(&event.pubkey);
        let accept = buyer_trust >= ctx.trust_minimum
            && content.offer_sats as f64 >= listed_price as f64 * ctx.accept_threshold;

        if accept {
            self.send_accept(event, &offer_id, &content.listing_id, content.offer_sats, event.pubkey, ctx)
                .await?;
        } else {
            self.send_reject(event, &offer_id, &content.listing_id, listed_price, content.offer_sats, event.pubkey, ctx)
                .await?;
        }
        Ok(())
    }

    async fn send_accept(
        &mut self,
        offer_event: &Event,
        offer_id: &str,
        listing_id: &str,
        accepted_sats: u64,
        buyer: PublicKey,
        ctx: &mut TradeCtx<'_>,
    ) -> Result<()> {
        let content = json!({
            "listing_id": listing_id,
            "accepted_sats": accepted_sats,
            "mint_url": ctx.mint_url,
        })
        .to_string();
        let event = EventBuilder::new(KIND_TRADE_ACCEPT, content)
            .tags(vec![p_tag(buyer), e_tag(offer_event.id, "reply"), offer_id_tag(offer_id)])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&event).await?;

        let now = SystemTime::now();
        let mut trade = Trade::new_offer(
            offer_id.to_string(),
            Role::Seller,
            buyer,
            listing_id.to_string(),
            accepted_sats,
            now,
        );
        trade.state = TradeState::Accepted;
        trade.deadline = now + PAYMENT_TIMEOUT;
        self.active.insert(offer_id.to_string(), trade);
        Ok(())
    }

    async fn send_reject(
        &mut self,
        offer_event: &Event,
        offer_id: &str,
        listing_id: &str,
        listed_price: u64,
        offer_sats: u64,
        buyer: PublicKey,
        ctx: &mut TradeCtx<'_>,
    ) -> Result<()> {
        // Counter-offer only if the buyer's offer was at least half the
        // listed price; otherwise a flat reject with no counter.
        let counter = if offer_sats as f64 >= listed_price as f64 * 0.5 {
            Some((listed_price as f64 * ctx.accept_threshold).round() as u64)
        } else {
            None
        };
        let mut body = json!({
            "listing_id": listing_id,
            "reason": "price too low",
        });
        if let Some(c) = counter {
            body["counter_offer_sats"] = json!(c);
        }
        let event = EventBuilder::new(KIND_TRADE_REJECT, body.to_string())
            .tags(vec![p_tag(buyer), e_tag(offer_event.id, "reply"), offer_id_tag(offer_id)])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&event).await?;
        Ok(())
    }

    /// Buyer side: seller accepted (kind 4201), pay.
    async fn on_trade_accept(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };
        let Some(trade) = self.active.get(&offer_id) else {
            return Ok(());
        };
        if trade.role != Role::Buyer || trade.state != TradeState::Offered {
            return Ok(());
        }
        let Ok(content) = serde_json::from_str::<AcceptContent>(&event.content) else {
            return Ok(());
        };

        let amount = content.accepted_sats;
        let token = ctx.wallet.create_payment(amount)?;

        let payment_id = short_id();
        let plaintext = serde_json::to_string(&PaymentContent {
            listing_id: content.listing_id,
            token,
            amount_sats: amount,
            payment_id,
        })?;
        let encrypted = nip04::encrypt(ctx.my_keys.secret_key(), &event.pubkey, plaintext)
            .map_err(|e| Error::Nip04(e.to_string()))?;

        let payment_event = EventBuilder::new(KIND_TRADE_PAYMENT, encrypted)
            .tags(vec![p_tag(event.pubkey), e_tag(event.id, "reply"), offer_id_tag(&offer_id)])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&payment_event).await?;

        let trade = self.active.get_mut(&offer_id).expect("checked above");
        trade.state = TradeState::Paid;
        trade.deadline = SystemTime::now() + DELIVERY_TIMEOUT;
        Ok(())
    }

    fn on_trade_reject(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };
        if self.active.remove(&offer_id).is_some() {
            ctx.reputation.update_trust(event.pubkey, TrustEvent::TradeRejected, 0);
        }
        Ok(())
    }

    /// Seller side: payment arrived (kind 4204) encrypted; redeem and deliver.
    async fn on_payment_received(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };
        let Some(trade) = self.active.get(&offer_id) else {
            return Ok(());
        };
        if trade.role != Role::Seller {
            return Ok(());
        }

        let plaintext = match nip04::decrypt(ctx.my_keys.secret_key(), &event.pubkey, &event.content) {
            Ok(p) => p,
            Err(e) => {
                log::error!("failed to decrypt payment for offer {offer_id}: {e}");
                return Ok(());
            }
        };
        let Ok(payment) = serde_json::from_str::<PaymentContent>(&plaintext) else {
            return Ok(());
        };

        let amount = match ctx.wallet.receive_payment(&payment.token) {
            Ok(a) => a,
            Err(e) => {
                log::error!("token redemption failed for offer {offer_id}: {e}");
                ctx.reputation.update_trust(event.pubkey, TrustEvent::PaymentFailed, 0);
                return Ok(());
            }
        };

        self.total_sats_earned += amount;
        {
            let trade = self.active.get_mut(&offer_id).expect("checked above");
            trade.state = TradeState::Paid;
            trade.payment_event_id = Some(event.id);
        }

        self.send_delivery(event, &offer_id, ctx).await?;

        if let Some(trade) = self.active.get_mut(&offer_id) {
            trade.state = TradeState::Delivered;
            trade.deadline = SystemTime::now() + DELIVERY_TIMEOUT;
        }
        Ok(())
    }

    async fn send_delivery(&mut self, payment_event: &Event, offer_id: &str, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let trade = self
            .active
            .get(offer_id)
            .ok_or_else(|| Error::UnknownOffer(offer_id.to_string()))?;
        let listing_id = trade.listing_id.clone();
        let buyer = payment_event.pubkey;

        let source = ctx
            .sources
            .get(&listing_id)
            .cloned()
            .unwrap_or_else(|| "# source not found".to_string());
        let sha256 = hex::encode(Sha256::digest(source.as_bytes()));

        let plaintext = serde_json::to_string(&DeliveryContent {
            listing_id: listing_id.clone(),
            language: "python".to_string(),
            source,
            sha256,
        })?;
        let encrypted = nip04::encrypt(ctx.my_keys.secret_key(), &buyer, plaintext)
            .map_err(|e| Error::Nip04(e.to_string()))?;

        let event = EventBuilder::new(crate::KIND_TRADE_DELIVERY, encrypted)
            .tags(vec![p_tag(buyer), e_tag(payment_event.id, "reply"), offer_id_tag(offer_id)])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&event).await?;
        Ok(())
    }

    /// Buyer side: delivery arrived (kind 4210) encrypted; verify and complete.
    async fn on_program_delivery(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };
        let Some(trade) = self.active.get(&offer_id) else {
            return Ok(());
        };
        if trade.role != Role::Buyer {
            return Ok(());
        }

        let plaintext = match nip04::decrypt(ctx.my_keys.secret_key(), &event.pubkey, &event.content) {
            Ok(p) => p,
            Err(e) => {
                log::error!("failed to decrypt delivery for offer {offer_id}: {e}");
                return Ok(());
            }
        };
        let Ok(delivery) = serde_json::from_str::<DeliveryContent>(&plaintext) else {
            return Ok(());
        };

        let computed = hex::encode(Sha256::digest(delivery.source.as_bytes()));
        if computed != delivery.sha256 {
            log::error!("source hash mismatch for offer {offer_id}");
            ctx.reputation.update_trust(event.pubkey, TrustEvent::DeliveryTimeout, 0);
            self.active.remove(&offer_id);
            self.trades_failed += 1;
            return Ok(());
        }

        let amount = {
            let trade = self.active.get_mut(&offer_id).expect("checked above");
            trade.state = TradeState::Delivered;
            trade.amount_sats
        };
        self.programs_bought += 1;
        self.total_sats_spent += amount;

        if let Err(e) = persist_bought_source(ctx.data_dir, &delivery.listing_id, &delivery.source) {
            log::error!("failed to persist bought program {}: {e}", delivery.listing_id);
        }

        self.send_complete(event, &offer_id, &delivery.listing_id, ctx).await?;

        if let Some(trade) = self.active.get_mut(&offer_id) {
            trade.state = TradeState::Complete;
        }
        ctx.reputation.update_trust(event.pubkey, TrustEvent::TradeSuccess, amount);
        self.trades_completed += 1;
        self.active.remove(&offer_id);
        Ok(())
    }

    async fn send_complete(&mut self, delivery_event: &Event, offer_id: &str, listing_id: &str, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let content = json!({
            "listing_id": listing_id,
            "status": "complete",
            "sha256_verified": true,
        })
        .to_string();
        let event = EventBuilder::new(KIND_TRADE_COMPLETE, content)
            .tags(vec![
                p_tag(delivery_event.pubkey),
                e_tag(delivery_event.id, "reply"),
                offer_id_tag(offer_id),
            ])
            .sign_with_keys(ctx.my_keys)
            .map_err(|e| Error::EventBuilder(e.to_string()))?;
        ctx.relay.publish(&event).await?;
        Ok(())
    }

    /// Seller side: buyer confirmed completion (kind 4203).
    fn on_trade_complete(&mut self, event: &Event, ctx: &mut TradeCtx<'_>) -> Result<()> {
        let Some(offer_id) = find_tag(event, "offer_id") else {
            return Ok(());
        };
        let Some(trade) = self.active.get(&offer_id) else {
            return Ok(());
        };
        if trade.role != Role::Seller {
            return Ok(());
        }
        let amount = trade.amount_sats;
        self.programs_sold += 1;
        self.trades_completed += 1;
        ctx.reputation.update_trust(event.pubkey, TrustEvent::TradeSuccess, amount);
        self.active.remove(&offer_id);
        Ok(())
    }

    /// Per-tick sweep: expire trades past their deadline, penalizing trust
    /// for offers and deliveries (payments/deliveries use the same penalty
    /// as the original's "delivery_timeout" outcome for any non-terminal,
    /// non-complete state past deadline).
    pub fn check_timeouts(&mut self, ctx: &mut TradeCtx<'_>) {
        let now = SystemTime::now();
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|(_, t)| t.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for offer_id in expired {
            if let Some(trade) = self.active.remove(&offer_id) {
                log::warn!("trade {offer_id} timed out in state {:?}", trade.state);
                let event_kind = match trade.state {
                    TradeState::Offered => Some(TrustEvent::OfferTimeout),
                    TradeState::Paid | TradeState::Delivered => Some(TrustEvent::DeliveryTimeout),
                    _ => None,
                };
                if let Some(kind) = event_kind {
                    ctx.reputation.update_trust(trade.counterparty, kind, 0);
                    self.trades_failed += 1;
                }
            }
        }
    }
}

/// Save a program bought from another agent, keyed by listing id rather
/// than a freshly-minted uuid (the buyer never produced this program).
fn persist_bought_source(data_dir: &Path, listing_id: &str, source: &str) -> std::io::Result<()> {
    let dir = data_dir.join("programs");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(format!("{listing_id}.py")), source)
}

fn short_id() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}

fn p_tag(pubkey: PublicKey) -> Tag {
    Tag::custom(TagKind::custom("p"), vec![pubkey.to_hex()])
}

fn e_tag(event_id: nostr_sdk::EventId, marker: &str) -> Tag {
    Tag::custom(TagKind::custom("e"), vec![event_id.to_hex(), String::new(), marker.to_string()])
}

fn offer_id_tag(offer_id: &str) -> Tag {
    Tag::custom(TagKind::custom("offer_id"), vec![offer_id.to_string()])
}

fn find_tag(event: &Event, name: &str) -> Option<String> {
    event.tags.iter().find_map(|t| {
        let v = t.as_slice();
        if v.len() >= 2 && v[0] == name {
            Some(v[1].to_string())
        } else {
            None
        }
    })
}
