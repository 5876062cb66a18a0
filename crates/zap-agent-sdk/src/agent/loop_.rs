//! Boot sequence and the three concurrent activities (listen / tick /
//! persist) that make up one agent's life, per the agent loop spec (C5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use nostr_sdk::{Event, EventBuilder, EventId, Filter, Keys, PublicKey, SubscriptionId};
use rand::Rng;
use serde_json::json;

use crate::agent::state::{AgentStateSnapshot, Stats};
use crate::chat::ChatGenerator;
use crate::error::Result;
use crate::keys;
use crate::marketplace::{self, Marketplace};
use crate::personality::{for_agent_slot, Personality};
use crate::program::{Program, ProgramGenerator};
use crate::relay::RelayClient;
use crate::reputation::ReputationLedger;
use crate::sandbox::Sandbox;
use crate::strategy::{Action, Strategy, StrategyBuyCtx};
use crate::trade::{TradeCtx, TradeEngine};
use crate::{KIND_CHAT, KIND_DELETION, KIND_LISTING, KIND_METADATA, KIND_STATUS, TRADE_KINDS};
use zap_wallet::{LocalWallet, Wallet};

const PERSIST_INTERVAL: Duration = Duration::from_secs(30);
const STATUS_EVERY_N_TICKS: u64 = 5;
const ADJUST_PRICE_MIN_AGE: Duration = Duration::from_secs(5 * 60);
const LISTING_PREVIEW_BYTES: usize = 500;
const IDLE_CHAT_PROB: f64 = 0.3;

/// Builds a [`TradeCtx`] borrowing disjoint fields of an `Agent`. A plain
/// method can't do this: it would have to take `&mut self` and hold that
/// borrow for as long as the returned context lives, which conflicts with
/// any other field access in the same call site. Expanding inline at each
/// use keeps the borrows field-disjoint the way the compiler requires.
macro_rules! trade_ctx {
    ($agent:expr) => {{
        let params = $agent.personality.params();
        TradeCtx {
            my_keys: &$agent.keys,
            relay: &mut $agent.relay,
            wallet: $agent.wallet.as_mut(),
            reputation: &mut $agent.reputation,
            programs: &mut $agent.programs,
            sources: &$agent.sources,
            data_dir: &$agent.data_dir,
            mint_url: &$agent.mint_url,
            accept_threshold: params.accept_threshold,
            trust_minimum: params.trust_minimum,
        }
    }};
}

pub struct Agent {
    id: u32,
    keys: Keys,
    data_dir: PathBuf,
    display_name: String,
    mint_url: String,
    personality: Personality,
    relay: RelayClient,
    wallet: Box<dyn Wallet>,
    reputation: ReputationLedger,
    marketplace: Marketplace,
    trades: TradeEngine,
    strategy: Strategy,
    chat: ChatGenerator,
    program_gen: ProgramGenerator,
    sandbox: Sandbox,
    programs: Vec<Program>,
    sources: HashMap<String, String>,
    known_names: HashMap<PublicKey, String>,
    stats: Stats,
    tick_count: u64,
    tick_interval: Duration,
}

impl Agent {
    /// Boot sequence per §4.5: load/generate keys, initialize the wallet,
    /// connect, construct every subsystem, restore persisted state,
    /// publish identity, subscribe, greet, publish an initial status.
    pub async fn boot(
        id: u32,
        data_dir: PathBuf,
        relay_url: String,
        mint_url: String,
        tick_interval: Duration,
    ) -> Result<Self> {
        let agent_keys = keys::load_or_generate(&data_dir)?;
        let display_name = format!("Agent {id}");
        let personality = for_agent_slot(id as usize);

        let mut wallet = load_wallet_with_retry(&data_dir)?;
        if wallet.balance() == 0 {
            wallet.mint_tokens(crate::strategy::INITIAL_BALANCE_SATS)?;
        }

        let mut relay = RelayClient::new(relay_url);
        relay.connect().await?;

        let reputation = ReputationLedger::load(&data_dir.join("reputation.json"))?;
        let strategy = Strategy::new(personality.clone());
        let chat = ChatGenerator::new(display_name.clone());
        let program_gen = ProgramGenerator::new(personality.params().price_multiplier);

        let snapshot = AgentStateSnapshot::load(&data_dir)?;
        let programs = snapshot.programs;
        let sources = load_sources(&data_dir, &programs);

        let mut agent = Self {
            id,
            keys: agent_keys,
            data_dir,
            display_name,
            mint_url,
            personality,
            relay,
            wallet: Box::new(wallet),
            reputation,
            marketplace: Marketplace::new(),
            trades: TradeEngine::new(),
            strategy,
            chat,
            program_gen,
            sandbox: Sandbox::new(),
            programs,
            sources,
            known_names: HashMap::new(),
            stats: snapshot.stats,
            tick_count: snapshot.tick_count,
            tick_interval,
        };

        agent.publish_identity().await?;
        agent.subscribe_all().await?;
        let greeting = agent.chat.greeting();
        agent.publish_chat(&greeting).await?;
        agent.publish_status().await?;

        Ok(agent)
    }

    async fn publish_identity(&mut self) -> Result<()> {
        let content = json!({
            "name": self.display_name,
            "display_name": self.display_name,
            "personality": self.personality.archetype.as_str(),
        })
        .to_string();
        let event = EventBuilder::new(KIND_METADATA, content)
            .sign_with_keys(&self.keys)
            .map_err(|e| crate::Error::EventBuilder(e.to_string()))?;
        self.relay.publish(&event).await
    }

    async fn subscribe_all(&mut self) -> Result<()> {
        let my_pubkey = self.keys.public_key();
        self.relay
            .subscribe(SubscriptionId::new("listings"), vec![Filter::new().kind(KIND_LISTING)])
            .await?;
        self.relay
            .subscribe(SubscriptionId::new("chat"), vec![Filter::new().kind(KIND_CHAT)])
            .await?;
        self.relay
            .subscribe(SubscriptionId::new("metadata"), vec![Filter::new().kind(KIND_METADATA)])
            .await?;
        self.relay
            .subscribe(
                SubscriptionId::new("trades"),
                vec![Filter::new().kinds(TRADE_KINDS).pubkeys(vec![my_pubkey])],
            )
            .await?;
        Ok(())
    }

    async fn publish_chat(&mut self, text: &str) -> Result<()> {
        let event = EventBuilder::new(KIND_CHAT, text)
            .sign_with_keys(&self.keys)
            .map_err(|e| crate::Error::EventBuilder(e.to_string()))?;
        self.relay.publish(&event).await
    }

    async fn publish_status(&mut self) -> Result<()> {
        let content = json!({
            "agent_id": self.id,
            "tick_count": self.tick_count,
            "balance": self.wallet.balance(),
            "programs_owned": self.programs.len(),
            "programs_listed": self.programs.iter().filter(|p| p.listed).count(),
            "active_trades": self.trades.active.len(),
            "trades_completed": self.trades.trades_completed,
            "trades_failed": self.trades.trades_failed,
        })
        .to_string();
        let event = EventBuilder::new(KIND_STATUS, content)
            .sign_with_keys(&self.keys)
            .map_err(|e| crate::Error::EventBuilder(e.to_string()))?;
        self.relay.publish(&event).await
    }

    /// Drive the listen / tick / persist activities until SIGINT, then
    /// flush state and reputation synchronously before returning.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_timer = tokio::time::interval(self.tick_interval);
        tick_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut persist_timer = tokio::time::interval(PERSIST_INTERVAL);
        persist_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // `interval` fires immediately on its first poll; skip that so boot
        // doesn't double up with the work boot() already did.
        tick_timer.tick().await;
        persist_timer.tick().await;

        loop {
            tokio::select! {
                event = self.relay.next_event() => {
                    match event {
                        Ok((_sub_id, event)) => {
                            if let Err(e) = self.handle_event(event).await {
                                log::warn!("agent {}: error handling event: {e}", self.id);
                            }
                        }
                        Err(e) => log::warn!("agent {}: relay error: {e}", self.id),
                    }
                }
                _ = tick_timer.tick() => {
                    if let Err(e) = self.on_tick().await {
                        log::warn!("agent {}: tick error: {e}", self.id);
                    }
                }
                _ = persist_timer.tick() => {
                    self.persist();
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("agent {} received shutdown signal", self.id);
                    break;
                }
            }
        }

        self.persist();
        self.relay.disconnect().await?;
        Ok(())
    }

    fn persist(&self) {
        let snapshot = AgentStateSnapshot {
            tick_count: self.tick_count,
            programs: self.programs.clone(),
            stats: Stats {
                total_trades_completed: self.trades.trades_completed,
                total_sats_earned: self.trades.total_sats_earned,
                total_sats_spent: self.trades.total_sats_spent,
                programs_created: self.stats.programs_created,
                programs_sold: self.trades.programs_sold,
                programs_bought: self.trades.programs_bought,
                trades_failed: self.trades.trades_failed,
            },
        };
        if let Err(e) = snapshot.save(&self.data_dir) {
            log::error!("agent {}: failed to persist state: {e}", self.id);
        }
        if let Err(e) = self.reputation.save() {
            log::error!("agent {}: failed to persist reputation: {e}", self.id);
        }
    }

    async fn handle_event(&mut self, event: Event) -> Result<()> {
        if event.kind == KIND_LISTING {
            self.marketplace.on_listing(&event);
        } else if event.kind == KIND_DELETION {
            for tag in event.tags.iter() {
                let v = tag.as_slice();
                if v.len() >= 2 && v[0] == "e" {
                    if let Ok(id) = EventId::from_hex(&v[1]) {
                        self.marketplace.remove_by_event_id(id);
                    }
                }
            }
        } else if event.kind == KIND_METADATA {
            self.learn_name_from_metadata(&event);
        } else if event.kind == KIND_CHAT {
            self.learn_name_from_chat(&event);
        } else if TRADE_KINDS.contains(&event.kind) {
            let mut ctx = trade_ctx!(self);
            self.trades.dispatch(&event, &mut ctx).await?;
        }
        Ok(())
    }

    fn learn_name_from_metadata(&mut self, event: &Event) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&event.content) else {
            return;
        };
        let name = value
            .get("display_name")
            .or_else(|| value.get("name"))
            .and_then(|v| v.as_str());
        if let Some(name) = name {
            self.known_names.insert(event.pubkey, name.to_string());
        }
    }

    /// Every agent in this fleet is named "Agent <id>" by construction;
    /// recognize that fixed shape at the start of a chat line instead of
    /// parsing arbitrary template prose.
    fn learn_name_from_chat(&mut self, event: &Event) {
        if self.known_names.contains_key(&event.pubkey) {
            return;
        }
        if let Some(name) = extract_leading_agent_name(&event.content) {
            self.known_names.insert(event.pubkey, name);
        }
    }

    fn peer_name(&self, pubkey: &PublicKey) -> String {
        self.known_names
            .get(pubkey)
            .cloned()
            .unwrap_or_else(|| format!("{}...", &pubkey.to_hex()[..8]))
    }

    /// Tick loop: expire trades, decay trust, decay/discard program
    /// quality, select and execute one action, then (e) periodic status
    /// and idle chat.
    async fn on_tick(&mut self) -> Result<()> {
        self.tick_count += 1;

        {
            let mut ctx = trade_ctx!(self);
            self.trades.check_timeouts(&mut ctx);
        }

        self.reputation.decay_all();
        self.decay_and_discard_programs().await?;

        let balance = self.wallet.balance();
        let active_trades = self.trades.active.len();
        let has_listings = !self.marketplace.is_empty();
        let any_own_listed = self.programs.iter().any(|p| p.listed);
        let action = self
            .strategy
            .select_action(balance, active_trades, has_listings, any_own_listed);

        match action {
            Action::Create => self.execute_create().await?,
            Action::Buy => self.execute_buy().await?,
            Action::AdjustPrices => self.execute_adjust_prices().await?,
            Action::Idle => {
                if rand::thread_rng().gen_bool(IDLE_CHAT_PROB) {
                    let msg = self.chat.idle(balance);
                    self.publish_chat(&msg).await?;
                }
            }
        }

        if self.tick_count % STATUS_EVERY_N_TICKS == 0 {
            self.publish_status().await?;
        }

        Ok(())
    }

    async fn decay_and_discard_programs(&mut self) -> Result<()> {
        for program in self.programs.iter_mut() {
            program.decay_quality();
        }

        let mut discarded = Vec::new();
        let mut i = 0;
        while i < self.programs.len() {
            if self.programs[i].should_discard() {
                discarded.push(self.programs.remove(i));
            } else {
                i += 1;
            }
        }

        for program in discarded {
            self.sources.remove(&program.id);
            if let Some(listing_event_id) = program.listing_event_id {
                let delist = marketplace::build_delist_event(&self.keys, listing_event_id)?;
                self.relay.publish(&delist).await?;
            }
            log::info!(
                "agent {}: discarded {} (quality dropped below threshold)",
                self.id,
                program.name
            );
        }
        Ok(())
    }

    async fn execute_create(&mut self) -> Result<()> {
        let category = self.strategy.select_category();
        let (mut program, source) = self
            .program_gen
            .generate(Some(&category), &self.personality.category_focus);

        let balance = self.wallet.balance();
        if balance < program.production_cost || !self.wallet.deduct(program.production_cost) {
            let msg = self.chat.broke(balance);
            self.publish_chat(&msg).await?;
            return Ok(());
        }

        if let Err(e) = self.sandbox.test(&source) {
            log::info!("agent {}: sandbox rejected generated program: {e}", self.id);
            return Ok(());
        }

        save_source(&self.data_dir, &program.id, &source)?;
        self.sources.insert(program.id.clone(), source.clone());
        self.stats.programs_created += 1;

        let price = program.price;
        let content = marketplace::ListingContent {
            name: program.name.clone(),
            description: format!("auto-generated {} helper", program.category),
            language: "python".to_string(),
            version: "1".to_string(),
            category: program.category.clone(),
            complexity: program.complexity.as_str().to_string(),
            price,
            preview: preview_bytes(&source, LISTING_PREVIEW_BYTES),
            quality: Some(round2(program.quality)),
        };
        let event = marketplace::build_listing_event(&self.keys, &program.id, &program.category, &content)?;
        self.relay.publish(&event).await?;

        program.listed = true;
        program.listed_at = Some(SystemTime::now());
        program.listing_event_id = Some(event.id);
        let name = program.name.clone();
        self.programs.push(program);

        let msg = self.chat.listing(&name, price, &category);
        self.publish_chat(&msg).await?;
        Ok(())
    }

    async fn execute_buy(&mut self) -> Result<()> {
        let my_pubkey = self.keys.public_key();
        let mut owned_categories: Vec<String> =
            self.programs.iter().map(|p| p.category.clone()).collect();
        owned_categories.sort();
        owned_categories.dedup();

        let balance = self.wallet.balance();
        let listing = {
            let ctx = StrategyBuyCtx {
                strategy: &self.strategy,
                owned_categories: &owned_categories,
                balance,
                reputation: &self.reputation,
            };
            self.marketplace
                .get_interesting_listings(&my_pubkey, &ctx)
                .first()
                .map(|l| (*l).clone())
        };
        let Some(listing) = listing else {
            return Ok(());
        };

        let offer_amount = self.strategy.calculate_offer_price(&listing, balance);
        if offer_amount == 0 {
            return Ok(());
        }

        let seller_name = self.peer_name(&listing.seller);
        let program_name = listing.content.name.clone();
        {
            let mut ctx = trade_ctx!(self);
            self.trades
                .send_offer(listing.seller, listing.event_id, listing.d_tag.clone(), offer_amount, &mut ctx)
                .await?;
        }

        let msg = self.chat.buying(&seller_name, &program_name, offer_amount);
        self.publish_chat(&msg).await?;
        Ok(())
    }

    async fn execute_adjust_prices(&mut self) -> Result<()> {
        let now = SystemTime::now();
        let candidates: Vec<usize> = self
            .programs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.listed)
            .filter(|(_, p)| {
                p.listed_at
                    .map(|t| now.duration_since(t).unwrap_or_default() > ADJUST_PRICE_MIN_AGE)
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        for i in candidates {
            let (id, category, complexity, quality, old_price, name) = {
                let p = &self.programs[i];
                (p.id.clone(), p.category.clone(), p.complexity, p.quality, p.price, p.name.clone())
            };
            let new_price = ((old_price as f64 * 0.9).round() as u64).max(10);
            if new_price == old_price {
                continue;
            }

            let preview = self
                .sources
                .get(&id)
                .map(|s| preview_bytes(s, LISTING_PREVIEW_BYTES))
                .unwrap_or_default();
            let content = marketplace::ListingContent {
                name: name.clone(),
                description: format!("auto-generated {category} helper"),
                language: "python".to_string(),
                version: "1".to_string(),
                category: category.clone(),
                complexity: complexity.as_str().to_string(),
                price: new_price,
                preview,
                quality: Some(round2(quality)),
            };
            let event = marketplace::build_listing_event(&self.keys, &id, &category, &content)?;
            self.relay.publish(&event).await?;

            let program = &mut self.programs[i];
            program.price = new_price;
            program.listing_event_id = Some(event.id);

            let msg = self.chat.price_adjust(&name, old_price, new_price);
            self.publish_chat(&msg).await?;
        }
        Ok(())
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn extract_leading_agent_name(content: &str) -> Option<String> {
    let mut words = content.split_whitespace();
    let first = words.next()?;
    if first != "Agent" {
        return None;
    }
    let second = words.next()?;
    let digits = second.trim_end_matches(|c: char| !c.is_ascii_digit());
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{first} {digits}"))
    } else {
        None
    }
}

fn load_wallet_with_retry(data_dir: &std::path::Path) -> Result<LocalWallet> {
    let mut attempts = 0;
    loop {
        match LocalWallet::load(data_dir) {
            Ok(wallet) => return Ok(wallet),
            Err(e) if attempts < 2 => {
                attempts += 1;
                log::warn!("wallet init failed ({e}), retrying ({attempts}/2)");
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn load_sources(data_dir: &std::path::Path, programs: &[Program]) -> HashMap<String, String> {
    let dir = data_dir.join("programs");
    let mut sources = HashMap::new();
    for program in programs {
        let path = dir.join(format!("{}.py", program.id));
        if let Ok(source) = std::fs::read_to_string(&path) {
            sources.insert(program.id.clone(), source);
        }
    }
    sources
}

fn save_source(data_dir: &std::path::Path, id: &str, source: &str) -> Result<()> {
    let dir = data_dir.join("programs");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(format!("{id}.py")), source)?;
    Ok(())
}

/// Truncate to at most `max` bytes on a UTF-8 char boundary.
fn preview_bytes(source: &str, max: usize) -> String {
    if source.len() <= max {
        return source.to_string();
    }
    let mut end = max;
    while end > 0 && !source.is_char_boundary(end) {
        end -= 1;
    }
    source[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_our_own_fixed_name_shape() {
        assert_eq!(
            extract_leading_agent_name("Agent 3 just finished fibonacci_calculator"),
            Some("Agent 3".to_string())
        );
        assert_eq!(extract_leading_agent_name("hello there"), None);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let source = "x".repeat(10);
        assert_eq!(preview_bytes(&source, 4).len(), 4);
        assert_eq!(preview_bytes(&source, 100), source);
    }
}
