//! Domain library for one agent in the simulated program economy: the
//! relay client, reputation ledger, marketplace view, trade engine, and
//! the pieces composing the autonomous agent loop.

pub mod agent;
pub mod chat;
pub mod error;
pub mod keys;
pub mod marketplace;
pub mod personality;
pub mod program;
pub mod relay;
pub mod reputation;
pub mod sandbox;
pub mod strategy;
pub mod trade;

pub use error::{Error, Result};

use nostr_sdk::Kind;

/// Event kinds used by the core, in a private namespace (4200-4210 for
/// trade, 4300/4301 for telemetry). Kinds 0, 1, 5, and 30078 reuse the
/// standard Nostr meanings (metadata, text note, deletion, parameterized
/// replaceable event).
pub const KIND_METADATA: Kind = Kind::Metadata;
pub const KIND_CHAT: Kind = Kind::TextNote;
pub const KIND_DELETION: Kind = Kind::EventDeletion;
pub const KIND_LISTING: Kind = Kind::Custom(30078);

pub const KIND_TRADE_OFFER: Kind = Kind::Custom(4200);
pub const KIND_TRADE_ACCEPT: Kind = Kind::Custom(4201);
pub const KIND_TRADE_REJECT: Kind = Kind::Custom(4202);
pub const KIND_TRADE_COMPLETE: Kind = Kind::Custom(4203);
pub const KIND_TRADE_PAYMENT: Kind = Kind::Custom(4204);
pub const KIND_TRADE_DELIVERY: Kind = Kind::Custom(4210);
pub const KIND_STATUS: Kind = Kind::Custom(4300);
pub const KIND_AGGREGATE_STATUS: Kind = Kind::Custom(4301);

pub const TRADE_KINDS: [Kind; 6] = [
    KIND_TRADE_OFFER,
    KIND_TRADE_ACCEPT,
    KIND_TRADE_REJECT,
    KIND_TRADE_COMPLETE,
    KIND_TRADE_PAYMENT,
    KIND_TRADE_DELIVERY,
];
