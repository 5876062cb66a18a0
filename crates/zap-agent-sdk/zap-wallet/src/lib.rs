//! The ecash wallet is treated as an external black box in the core spec:
//! a narrow capability interface exposing balance, payment creation,
//! payment redemption, and a local burn operation. This crate defines that
//! interface and one concrete, file-backed implementation so the
//! simulation has something to run against.

mod error;
mod local;

pub use error::{Result, WalletError};
pub use local::LocalWallet;

/// `deduct`'s semantics are one of the spec's two documented ambiguities
/// (burn / escrow-to-treasury / local-invalidate-only across three source
/// variants). This implementation adopts burn: a successful `deduct(n)`
/// destroys proofs covering `n` sats, reducing balance by exactly `n`
/// without producing a token anyone redeems. See DESIGN.md.
pub trait Wallet: Send {
    fn balance(&self) -> u64;
    fn create_payment(&mut self, amount: u64) -> Result<String>;
    fn receive_payment(&mut self, token: &str) -> Result<u64>;
    fn deduct(&mut self, amount: u64) -> bool;
}
