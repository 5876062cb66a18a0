//! A concrete, file-backed bearer-token wallet. Stands in for the
//! content-addressed ecash library the spec treats as an external black
//! box: something still has to hold sats for the simulation to run.
//!
//! Internally a balance is a set of "proofs" (amount + random secret),
//! mirroring the original Cashu-backed wallet's `proofs` list. A payment
//! token is the serialized proof set removed from the sender's ledger;
//! `receive_payment` redeems it into the receiver's own ledger, tracking
//! spent token ids so the same token cannot be redeemed twice.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::Wallet;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Proof {
    amount: u64,
    secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Token {
    id: String,
    proofs: Vec<Proof>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WalletFile {
    proofs: Vec<Proof>,
    redeemed: HashSet<String>,
}

pub struct LocalWallet {
    state: WalletFile,
    path: PathBuf,
}

impl LocalWallet {
    /// Load an existing wallet file under `data_dir/wallet/wallet.json`, or
    /// start empty.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let wallet_dir = data_dir.join("wallet");
        std::fs::create_dir_all(&wallet_dir)?;
        let path = wallet_dir.join("wallet.json");
        let state = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            WalletFile::default()
        };
        Ok(Self { state, path })
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Bootstrap-only: mint fresh proofs directly into this wallet.
    pub fn mint_tokens(&mut self, amount: u64) -> Result<()> {
        self.state.proofs.push(random_proof(amount));
        self.save()
    }

    /// Select proofs covering at least `amount`, remove them from the
    /// wallet, and push a change proof for the remainder back in — mirrors
    /// the original's `select_to_send(proofs, amount)`, which never hands
    /// over more value than the caller asked for.
    fn select_covering(&mut self, amount: u64) -> Result<Vec<Proof>> {
        let balance = self.balance();
        if amount > balance {
            return Err(WalletError::InsufficientBalance { balance, amount });
        }
        self.state.proofs.sort_by_key(|p| p.amount);
        let mut selected = Vec::new();
        let mut selected_sum: u64 = 0;
        let mut i = 0;
        while selected_sum < amount && i < self.state.proofs.len() {
            if self.state.proofs[i].amount > 0 {
                selected_sum += self.state.proofs[i].amount;
                selected.push(self.state.proofs[i].clone());
            }
            i += 1;
        }
        if selected_sum < amount {
            return Err(WalletError::InsufficientBalance { balance, amount });
        }
        let selected_secrets: HashSet<&str> =
            selected.iter().map(|p| p.secret.as_str()).collect();
        self.state
            .proofs
            .retain(|p| !selected_secrets.contains(p.secret.as_str()));

        let change = selected_sum - amount;
        if change > 0 {
            self.state.proofs.push(random_proof(change));
        }

        Ok(vec![Proof {
            amount,
            secret: random_id(),
        }])
    }
}

impl Wallet for LocalWallet {
    fn balance(&self) -> u64 {
        self.state.proofs.iter().map(|p| p.amount).sum()
    }

    fn create_payment(&mut self, amount: u64) -> Result<String> {
        let proofs = self.select_covering(amount)?;
        self.save()?;
        let token = Token {
            id: random_id(),
            proofs,
        };
        serde_json::to_string(&token)
            .map(|json| format!("zapA{}", hex::encode(json)))
            .map_err(WalletError::Json)
    }

    fn receive_payment(&mut self, token: &str) -> Result<u64> {
        let raw = token
            .strip_prefix("zapA")
            .ok_or_else(|| WalletError::MalformedToken(token.to_string()))?;
        let json = hex::decode(raw)
            .map_err(|e| WalletError::MalformedToken(e.to_string()))?;
        let token: Token = serde_json::from_slice(&json)
            .map_err(|e| WalletError::MalformedToken(e.to_string()))?;

        if self.state.redeemed.contains(&token.id) {
            return Err(WalletError::AlreadyRedeemed);
        }
        let amount: u64 = token.proofs.iter().map(|p| p.amount).sum();
        self.state.redeemed.insert(token.id);
        self.state.proofs.push(random_proof(amount));
        self.save()?;
        Ok(amount)
    }

    fn deduct(&mut self, amount: u64) -> bool {
        if amount == 0 {
            return true;
        }
        match self.select_covering(amount) {
            Ok(_burned) => self.save().is_ok(),
            Err(_) => false,
        }
    }
}

fn random_proof(amount: u64) -> Proof {
    Proof {
        amount,
        secret: random_id(),
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with_balance(amount: u64) -> (tempfile::TempDir, LocalWallet) {
        let dir = tempfile::tempdir().unwrap();
        let mut w = LocalWallet::load(dir.path()).unwrap();
        w.mint_tokens(amount).unwrap();
        (dir, w)
    }

    #[test]
    fn create_payment_reduces_balance_by_exactly_the_amount() {
        let (_dir, mut w) = wallet_with_balance(100);
        let before = w.balance();
        w.create_payment(40).unwrap();
        assert_eq!(w.balance(), before - 40);
    }

    #[test]
    fn receive_payment_credits_the_amount_once() {
        let (_dir_a, mut a) = wallet_with_balance(100);
        let dir_b = tempfile::tempdir().unwrap();
        let mut b = LocalWallet::load(dir_b.path()).unwrap();

        let token = a.create_payment(30).unwrap();
        let received = b.receive_payment(&token).unwrap();
        assert_eq!(received, 30);
        assert_eq!(b.balance(), 30);

        assert!(b.receive_payment(&token).is_err());
    }

    #[test]
    fn deduct_burns_without_issuing_a_token() {
        let (_dir, mut w) = wallet_with_balance(50);
        assert!(w.deduct(20));
        assert_eq!(w.balance(), 30);
        assert!(!w.deduct(1000));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = LocalWallet::load(dir.path()).unwrap();
        assert!(w.receive_payment("not-a-token").is_err());
    }
}
