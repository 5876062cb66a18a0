//! Per-agent keypair: generated once, persisted as two hex files, never
//! mutated thereafter.

use std::path::Path;

use nostr_sdk::{Keys, SecretKey};

use crate::error::Result;

const SECRET_FILE: &str = "nostr_secret.hex";
const PUBKEY_FILE: &str = "nostr_pubkey.hex";

/// Load the keypair from `data_dir` if present, else generate and persist a
/// new one.
pub fn load_or_generate(data_dir: &Path) -> Result<Keys> {
    std::fs::create_dir_all(data_dir)?;
    let secret_path = data_dir.join(SECRET_FILE);

    if secret_path.is_file() {
        let hex_secret = std::fs::read_to_string(&secret_path)?;
        let secret_key = SecretKey::from_hex(hex_secret.trim())?;
        return Ok(Keys::new(secret_key));
    }

    let keys = Keys::generate();
    std::fs::write(&secret_path, keys.secret_key().to_secret_hex())?;
    std::fs::write(data_dir.join(PUBKEY_FILE), keys.public_key().to_hex())?;
    log::info!("generated new keypair at {}", data_dir.display());
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_reloads_the_same_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate(dir.path()).unwrap();
        let second = load_or_generate(dir.path()).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }
}
