use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient balance: {balance} < {amount}")]
    InsufficientBalance { balance: u64, amount: u64 },

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token already redeemed")]
    AlreadyRedeemed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WalletError>;
