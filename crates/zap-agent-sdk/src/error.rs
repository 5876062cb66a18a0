use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nostr key error: {0}")]
    Key(#[from] nostr_sdk::key::Error),

    #[error("nostr event builder error: {0}")]
    EventBuilder(String),

    #[error("nip04 error: {0}")]
    Nip04(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed relay frame: {0}")]
    MalformedFrame(String),

    #[error("wallet error: {0}")]
    Wallet(#[from] zap_wallet::WalletError),

    #[error("unknown offer id: {0}")]
    UnknownOffer(String),

    #[error("sandbox rejected program: {0}")]
    SandboxRejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
