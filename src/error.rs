use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown child id: {0}")]
    UnknownChild(String),

    #[error("child {0} failed to become ready within the timeout")]
    ReadyTimeout(String),

    #[error("control socket protocol error: {0}")]
    Protocol(String),

    #[error("no project directory found (no config/agents.json in any parent)")]
    NoProjectDir,
}

pub type Result<T> = std::result::Result<T, Error>;
