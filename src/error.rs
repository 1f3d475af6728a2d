use thiserror::Error;

use crate::exchanges::error::ExchangeError;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error for setup paths (config, logging, adapter bootstrap)
#[derive(Debug, Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("logger: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("exchange: {0}")]
    Exchange(#[from] ExchangeError),
}
