use thiserror::Error;

/// Failure reported by an exchange adapter.
///
/// `Rejected` carries the venue payload verbatim so operators can inspect it on
/// the order that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("network: {0}")]
    Network(String),

    #[error("rejected by venue [{code}]: {message}")]
    Rejected { code: String, message: String },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl ExchangeError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}
