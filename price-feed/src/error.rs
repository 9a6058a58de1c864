//! Error types for the price feed client

/// An error produced by the price feed client or one of its transports
#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceFeedError {
    /// An error establishing a stream connection
    #[error("stream connection error: {0}")]
    Connection(String),
    /// The underlying stream closed or hung up
    #[error("stream closed: {0}")]
    StreamClosed(String),
    /// An error issuing an HTTP request to a fallback provider
    #[error("http error: {0}")]
    Http(String),
    /// An error parsing a price from a provider response
    #[error("parse error: {0}")]
    Parse(String),
    /// The client has been shut down
    #[error("price feed client is shut down")]
    Shutdown,
}

impl PriceFeedError {
    /// Create a new connection error
    #[allow(clippy::needless_pass_by_value)]
    pub fn connection<T: ToString>(e: T) -> Self {
        PriceFeedError::Connection(e.to_string())
    }

    /// Create a new stream-closed error
    #[allow(clippy::needless_pass_by_value)]
    pub fn stream_closed<T: ToString>(e: T) -> Self {
        PriceFeedError::StreamClosed(e.to_string())
    }

    /// Create a new http error
    #[allow(clippy::needless_pass_by_value)]
    pub fn http<T: ToString>(e: T) -> Self {
        PriceFeedError::Http(e.to_string())
    }

    /// Create a new parse error
    #[allow(clippy::needless_pass_by_value)]
    pub fn parse<T: ToString>(e: T) -> Self {
        PriceFeedError::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for PriceFeedError {
    fn from(e: reqwest::Error) -> Self {
        PriceFeedError::http(e)
    }
}
