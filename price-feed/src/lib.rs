//! A resilient reference-price feed for the swap interface
//!
//! Streams ETH/USD trade ticks over a websocket, reconnecting through a
//! prioritized list of endpoints with a bounded retry budget, and
//! degrading to REST polling once the budget is exhausted. The latest
//! accepted price is always retained; a lost connection never blanks
//! the price out.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::needless_pass_by_ref_mut)]

mod client;
mod error;
mod rest;
mod state;
mod transport;

pub use client::{PriceFeedClient, PriceFeedConfig};
pub use error::PriceFeedError;
pub use rest::{CoinGeckoSpot, CoinbaseSpot, SpotPriceApi};
pub use state::{FeedState, PriceUpdate, Subscription};
pub use transport::{BoxedTickStream, StreamEndpoint, StreamTransport, WsTransport};
