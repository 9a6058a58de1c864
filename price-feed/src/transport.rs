//! The websocket transport for trade-tick price streams
//!
//! Defines the abstract [`StreamTransport`] seam that the client dials
//! through, along with the production `tokio-tungstenite`
//! implementation for Binance-style trade streams.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::PriceFeedError;

// -------------
// | Constants |
// -------------

/// The event-type field of a stream message
const EVENT_TYPE_FIELD: &str = "e";
/// The event type of a trade tick
const TRADE_EVENT: &str = "trade";
/// The price field of a trade tick
const PRICE_FIELD: &str = "p";

/// The metric counting stream messages dropped by validation
pub(crate) const DROPPED_MESSAGES_METRIC: &str = "price_feed.dropped_messages";

// ---------
// | Types |
// ---------

/// A named websocket endpoint to stream trade ticks from
#[derive(Debug, Clone)]
pub struct StreamEndpoint {
    /// A short human-readable source name, e.g. `binance`
    pub name: String,
    /// The websocket URL of the trade stream
    pub url: String,
}

impl StreamEndpoint {
    /// Create a new stream endpoint
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

/// A boxed stream of parsed trade-tick prices
pub type BoxedTickStream = Box<dyn Stream<Item = Result<f64, PriceFeedError>> + Send + Unpin>;

/// A transport capable of dialing a stream endpoint and yielding trade
/// ticks from it
///
/// Abstracted behind a trait so that tests can substitute a scripted
/// transport for the live websocket.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a tick stream against the given endpoint
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<BoxedTickStream, PriceFeedError>;
}

// -------------------------
// | Websocket Transport |
// -------------------------

/// The production websocket transport
///
/// Streams trade ticks of the form `{"e": "trade", "p": "<price>"}`.
/// Messages that are not trade ticks, or whose price fails validation,
/// are dropped and counted rather than surfaced as errors; transient
/// garbage is expected from best-effort feeds.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<BoxedTickStream, PriceFeedError> {
        let url: Url = endpoint.url.parse().map_err(PriceFeedError::connection)?;
        let (ws_conn, _resp) =
            connect_async(url.as_str()).await.map_err(PriceFeedError::connection)?;

        let (_write, read) = ws_conn.split();
        let source = endpoint.name.clone();

        let tick_stream = read.filter_map(move |message| {
            let source = source.clone();
            async move {
                match message {
                    Ok(msg) => parse_trade_tick(msg, &source).map(Ok),
                    Err(e) => Some(Err(PriceFeedError::stream_closed(e))),
                }
            }
        });

        Ok(Box::new(Box::pin(tick_stream)))
    }
}

// -----------
// | Helpers |
// -----------

/// Parse a trade tick price out of a websocket message
///
/// Returns `None` for messages that should be skipped: non-text frames,
/// non-trade events, and ticks whose price fails validation. Dropped
/// messages are counted for observability.
fn parse_trade_tick(message: Message, source: &str) -> Option<f64> {
    let text = match message {
        Message::Text(text) => text,
        Message::Close(frame) => {
            warn!("received close frame from {source} stream: {frame:?}");
            return None;
        },
        // Ping/pong/binary frames carry no tick data
        _ => return None,
    };

    let json: Value = match serde_json::from_str(&text) {
        Ok(json) => json,
        Err(_) => {
            count_dropped(source);
            debug!("dropping unparseable message from {source}");
            return None;
        },
    };

    if json[EVENT_TYPE_FIELD].as_str() != Some(TRADE_EVENT) {
        // Subscription acks and other event types are expected noise
        return None;
    }

    let price = json[PRICE_FIELD].as_str().and_then(|p| p.parse::<f64>().ok());
    match price {
        Some(price) if validate_price(price) => Some(price),
        _ => {
            count_dropped(source);
            debug!("dropping trade tick with invalid price from {source}");
            None
        },
    }
}

/// Whether an incoming price value is acceptable
///
/// A price is accepted only if it is positive and finite.
pub(crate) fn validate_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Increment the dropped-message counter for the given source
fn count_dropped(source: &str) {
    metrics::counter!(DROPPED_MESSAGES_METRIC, "source" => source.to_string()).increment(1);
}
