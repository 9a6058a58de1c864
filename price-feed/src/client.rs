//! The price feed client and its connection state machine
//!
//! One client maintains one live price stream for the reference asset,
//! falling back through alternate stream endpoints and finally to REST
//! polling. The connection state machine is explicit (see
//! [`FeedState`]) so that the bounded-attempt transition into polling
//! mode is a first-class, testable transition.

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    error::PriceFeedError,
    rest::{CoinGeckoSpot, CoinbaseSpot, SpotPriceApi},
    state::{FeedShared, FeedState, PriceUpdate, Subscription},
    transport::{BoxedTickStream, StreamEndpoint, StreamTransport, WsTransport},
};

// -------------
// | Constants |
// -------------

/// The primary trade-tick stream endpoint
const PRIMARY_STREAM_URL: &str = "wss://stream.binance.com:9443/ws/ethusdt@trade";
/// The mirror trade-tick stream endpoint, tried after the primary
const MIRROR_STREAM_URL: &str = "wss://stream.binance.us:9443/ws/ethusdt@trade";

/// The default delay before retrying a dropped stream connection
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// The default number of consecutive stream failures tolerated before
/// falling back to REST polling
const DEFAULT_MAX_STREAM_ATTEMPTS: usize = 5;
/// The default interval between REST polling cycles
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// The default timeout applied to dials and REST requests
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The metric counting stream reconnect attempts
const RECONNECTS_METRIC: &str = "price_feed.reconnects";

// ----------
// | Config |
// ----------

/// The configuration options for the price feed client
#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    /// The stream endpoints, tried in priority order with wraparound
    pub stream_endpoints: Vec<StreamEndpoint>,
    /// The delay before retrying a dropped stream connection
    pub reconnect_delay: Duration,
    /// The number of consecutive stream failures tolerated before
    /// falling back to REST polling
    pub max_stream_attempts: usize,
    /// The interval between REST polling cycles
    pub poll_interval: Duration,
    /// The timeout applied to dials and REST requests
    pub request_timeout: Duration,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            stream_endpoints: vec![
                StreamEndpoint::new("binance", PRIMARY_STREAM_URL),
                StreamEndpoint::new("binance-us", MIRROR_STREAM_URL),
            ],
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_stream_attempts: DEFAULT_MAX_STREAM_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ----------
// | Client |
// ----------

/// A command sent from the client handle to the connection task
enum FeedCommand {
    /// Cancel in-flight work, reset attempt counters, and restart from
    /// the initial one-shot fetch
    Refetch,
}

/// The price feed client
///
/// Owns the single connection task for the process; constructed
/// explicitly at startup and torn down with [`PriceFeedClient::shutdown`]
/// (or on drop). Exactly one stream connection or polling timer is
/// active at any time.
pub struct PriceFeedClient {
    /// The shared feed state, read by subscribers
    shared: Arc<FeedShared>,
    /// The command channel into the connection task
    command_tx: UnboundedSender<FeedCommand>,
    /// The handle of the spawned connection task
    task: JoinHandle<()>,
}

impl PriceFeedClient {
    /// Start a client over the production websocket transport and REST
    /// providers
    pub fn start(config: PriceFeedConfig) -> Self {
        let providers: Vec<Arc<dyn SpotPriceApi>> =
            vec![Arc::new(CoinGeckoSpot), Arc::new(CoinbaseSpot)];
        Self::start_with(config, Arc::new(WsTransport), providers)
    }

    /// Start a client over the given transport and REST providers
    ///
    /// This is the seam tests use to substitute scripted transports.
    pub fn start_with(
        config: PriceFeedConfig,
        transport: Arc<dyn StreamTransport>,
        providers: Vec<Arc<dyn SpotPriceApi>>,
    ) -> Self {
        let shared = Arc::new(FeedShared::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = FeedDriver {
            config,
            transport,
            providers,
            http: Client::new(),
            shared: shared.clone(),
            command_rx,
        };
        let task = tokio::spawn(driver.run());

        Self { shared, command_tx, task }
    }

    /// Register a listener invoked with a [`PriceUpdate`] on every
    /// accepted price, with an immediate synchronous call delivering the
    /// current snapshot
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(PriceUpdate) + Send + Sync + 'static,
    {
        let id = self.shared.add_listener(Arc::new(listener));
        Subscription::new(id, &self.shared)
    }

    /// A non-blocking snapshot of the current price, or `None` if no
    /// price has been received yet
    pub fn current_price(&self) -> Option<f64> {
        self.shared.current_price()
    }

    /// Whether a live stream connection is currently established
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// The current connection state
    pub fn feed_state(&self) -> FeedState {
        self.shared.feed_state()
    }

    /// A full snapshot of the feed
    pub fn snapshot(&self) -> PriceUpdate {
        self.shared.snapshot()
    }

    /// Cancel any in-flight polling or connection, reset attempt
    /// counters, and restart from the initial one-shot fetch
    pub fn refetch(&self) -> Result<(), PriceFeedError> {
        self.command_tx.send(FeedCommand::Refetch).map_err(|_| PriceFeedError::Shutdown)
    }

    /// Tear down the connection task
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for PriceFeedClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// -----------------
// | Driver (task) |
// -----------------

/// The reason the live stream loop returned
enum LiveExit {
    /// The stream errored or closed
    StreamEnded,
    /// A refetch command arrived
    Refetch,
}

/// The state machine driver, run on the spawned connection task
struct FeedDriver {
    /// The configuration options for the feed
    config: PriceFeedConfig,
    /// The transport used to dial stream endpoints
    transport: Arc<dyn StreamTransport>,
    /// The REST fallback providers, in priority order
    providers: Vec<Arc<dyn SpotPriceApi>>,
    /// The shared HTTP client for REST providers
    http: Client,
    /// The shared feed state
    shared: Arc<FeedShared>,
    /// The command channel from the client handle
    command_rx: UnboundedReceiver<FeedCommand>,
}

impl FeedDriver {
    /// Run the feed until the owning client is dropped
    ///
    /// Each iteration of the outer loop corresponds to one full restart
    /// of the machine: the startup one-shot fetch followed by stream
    /// attempts. The machine only returns here on a refetch command.
    async fn run(mut self) {
        loop {
            // Populate the price before the first stream attempt
            // completes, so the initial render is not empty
            self.poll_providers_once().await;
            self.run_machine().await;
            info!("restarting price feed from initial fetch");
        }
    }

    /// Drive the connection state machine until a refetch command
    async fn run_machine(&mut self) {
        let num_endpoints = self.config.stream_endpoints.len();
        if num_endpoints == 0 {
            self.shared.set_state(FeedState::Polling);
            self.run_polling().await;
            return;
        }

        let mut endpoint_idx = 0;
        let mut attempts = 0;
        loop {
            self.shared.set_state(FeedState::Connecting(endpoint_idx));
            let endpoint = self.config.stream_endpoints[endpoint_idx].clone();

            match self.dial(&endpoint).await {
                // Refetch while dialing
                None => return,
                Some(Ok(stream)) => {
                    info!("price stream live on {}", endpoint.name);
                    attempts = 0;
                    self.shared.set_state(FeedState::Live);
                    if let LiveExit::Refetch = self.run_live(stream, &endpoint.name).await {
                        return;
                    }
                },
                Some(Err(e)) => {
                    warn!("failed to connect to {}: {e}", endpoint.name);
                },
            }

            // Either the dial failed or a live stream dropped
            attempts += 1;
            metrics::counter!(RECONNECTS_METRIC).increment(1);

            if attempts >= self.config.max_stream_attempts {
                warn!("exhausted {attempts} stream attempts, falling back to polling");
                self.shared.set_state(FeedState::Polling);
                self.run_polling().await;
                return;
            }

            self.shared.set_state(FeedState::Reconnecting { attempt: attempts });
            if self.wait_or_refetch(self.config.reconnect_delay).await {
                return;
            }
            endpoint_idx = (endpoint_idx + 1) % num_endpoints;
        }
    }

    /// Dial a stream endpoint, racing the command channel
    ///
    /// Returns `None` if a refetch command arrived mid-dial, otherwise
    /// the dial result. The dial itself is bounded by the request
    /// timeout.
    async fn dial(
        &mut self,
        endpoint: &StreamEndpoint,
    ) -> Option<Result<BoxedTickStream, PriceFeedError>> {
        let dial = timeout(self.config.request_timeout, self.transport.connect(endpoint));
        tokio::select! {
            res = dial => match res {
                Ok(res) => Some(res),
                Err(_) => Some(Err(PriceFeedError::connection("dial timed out"))),
            },
            cmd = self.command_rx.recv() => {
                self.handle_command(cmd);
                None
            },
        }
    }

    /// Forward ticks from a live stream into the shared state
    async fn run_live(&mut self, mut stream: BoxedTickStream, source: &str) -> LiveExit {
        use futures_util::StreamExt;
        loop {
            tokio::select! {
                maybe_tick = stream.next() => match maybe_tick {
                    Some(Ok(price)) => self.shared.publish_price(price, source),
                    Some(Err(e)) => {
                        warn!("price stream error on {source}: {e}");
                        return LiveExit::StreamEnded;
                    },
                    None => {
                        warn!("price stream on {source} closed");
                        return LiveExit::StreamEnded;
                    },
                },
                cmd = self.command_rx.recv() => {
                    self.handle_command(cmd);
                    // Tear down the stream before the machine dials the
                    // next endpoint; dropping it closes the connection
                    return LiveExit::Refetch;
                },
            }
        }
    }

    /// Poll REST providers until a refetch command arrives
    ///
    /// Polling mode persists indefinitely; only a manual refetch moves
    /// the machine back to `Connecting(0)`.
    async fn run_polling(&mut self) {
        loop {
            if self.wait_or_refetch(self.config.poll_interval).await {
                return;
            }
            self.poll_providers_once().await;
        }
    }

    /// Try each REST provider in order, publishing the first valid price
    async fn poll_providers_once(&self) {
        for provider in &self.providers {
            let fetch = timeout(self.config.request_timeout, provider.fetch_spot(&self.http));
            match fetch.await {
                Ok(Ok(price)) => {
                    self.shared.publish_price(price, provider.name());
                    return;
                },
                Ok(Err(e)) => warn!("spot fetch from {} failed: {e}", provider.name()),
                Err(_) => warn!("spot fetch from {} timed out", provider.name()),
            }
        }
        warn!("all spot price providers failed this cycle");
    }

    /// Sleep for the given duration, returning `true` if a refetch
    /// command arrived first
    async fn wait_or_refetch(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            cmd = self.command_rx.recv() => {
                self.handle_command(cmd);
                true
            },
        }
    }

    /// Apply a received command
    ///
    /// A closed channel is treated as a refetch; the task is aborted by
    /// the client handle before the channel can close in practice.
    fn handle_command(&self, cmd: Option<FeedCommand>) {
        if cmd.is_some() {
            info!("refetch requested, restarting price feed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;

    use super::*;

    /// One scripted outcome of a transport dial
    enum ScriptStep {
        /// The dial fails
        Fail,
        /// The dial succeeds with a stream yielding the given ticks,
        /// then closing
        Stream(Vec<f64>),
    }

    /// A transport that replays a script of dial outcomes, failing once
    /// the script is exhausted
    struct ScriptedTransport {
        /// The remaining scripted outcomes
        steps: Mutex<VecDeque<ScriptStep>>,
    }

    impl ScriptedTransport {
        /// Create a transport from a script
        fn new(steps: Vec<ScriptStep>) -> Arc<Self> {
            Arc::new(Self { steps: Mutex::new(steps.into()) })
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn connect(
            &self,
            _endpoint: &StreamEndpoint,
        ) -> Result<BoxedTickStream, PriceFeedError> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(ScriptStep::Stream(ticks)) => {
                    let ticks: Vec<Result<f64, PriceFeedError>> =
                        ticks.into_iter().map(Ok).collect();
                    Ok(Box::new(futures::stream::iter(ticks)))
                },
                Some(ScriptStep::Fail) | None => {
                    Err(PriceFeedError::connection("scripted failure"))
                },
            }
        }
    }

    /// A REST provider returning a fixed price, or an error if none is
    /// configured, counting its invocations
    struct StaticSpot {
        /// The price to return
        price: Option<f64>,
        /// The number of fetches issued
        calls: AtomicUsize,
    }

    impl StaticSpot {
        /// Create a provider returning the given price
        fn new(price: Option<f64>) -> Arc<Self> {
            Arc::new(Self { price, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl SpotPriceApi for StaticSpot {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_spot(&self, _client: &Client) -> Result<f64, PriceFeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price.ok_or(PriceFeedError::http("scripted outage"))
        }
    }

    /// A config with short timers for paused-clock tests
    fn test_config(max_attempts: usize) -> PriceFeedConfig {
        PriceFeedConfig {
            stream_endpoints: vec![
                StreamEndpoint::new("primary", "wss://primary.invalid/ws"),
                StreamEndpoint::new("mirror", "wss://mirror.invalid/ws"),
            ],
            reconnect_delay: Duration::from_millis(10),
            max_stream_attempts: max_attempts,
            poll_interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(100),
        }
    }

    /// Wait until the predicate holds, bounded by a generous number of
    /// paused-clock steps
    async fn wait_for(mut pred: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if pred() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    /// A live stream delivers its ticks into the snapshot and marks the
    /// feed connected while live
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_live_stream_publishes_ticks() {
        let transport = ScriptedTransport::new(vec![ScriptStep::Stream(vec![1500.0, 1501.5])]);
        let client = PriceFeedClient::start_with(
            test_config(3),
            transport,
            vec![StaticSpot::new(None)],
        );

        wait_for(|| client.current_price() == Some(1501.5)).await;
    }

    /// After the configured number of consecutive connection failures
    /// the machine transitions to polling, the feed reports
    /// disconnected, and the last known good price is retained
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_fallback_to_polling_retains_price() {
        // One good session, then permanent failure
        let transport = ScriptedTransport::new(vec![ScriptStep::Stream(vec![2000.0])]);
        let providers: Vec<Arc<dyn SpotPriceApi>> = vec![StaticSpot::new(None)];
        let client = PriceFeedClient::start_with(test_config(3), transport, providers);

        wait_for(|| client.feed_state() == FeedState::Polling).await;

        assert!(!client.is_connected());
        assert_eq!(client.current_price(), Some(2000.0));
    }

    /// The startup one-shot REST fetch populates the price before any
    /// stream session succeeds
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_initial_one_shot_fetch() {
        let transport = ScriptedTransport::new(vec![]);
        let spot = StaticSpot::new(Some(111.0));
        let client =
            PriceFeedClient::start_with(test_config(3), transport, vec![spot.clone()]);

        wait_for(|| client.current_price() == Some(111.0)).await;
        assert!(spot.calls.load(Ordering::SeqCst) >= 1);
    }

    /// Subscribing delivers one immediate synchronous snapshot even
    /// before any price has arrived
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_subscribe_immediate_snapshot() {
        let transport = ScriptedTransport::new(vec![]);
        let client = PriceFeedClient::start_with(
            test_config(3),
            transport,
            vec![StaticSpot::new(None)],
        );

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let _sub = client.subscribe(move |_update| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// In polling mode the providers are tried in order and the first
    /// valid price wins
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_polling_provider_priority() {
        let transport = ScriptedTransport::new(vec![]);
        let broken = StaticSpot::new(None);
        let healthy = StaticSpot::new(Some(2750.0));
        let providers: Vec<Arc<dyn SpotPriceApi>> = vec![broken.clone(), healthy.clone()];
        let client = PriceFeedClient::start_with(test_config(1), transport, providers);

        wait_for(|| client.current_price() == Some(2750.0)).await;

        // The broken provider was consulted first
        assert!(broken.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(client.snapshot().source.as_deref(), Some("static"));
    }

    /// A manual refetch from polling mode restarts the machine at the
    /// one-shot fetch and `Connecting(0)`
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_refetch_restarts_machine() {
        let transport = ScriptedTransport::new(vec![]);
        let spot = StaticSpot::new(Some(99.0));
        let client = PriceFeedClient::start_with(test_config(1), transport, vec![spot.clone()]);

        wait_for(|| client.feed_state() == FeedState::Polling).await;
        let calls_before = spot.calls.load(Ordering::SeqCst);

        client.refetch().unwrap();

        // The restart re-runs the one-shot fetch
        wait_for(|| spot.calls.load(Ordering::SeqCst) > calls_before).await;
        // And with a permanently failing transport, lands back in polling
        wait_for(|| client.feed_state() == FeedState::Polling).await;
    }
}
